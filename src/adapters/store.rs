//! Object store access used by the synchronizer
//!
//! `ObjectStore` is the narrow slice of the Kubernetes API the reconcilers
//! need. It is implemented for `kube::Api` and, in tests, for an in-memory map.

use std::fmt::Debug;

use async_trait::async_trait;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::OPERATOR_NAME;
use crate::Result;

/// Get, create, replace and delete objects of one kind within one scope
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Fetch an object; `None` when it does not exist
    async fn get(&self, name: &str) -> Result<Option<K>>;

    /// Create a new object
    async fn create(&self, object: &K) -> Result<K>;

    /// Replace an existing object
    async fn replace(&self, name: &str, object: &K) -> Result<K>;

    /// Delete an object; deleting an absent object succeeds
    async fn delete(&self, name: &str) -> Result<()>;
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl<K> ObjectStore<K> for Api<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>> {
        Ok(Api::<K>::get_opt(self, name).await?)
    }

    async fn create(&self, object: &K) -> Result<K> {
        Ok(Api::<K>::create(self, &post_params(), object).await?)
    }

    async fn replace(&self, name: &str, object: &K) -> Result<K> {
        Ok(Api::<K>::replace(self, name, &post_params(), object).await?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match Api::<K>::delete(self, name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
