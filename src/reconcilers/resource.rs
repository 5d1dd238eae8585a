//! Generic fingerprint-based synchronizer
//!
//! `sync` converges one object in the store towards a desired object: create
//! when absent, leave alone when the stored fingerprint matches, otherwise
//! update in place or, for kinds that cannot be patched, delete and recreate.

use std::fmt::{self, Debug};

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::api::storage::v1::{CSIDriver, StorageClass};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapters::store::ObjectStore;
use crate::metrics::SYNC_OUTCOMES;
use crate::reconcilers::fingerprint;
use crate::{Error, Result};

/// Result of one synchronization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How drift is corrected for a kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Replace the stored object, keeping its status
    InPlace,
    /// Delete the stored object, then create the desired one
    Recreate,
}

/// A kind the synchronizer can manage
pub trait ManagedResource:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const UPDATE_STRATEGY: UpdateStrategy = UpdateStrategy::InPlace;

    /// Copy the store-managed status of `observed` onto an update
    fn preserve_status(&mut self, _observed: &Self) {}
}

macro_rules! managed_without_status {
    ($($kind:ty),* $(,)?) => {
        $(impl ManagedResource for $kind {})*
    };
}

macro_rules! managed_with_status {
    ($($kind:ty),* $(,)?) => {
        $(impl ManagedResource for $kind {
            fn preserve_status(&mut self, observed: &Self) {
                self.status = observed.status.clone();
            }
        })*
    };
}

managed_without_status!(Secret, ConfigMap, ServiceAccount, ClusterRole, ClusterRoleBinding);
managed_with_status!(Deployment, DaemonSet, Service, Namespace);

impl ManagedResource for StorageClass {
    const UPDATE_STRATEGY: UpdateStrategy = UpdateStrategy::Recreate;
}

impl ManagedResource for CSIDriver {
    const UPDATE_STRATEGY: UpdateStrategy = UpdateStrategy::Recreate;
}

/// Converge the stored object named like `desired` towards `desired`.
///
/// Never retries; every store failure is returned unchanged. When a
/// delete-then-create loses the create, the object stays absent and
/// `Error::ReplaceIncomplete` is returned; the next sync creates it.
pub async fn sync<K, S>(store: &S, mut desired: K) -> Result<SyncOutcome>
where
    K: ManagedResource,
    S: ObjectStore<K> + ?Sized,
{
    fingerprint::annotate(&mut desired)?;
    let kind = K::kind(&()).to_string();
    let name = desired.name_any();

    let outcome = match store.get(&name).await? {
        None => {
            store.create(&desired).await?;
            info!("Created {} {}", kind, name);
            SyncOutcome::Created
        }
        Some(observed) => {
            if fingerprint::matches(&observed, &desired)? {
                debug!("{} {} is up to date", kind, name);
                SyncOutcome::Unchanged
            } else {
                match K::UPDATE_STRATEGY {
                    UpdateStrategy::InPlace => {
                        desired.preserve_status(&observed);
                        desired.meta_mut().resource_version = observed.meta().resource_version.clone();
                        store.replace(&name, &desired).await?;
                        info!("Updated {} {}", kind, name);
                    }
                    UpdateStrategy::Recreate => recreate(store, &kind, &name, &desired).await?,
                }
                SyncOutcome::Updated
            }
        }
    };

    SYNC_OUTCOMES
        .with_label_values(&[kind.as_str(), outcome.as_str()])
        .inc();

    Ok(outcome)
}

async fn recreate<K, S>(store: &S, kind: &str, name: &str, desired: &K) -> Result<()>
where
    K: ManagedResource,
    S: ObjectStore<K> + ?Sized,
{
    store.delete(name).await?;
    info!("Deleted {} {} for replacement", kind, name);

    if let Err(e) = store.create(desired).await {
        warn!("{} {} is absent until the next sync: {}", kind, name, e);
        return Err(Error::ReplaceIncomplete {
            kind: kind.to_string(),
            name: name.to_string(),
            source: Box::new(e),
        });
    }
    info!("Recreated {} {}", kind, name);
    Ok(())
}
