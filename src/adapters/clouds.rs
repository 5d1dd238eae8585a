//! clouds.yaml model shared by the catalog client and the credentials translator

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level clouds.yaml document
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Clouds {
    #[serde(default)]
    pub clouds: BTreeMap<String, Cloud>,
}

/// One named cloud profile
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Cloud {
    #[serde(default)]
    pub auth: AuthInfo,

    #[serde(default)]
    pub region_name: String,

    /// Path of a CA bundle to trust
    #[serde(default)]
    pub cacert: String,
}

/// Keystone authentication parameters; empty strings mean "not supplied"
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AuthInfo {
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "tenant_id")]
    pub project_id: String,
    #[serde(default, alias = "tenant_name")]
    pub project_name: String,
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub project_domain_id: String,
    #[serde(default)]
    pub project_domain_name: String,
    #[serde(default)]
    pub user_domain_id: String,
    #[serde(default)]
    pub user_domain_name: String,
}

/// Parse clouds.yaml content and pick the named cloud
pub fn parse_cloud(content: &str, cloud_name: &str) -> Result<Cloud> {
    let mut clouds: Clouds = serde_yaml::from_str(content).map_err(|e| {
        Error::CloudConfigError(format!("failed to unmarshal clouds credentials: {}", e))
    })?;

    clouds.clouds.remove(cloud_name).ok_or_else(|| {
        Error::CloudConfigError(format!("cloud {:?} not found in clouds credentials", cloud_name))
    })
}

/// Read clouds.yaml from disk and pick the named cloud
pub async fn load_cloud(path: &Path, cloud_name: &str) -> Result<Cloud> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::CloudConfigError(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_cloud(&content, cloud_name)
}
