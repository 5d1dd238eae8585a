//! Kubernetes secret fetching utilities

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;

use crate::{Error, Result};

/// Get a specific key from a secret as UTF-8 text
pub fn get_secret_key(secret: &Secret, key: &str) -> Result<String> {
    let missing = || Error::MissingKey {
        secret: secret.name_any(),
        key: key.to_string(),
    };

    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(missing)?;

    String::from_utf8(value.0.clone()).map_err(|e| {
        Error::CloudConfigError(format!(
            "invalid UTF-8 in key '{}' of secret {}: {}",
            key,
            secret.name_any(),
            e
        ))
    })
}
