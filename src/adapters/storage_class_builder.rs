//! StorageClass builder for Manila share types

use std::collections::BTreeMap;

use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::adapters::labels;
use crate::config::{DRIVER_NAME, STORAGE_CLASS_NAME_PREFIX};

const SECRET_PARAMETERS: [&str; 3] = [
    "csi.storage.k8s.io/provisioner-secret",
    "csi.storage.k8s.io/node-stage-secret",
    "csi.storage.k8s.io/node-publish-secret",
];

/// A share type offered by Manila
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareTypeEntry {
    pub id: String,
    pub name: String,
}

/// Where the driver finds its OpenStack credentials
#[derive(Clone, Debug)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

/// Name of the StorageClass that exposes a share type
pub fn storage_class_name(share_type: &ShareTypeEntry) -> String {
    format!("{}{}", STORAGE_CLASS_NAME_PREFIX, share_type.name.to_lowercase())
}

/// Build the StorageClass for a share type
pub fn build_storage_class(share_type: &ShareTypeEntry, secret: &SecretRef) -> StorageClass {
    let mut parameters = BTreeMap::new();
    parameters.insert("type".to_string(), share_type.name.clone());
    for prefix in SECRET_PARAMETERS {
        parameters.insert(format!("{}-name", prefix), secret.name.clone());
        parameters.insert(format!("{}-namespace", prefix), secret.namespace.clone());
    }

    StorageClass {
        metadata: ObjectMeta {
            name: Some(storage_class_name(share_type)),
            labels: Some(labels::operand("storage-class")),
            ..Default::default()
        },
        provisioner: DRIVER_NAME.to_string(),
        parameters: Some(parameters),
        reclaim_policy: Some("Delete".to_string()),
        volume_binding_mode: Some("Immediate".to_string()),
        ..Default::default()
    }
}
