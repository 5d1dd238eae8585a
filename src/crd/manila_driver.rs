//! ManilaDriver Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ManilaDriver resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "csi.openshift.io",
    version = "v1alpha1",
    kind = "ManilaDriver",
    plural = "maniladrivers",
    singular = "maniladriver",
    status = "ManilaDriverStatus",
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".spec.managementState"}"#,
    printcolumn = r#"{"name": "Started", "type": "boolean", "jsonPath": ".status.controllersStarted"}"#,
    printcolumn = r#"{"name": "StorageClasses", "type": "integer", "jsonPath": ".status.storageClasses"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManilaDriverSpec {
    /// Whether the operator manages the driver (Managed, Unmanaged, Removed)
    #[serde(default)]
    pub management_state: ManagementState,
}

/// Management state of the operand
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ManagementState {
    #[default]
    Managed,
    Unmanaged,
    Removed,
}

/// ManilaDriver status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManilaDriverStatus {
    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Number of StorageClasses synced during the last pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_classes: Option<u32>,

    /// Whether the CSI driver controllers have been started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controllers_started: Option<bool>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. ManilaControllerDisabled
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Whether two conditions carry the same observation, ignoring timestamps
    pub fn same_observation(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
