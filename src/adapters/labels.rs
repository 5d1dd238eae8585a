//! Common labels stamped on every object the operator owns

use std::collections::BTreeMap;

use crate::config::OPERATOR_NAME;

pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const COMPONENT: &str = "app.kubernetes.io/component";
pub const APP: &str = "app";

/// Label selector matching every object managed by the operator
pub fn managed_selector() -> String {
    format!("{}={}", MANAGED_BY, OPERATOR_NAME)
}

/// Labels for an operand object of the given component
pub fn operand(component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "manila-csi-driver".to_string(),
    );
    labels.insert(COMPONENT.to_string(), component.to_string());
    labels.insert(MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
    labels
}

/// Pod selector labels of a driver workload
pub fn selector(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP.to_string(), app.to_string())])
}

/// Full labels of a driver workload: operand labels plus its selector
pub fn workload(component: &str, app: &str) -> BTreeMap<String, String> {
    let mut labels = operand(component);
    labels.extend(selector(app));
    labels
}
