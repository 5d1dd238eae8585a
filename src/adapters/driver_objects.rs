//! Static objects of the Manila CSI driver: namespace, CSIDriver, RBAC and services

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::api::storage::v1::{CSIDriver, CSIDriverSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::adapters::labels;
use crate::config::DRIVER_NAME;

pub const CONTROLLER_SERVICE_ACCOUNT: &str = "manila-csi-driver-controller-sa";
pub const NODE_SERVICE_ACCOUNT: &str = "manila-csi-driver-node-sa";
pub const CONTROLLER_ROLE: &str = "manila-csi-driver-controller-role";
pub const NODE_ROLE: &str = "manila-csi-driver-node-role";
pub const METRICS_SERVICE: &str = "manila-csi-driver-controller-metrics";
pub const CONTROLLER_APP: &str = "manila-csi-driver-controller";
pub const METRICS_PORT: i32 = 9101;

/// Namespace of the driver workloads
pub fn build_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels::operand("namespace")),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// CSIDriver registration; its spec is immutable once created
pub fn build_csi_driver() -> CSIDriver {
    CSIDriver {
        metadata: ObjectMeta {
            name: Some(DRIVER_NAME.to_string()),
            labels: Some(labels::operand("csi-driver")),
            ..Default::default()
        },
        spec: CSIDriverSpec {
            attach_required: Some(false),
            pod_info_on_mount: Some(false),
            fs_group_policy: Some("None".to_string()),
            ..Default::default()
        },
    }
}

/// Service account of the controller or node plugin
pub fn build_service_account(name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels::operand("rbac")),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels::operand("rbac")),
            ..Default::default()
        },
        rules: Some(rules),
        ..Default::default()
    }
}

/// Permissions of the provisioner and snapshotter sidecars
pub fn build_controller_role() -> ClusterRole {
    const READ: &[&str] = &["get", "list", "watch"];
    cluster_role(
        CONTROLLER_ROLE,
        vec![
            rule("", &["persistentvolumes"], &["get", "list", "watch", "create", "delete"]),
            rule("", &["persistentvolumeclaims"], &["get", "list", "watch", "update"]),
            rule("", &["persistentvolumeclaims/status"], &["update", "patch"]),
            rule("", &["events"], &["list", "watch", "create", "update", "patch"]),
            rule("", &["secrets"], &["get", "list"]),
            rule("", &["nodes"], READ),
            rule("storage.k8s.io", &["storageclasses", "csinodes"], READ),
            rule("snapshot.storage.k8s.io", &["volumesnapshotclasses"], READ),
            rule(
                "snapshot.storage.k8s.io",
                &["volumesnapshotcontents"],
                &["create", "get", "list", "watch", "update", "delete", "patch"],
            ),
            rule("snapshot.storage.k8s.io", &["volumesnapshotcontents/status"], &["update", "patch"]),
        ],
    )
}

/// Permissions of the node plugins
pub fn build_node_role() -> ClusterRole {
    cluster_role(
        NODE_ROLE,
        vec![
            rule("", &["configmaps"], &["get", "list"]),
            rule("", &["nodes"], &["get", "list", "update"]),
            rule("", &["namespaces"], &["get", "list"]),
            rule("", &["persistentvolumes"], &["get", "list", "watch", "update"]),
        ],
    )
}

/// Bind a cluster role to a service account of the operand
pub fn build_role_binding(role: &str, service_account: &str, namespace: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(format!("{}-binding", role)),
            labels: Some(labels::operand("rbac")),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Metrics service in front of the controller plugin
pub fn build_metrics_service(namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(METRICS_SERVICE.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels::operand("controller")),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels::selector(CONTROLLER_APP)),
            ports: Some(vec![ServicePort {
                name: Some("provisioner-m".to_string()),
                port: METRICS_PORT,
                target_port: Some(IntOrString::String("provisioner-m".to_string())),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy of the cloud CA bundle mounted into the driver pods
pub fn build_ca_bundle_config_map(name: &str, namespace: &str, key: &str, bundle: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels::operand("ca-bundle")),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(key.to_string(), bundle.to_string())])),
        ..Default::default()
    }
}
