//! Deployment and DaemonSet builders for the Manila CSI driver plugins

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, HostPathVolumeSource, KeyToPath, ObjectFieldSelector, PodSpec, PodTemplateSpec,
    SecurityContext, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::adapters::driver_objects::{
    CONTROLLER_APP, CONTROLLER_SERVICE_ACCOUNT, METRICS_PORT, NODE_SERVICE_ACCOUNT,
};
use crate::adapters::labels;
use crate::config::{DriverImages, DRIVER_NAME};

pub const CONTROLLER_DEPLOYMENT: &str = "manila-csi-driver-controller";
pub const NODE_DAEMONSET: &str = "manila-csi-driver-node";
pub const NFS_NODE_DAEMONSET: &str = "csi-nodeplugin-nfsplugin";
pub const NODE_APP: &str = "manila-csi-driver-node";
pub const NFS_NODE_APP: &str = "csi-nodeplugin-nfsplugin";

/// Pod template annotation carrying the driver secret digest
pub const CREDENTIALS_CHECKSUM_ANNOTATION: &str = "checksum/credentials";

/// Config map in the operand namespace holding the cloud provider CA bundle
pub const CA_BUNDLE_CONFIG_MAP: &str = "cloud-provider-config";
/// Key of the CA bundle in the config map
pub const CA_BUNDLE_KEY: &str = "ca-bundle.pem";
/// Where driver containers find the CA bundle
pub const DRIVER_CA_BUNDLE_DIR: &str = "/usr/share/pki/ca-trust-source";
pub const DRIVER_CA_BUNDLE_FILE: &str = "cloud-provider-ca-bundle.pem";

const PLUGIN_DIR: &str = "/var/lib/kubelet/plugins/manila.csi.openstack.org";
const NFS_PLUGIN_DIR: &str = "/var/lib/kubelet/plugins/csi-nfsplugin";
const PODS_DIR: &str = "/var/lib/kubelet/pods";
const REGISTRATION_DIR: &str = "/var/lib/kubelet/plugins_registry";

/// Full path of the CA bundle inside driver containers
pub fn driver_ca_bundle_path() -> String {
    format!("{}/{}", DRIVER_CA_BUNDLE_DIR, DRIVER_CA_BUNDLE_FILE)
}

/// Build the controller plugin Deployment
pub fn build_controller_deployment(
    namespace: &str,
    images: &DriverImages,
    credentials_checksum: &str,
) -> Deployment {
    let labels = labels::workload("controller", CONTROLLER_APP);
    let socket = "unix:///var/lib/csi/sockets/pluginproxy/csi.sock";
    let fwd_socket = "unix:///var/lib/csi/sockets/pluginproxy/nfs/csi.sock";

    let mut manila = plugin_container("csi-driver", &images.manila, socket, fwd_socket);
    manila.volume_mounts = Some(vec![
        mount("socket-dir", "/var/lib/csi/sockets/pluginproxy/"),
        mount("ca-bundle", DRIVER_CA_BUNDLE_DIR),
    ]);

    let mut nfs = nfs_container(&images.nfs, fwd_socket);
    nfs.volume_mounts = Some(vec![mount("nfs-socket-dir", "/var/lib/csi/sockets/pluginproxy/nfs")]);

    let mut provisioner = sidecar("csi-provisioner", &images.provisioner, "/var/lib/csi/sockets/pluginproxy/csi.sock");
    provisioner.args.get_or_insert_with(Vec::new).extend([
        "--timeout=120s".to_string(),
        format!("--metrics-address=0.0.0.0:{}", METRICS_PORT),
    ]);
    provisioner.ports = Some(vec![ContainerPort {
        name: Some("provisioner-m".to_string()),
        container_port: METRICS_PORT,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]);
    provisioner.volume_mounts = Some(vec![mount("socket-dir", "/var/lib/csi/sockets/pluginproxy/")]);

    let mut snapshotter = sidecar("csi-snapshotter", &images.snapshotter, "/var/lib/csi/sockets/pluginproxy/csi.sock");
    snapshotter.volume_mounts = Some(vec![mount("socket-dir", "/var/lib/csi/sockets/pluginproxy/")]);

    let pod_spec = PodSpec {
        service_account_name: Some(CONTROLLER_SERVICE_ACCOUNT.to_string()),
        priority_class_name: Some("system-cluster-critical".to_string()),
        node_selector: Some(BTreeMap::from([(
            "node-role.kubernetes.io/master".to_string(),
            String::new(),
        )])),
        tolerations: Some(vec![Toleration {
            key: Some("node-role.kubernetes.io/master".to_string()),
            operator: Some("Exists".to_string()),
            effect: Some("NoSchedule".to_string()),
            ..Default::default()
        }]),
        containers: vec![manila, nfs, provisioner, snapshotter],
        volumes: Some(vec![
            empty_dir("socket-dir"),
            empty_dir("nfs-socket-dir"),
            ca_bundle_volume(),
        ]),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(CONTROLLER_DEPLOYMENT.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels::selector(CONTROLLER_APP)),
                ..Default::default()
            },
            template: pod_template(labels, credentials_checksum, pod_spec),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the Manila node plugin DaemonSet
pub fn build_node_daemonset(
    namespace: &str,
    images: &DriverImages,
    credentials_checksum: &str,
) -> DaemonSet {
    let labels = labels::workload("node", NODE_APP);
    let socket = format!("unix://{}/csi.sock", PLUGIN_DIR);
    let fwd_socket = format!("unix://{}/csi.sock", NFS_PLUGIN_DIR);

    let mut manila = plugin_container("csi-driver", &images.manila, &socket, &fwd_socket);
    manila.security_context = Some(privileged());
    manila.volume_mounts = Some(vec![
        mount("plugin-dir", PLUGIN_DIR),
        mount("fwd-plugin-dir", NFS_PLUGIN_DIR),
        bidirectional_mount("pod-mounts", PODS_DIR),
        mount("ca-bundle", DRIVER_CA_BUNDLE_DIR),
    ]);

    let registrar = Container {
        name: "csi-node-driver-registrar".to_string(),
        image: Some(images.registrar.clone()),
        args: Some(vec![
            "--v=2".to_string(),
            "--csi-address=/csi/csi.sock".to_string(),
            format!("--kubelet-registration-path={}/csi.sock", PLUGIN_DIR),
        ]),
        volume_mounts: Some(vec![
            mount("plugin-dir", "/csi"),
            mount("registration-dir", "/registration"),
        ]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    };

    let pod_spec = PodSpec {
        service_account_name: Some(NODE_SERVICE_ACCOUNT.to_string()),
        priority_class_name: Some("system-node-critical".to_string()),
        host_network: Some(true),
        tolerations: Some(vec![tolerate_all()]),
        containers: vec![manila, registrar],
        volumes: Some(vec![
            host_path("plugin-dir", PLUGIN_DIR, "DirectoryOrCreate"),
            host_path("fwd-plugin-dir", NFS_PLUGIN_DIR, "DirectoryOrCreate"),
            host_path("registration-dir", REGISTRATION_DIR, "Directory"),
            host_path("pod-mounts", PODS_DIR, "Directory"),
            ca_bundle_volume(),
        ]),
        ..Default::default()
    };

    daemonset(NODE_DAEMONSET, namespace, labels, NODE_APP, credentials_checksum, pod_spec)
}

/// Build the NFS node plugin DaemonSet that mounts Manila NFS shares
pub fn build_nfs_node_daemonset(namespace: &str, images: &DriverImages) -> DaemonSet {
    let labels = labels::workload("nfs-node", NFS_NODE_APP);

    let mut nfs = nfs_container(&images.nfs, "unix://plugin/csi.sock");
    nfs.args.get_or_insert_with(Vec::new).push("--mount-permissions=0777".to_string());
    nfs.security_context = Some(privileged());
    nfs.volume_mounts = Some(vec![
        mount("plugin-dir", "/plugin"),
        bidirectional_mount("pods-mount-dir", PODS_DIR),
    ]);

    let pod_spec = PodSpec {
        service_account_name: Some(NODE_SERVICE_ACCOUNT.to_string()),
        priority_class_name: Some("system-node-critical".to_string()),
        host_network: Some(true),
        tolerations: Some(vec![tolerate_all()]),
        containers: vec![nfs],
        volumes: Some(vec![
            host_path("plugin-dir", NFS_PLUGIN_DIR, "DirectoryOrCreate"),
            host_path("pods-mount-dir", PODS_DIR, "Directory"),
        ]),
        ..Default::default()
    };

    daemonset(NFS_NODE_DAEMONSET, namespace, labels, NFS_NODE_APP, "", pod_spec)
}

fn daemonset(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    app: &str,
    credentials_checksum: &str,
    pod_spec: PodSpec,
) -> DaemonSet {
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels::selector(app)),
                ..Default::default()
            },
            template: pod_template(labels, credentials_checksum, pod_spec),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_template(
    labels: BTreeMap<String, String>,
    credentials_checksum: &str,
    spec: PodSpec,
) -> PodTemplateSpec {
    let annotations = if credentials_checksum.is_empty() {
        None
    } else {
        Some(BTreeMap::from([(
            CREDENTIALS_CHECKSUM_ANNOTATION.to_string(),
            credentials_checksum.to_string(),
        )]))
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            annotations,
            ..Default::default()
        }),
        spec: Some(spec),
    }
}

fn plugin_container(name: &str, image: &str, endpoint: &str, fwd_endpoint: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        args: Some(vec![
            "--v=2".to_string(),
            "--nodeid=$(NODE_ID)".to_string(),
            "--endpoint=$(CSI_ENDPOINT)".to_string(),
            "--drivername=$(DRIVER_NAME)".to_string(),
            "--share-protocol-selector=$(MANILA_SHARE_PROTO)".to_string(),
            "--fwdendpoint=$(FWD_CSI_ENDPOINT)".to_string(),
        ]),
        env: Some(vec![
            env("DRIVER_NAME", DRIVER_NAME),
            node_name_env(),
            env("CSI_ENDPOINT", endpoint),
            env("FWD_CSI_ENDPOINT", fwd_endpoint),
            env("MANILA_SHARE_PROTO", "NFS"),
        ]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    }
}

fn nfs_container(image: &str, endpoint: &str) -> Container {
    Container {
        name: "csi-driver-nfs".to_string(),
        image: Some(image.to_string()),
        args: Some(vec![
            "--nodeid=$(NODE_ID)".to_string(),
            format!("--endpoint={}", endpoint),
        ]),
        env: Some(vec![node_name_env()]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    }
}

fn sidecar(name: &str, image: &str, socket_path: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        args: Some(vec![
            "--v=2".to_string(),
            "--csi-address=$(ADDRESS)".to_string(),
        ]),
        env: Some(vec![env("ADDRESS", socket_path)]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn node_name_env() -> EnvVar {
    EnvVar {
        name: "NODE_ID".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "spec.nodeName".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn privileged() -> SecurityContext {
    SecurityContext {
        privileged: Some(true),
        allow_privilege_escalation: Some(true),
        capabilities: Some(Capabilities {
            add: Some(vec!["SYS_ADMIN".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn tolerate_all() -> Toleration {
    Toleration {
        operator: Some("Exists".to_string()),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn bidirectional_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        mount_propagation: Some("Bidirectional".to_string()),
        ..mount(name, path)
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

fn host_path(name: &str, path: &str, type_: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            type_: Some(type_.to_string()),
        }),
        ..Default::default()
    }
}

fn ca_bundle_volume() -> Volume {
    Volume {
        name: "ca-bundle".to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: CA_BUNDLE_CONFIG_MAP.to_string(),
            optional: Some(true),
            items: Some(vec![KeyToPath {
                key: CA_BUNDLE_KEY.to_string(),
                path: DRIVER_CA_BUNDLE_FILE.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
