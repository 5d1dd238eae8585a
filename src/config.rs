//! Operator configuration from command line flags and environment

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Name of the CSI driver registered by the operand
pub const DRIVER_NAME: &str = "manila.csi.openstack.org";

/// Prefix of every StorageClass created for a share type
pub const STORAGE_CLASS_NAME_PREFIX: &str = "csi-manila-";

/// Field manager and `managed-by` label value
pub const OPERATOR_NAME: &str = "manila-csi-driver-operator";

/// Runtime configuration of the operator
#[derive(Clone, Debug, Parser)]
#[command(name = "manila-csi-driver-operator", version, about)]
pub struct OperatorConfig {
    /// Port of the metrics and health endpoints
    #[arg(long, env = "METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    /// Seconds between two full control loop passes
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 20 * 60)]
    pub resync_interval_secs: u64,

    /// Seconds between two syncs of each driver sub-controller
    #[arg(long, env = "CONTROLLER_INTERVAL_SECS", default_value_t = 60)]
    pub controller_interval_secs: u64,

    /// Name of the ManilaDriver resource holding operator spec and status
    #[arg(long, env = "DRIVER_RESOURCE_NAME", default_value = "cluster")]
    pub driver_resource_name: String,

    /// Namespace the operator runs in; holds the cloud credentials secret
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "openshift-cluster-csi-drivers")]
    pub operator_namespace: String,

    /// Namespace of the CSI driver workloads
    #[arg(long, env = "OPERAND_NAMESPACE", default_value = "openshift-manila-csi-driver")]
    pub operand_namespace: String,

    /// Secret with clouds.yaml provided by the cloud credentials operator
    #[arg(long, env = "CLOUD_CREDENTIALS_SECRET", default_value = "manila-cloud-credentials")]
    pub cloud_credentials_secret: String,

    /// Secret consumed by the CSI driver
    #[arg(long, env = "DRIVER_CREDENTIALS_SECRET", default_value = "manila-driver-credentials")]
    pub driver_credentials_secret: String,

    /// clouds.yaml mounted into the operator pod
    #[arg(long, env = "CLOUD_CONFIG_PATH", default_value = "/etc/openstack/clouds.yaml")]
    pub cloud_config_path: PathBuf,

    /// Entry of clouds.yaml to use
    #[arg(long, env = "CLOUD_NAME", default_value = "openstack")]
    pub cloud_name: String,

    /// Extra CA bundle trusted when talking to OpenStack
    #[arg(long, env = "CA_BUNDLE_PATH", default_value = "/etc/openstack-ca/ca-bundle.pem")]
    pub ca_bundle_path: PathBuf,

    /// Namespace of the config map carrying the cloud provider CA bundle
    #[arg(long, env = "CA_SOURCE_NAMESPACE", default_value = "openshift-config")]
    pub ca_source_namespace: String,

    /// Name of the config map carrying the cloud provider CA bundle
    #[arg(long, env = "CA_SOURCE_NAME", default_value = "cloud-provider-config")]
    pub ca_source_name: String,

    #[command(flatten)]
    pub images: DriverImages,
}

/// Container images of the CSI driver operand
#[derive(Clone, Debug, clap::Args)]
pub struct DriverImages {
    #[arg(
        long = "manila-image",
        env = "CSI_DRIVER_MANILA_IMAGE",
        default_value = "quay.io/openshift/origin-csi-driver-manila:latest"
    )]
    pub manila: String,

    #[arg(
        long = "nfs-image",
        env = "CSI_DRIVER_NFS_IMAGE",
        default_value = "quay.io/openshift/origin-csi-driver-nfs:latest"
    )]
    pub nfs: String,

    #[arg(
        long = "provisioner-image",
        env = "EXTERNAL_PROVISIONER_IMAGE",
        default_value = "quay.io/openshift/origin-csi-external-provisioner:latest"
    )]
    pub provisioner: String,

    #[arg(
        long = "snapshotter-image",
        env = "EXTERNAL_SNAPSHOTTER_IMAGE",
        default_value = "quay.io/openshift/origin-csi-external-snapshotter:latest"
    )]
    pub snapshotter: String,

    #[arg(
        long = "registrar-image",
        env = "CSI_NODE_DRIVER_REGISTRAR_IMAGE",
        default_value = "quay.io/openshift/origin-csi-node-driver-registrar:latest"
    )]
    pub registrar: String,
}

impl OperatorConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn controller_interval(&self) -> Duration {
        Duration::from_secs(self.controller_interval_secs)
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self::parse_from([OPERATOR_NAME])
    }
}
