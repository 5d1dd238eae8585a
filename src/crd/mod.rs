//! Custom Resource Definitions for the Manila CSI Driver Operator

mod manila_driver;

pub use manila_driver::*;

use kube::CustomResourceExt;

/// Generate CRD YAML manifests for all custom resources
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&ManilaDriver::crd())?])
}
