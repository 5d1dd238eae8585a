//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for all custom resources
//! defined by the manila-csi-driver-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use manila_csi_driver_operator::crd::generate_crds;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
