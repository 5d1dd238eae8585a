//! Adapters for external systems and Kubernetes resource building

pub mod clouds;
pub mod credentials;
pub mod driver_objects;
pub mod labels;
pub mod openstack;
pub mod secrets;
pub mod storage_class_builder;
pub mod store;
pub mod workload_builder;
