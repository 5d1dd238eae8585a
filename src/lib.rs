//! Manila CSI Driver Operator
//!
//! Deploys the OpenStack Manila CSI driver once Manila is reachable with the
//! cluster's cloud credentials, and exposes every Manila share type as a
//! StorageClass.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
