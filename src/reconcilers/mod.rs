//! Reconciliation logic for the Manila CSI driver

pub mod availability;
pub mod driver;
pub mod fingerprint;
pub mod manila;
pub mod periodic;
pub mod resource;
pub mod share_types;
pub mod status;
pub mod supervisor;
