//! Prometheus metrics for the Manila CSI Driver Operator

pub mod prometheus;

pub use prometheus::*;
