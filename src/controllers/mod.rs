//! Controller implementations for watching and reconciling resources

pub mod manila_controller;

use std::sync::Arc;

use kube::Client;

use crate::config::OperatorConfig;
use crate::reconcilers::manila::ManilaSync;
use crate::reconcilers::status::DriverStatus;

/// Shared context for controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub config: OperatorConfig,
    /// The Manila pass and the supervisor it drives
    pub manila: ManilaSync,
    pub status: Arc<DriverStatus>,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Client,
        config: OperatorConfig,
        manila: ManilaSync,
        status: Arc<DriverStatus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            manila,
            status,
        })
    }
}
