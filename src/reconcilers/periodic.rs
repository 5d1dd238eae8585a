//! Interval-driven controllers

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{CONTROLLER_SYNCS, CONTROLLER_SYNC_ERRORS};
use crate::reconcilers::supervisor::Runnable;
use crate::Result;

/// One idempotent unit of convergence work
#[async_trait]
pub trait SyncTask: Send + Sync {
    fn name(&self) -> &str;

    async fn sync_once(&self) -> Result<()>;
}

/// Runs a `SyncTask` immediately and then on every interval tick.
///
/// A failed sync is logged and counted; the next tick retries it.
pub struct PeriodicController<T> {
    task: T,
    interval: Duration,
}

impl<T: SyncTask> PeriodicController<T> {
    pub fn new(task: T, interval: Duration) -> Self {
        Self { task, interval }
    }
}

#[async_trait]
impl<T: SyncTask> Runnable for PeriodicController<T> {
    fn name(&self) -> &str {
        self.task.name()
    }

    async fn run(&self, shutdown: CancellationToken) {
        let name = self.task.name();
        info!("Controller {} running every {:?}", name, self.interval);

        loop {
            CONTROLLER_SYNCS.with_label_values(&[name]).inc();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.task.sync_once() => match result {
                    Ok(()) => debug!("Controller {} synced", name),
                    Err(e) => {
                        CONTROLLER_SYNC_ERRORS.with_label_values(&[name]).inc();
                        warn!("Controller {} failed to sync: {}", name, e);
                    }
                },
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Controller {} stopped", name);
    }
}
