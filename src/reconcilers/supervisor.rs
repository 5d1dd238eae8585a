//! Availability-gated start of the CSI driver controllers
//!
//! The supervisor owns the driver controllers and a one-way latch. The first
//! `Available` observation trips the latch and starts every controller; later
//! unavailability is reported through the Disabled condition but never stops
//! what already runs, so a Manila maintenance window does not uninstall the
//! driver. The latch only resets with the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::CONTROLLERS_STARTED;
use crate::reconcilers::availability::AvailabilityState;
use crate::reconcilers::status::{disabled_condition, disabled_condition_type, ConditionSink};
use crate::Result;

/// A long-running controller started by the supervisor
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    /// Run until `shutdown` is cancelled
    async fn run(&self, shutdown: CancellationToken);
}

/// Latch that can be tripped exactly once
#[derive(Debug, Default)]
pub struct StartLatch {
    started: AtomicBool,
}

impl StartLatch {
    /// Trip the latch; true only for the call that tripped it
    pub fn trip(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// Supervisor phase, derived from the latch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorPhase {
    Idle,
    Running,
}

/// The ordered controllers gated on backend availability
pub struct ManagedControllerSet {
    members: Vec<Arc<dyn Runnable>>,
    latch: StartLatch,
}

impl ManagedControllerSet {
    pub fn new(members: Vec<Arc<dyn Runnable>>) -> Self {
        Self {
            members,
            latch: StartLatch::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

pub struct ControllerSupervisor {
    controllers: ManagedControllerSet,
    sink: Arc<dyn ConditionSink>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    last_state: Mutex<AvailabilityState>,
}

impl ControllerSupervisor {
    pub fn new(
        controllers: ManagedControllerSet,
        sink: Arc<dyn ConditionSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            controllers,
            sink,
            shutdown,
            handles: Mutex::new(Vec::new()),
            last_state: Mutex::new(AvailabilityState::Unknown),
        }
    }

    pub fn phase(&self) -> SupervisorPhase {
        if self.controllers.latch.is_set() {
            SupervisorPhase::Running
        } else {
            SupervisorPhase::Idle
        }
    }

    pub fn is_started(&self) -> bool {
        self.phase() == SupervisorPhase::Running
    }

    /// Most recent state passed to `observe`
    pub async fn last_state(&self) -> AvailabilityState {
        self.last_state.lock().await.clone()
    }

    /// React to a probe result
    pub async fn observe(&self, state: &AvailabilityState) -> Result<()> {
        *self.last_state.lock().await = state.clone();

        match state {
            AvailabilityState::Available => {
                if self.controllers.latch.trip() {
                    self.start_all().await;
                }
                self.sink.remove_condition(&disabled_condition_type()).await
            }
            AvailabilityState::Unavailable { reason, message } => {
                if self.is_started() {
                    warn!(
                        "Manila became unavailable ({}), CSI driver controllers keep running",
                        reason
                    );
                }
                self.sink
                    .set_condition(disabled_condition(reason.as_str(), message))
                    .await
            }
            AvailabilityState::Unknown => Ok(()),
        }
    }

    async fn start_all(&self) {
        info!(
            "Starting {} CSI driver controllers",
            self.controllers.len()
        );
        let mut handles = self.handles.lock().await;
        for member in &self.controllers.members {
            let member = Arc::clone(member);
            let token = self.shutdown.child_token();
            info!("Starting controller {}", member.name());
            handles.push(tokio::spawn(async move {
                member.run(token).await;
            }));
        }
        CONTROLLERS_STARTED.set(handles.len() as f64);
    }

    /// Cancel every started controller and wait for them to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Controller task ended abnormally: {}", e);
            }
        }
        CONTROLLERS_STARTED.set(0.0);
    }
}
