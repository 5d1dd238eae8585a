//! One pass of the Manila controller
//!
//! Probe the share type catalog, let the supervisor react to availability,
//! and, while Manila is available, converge one StorageClass per share type.

use std::sync::Arc;

use k8s_openapi::api::storage::v1::StorageClass;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::adapters::openstack::ShareTypeCatalog;
use crate::adapters::storage_class_builder::SecretRef;
use crate::adapters::store::ObjectStore;
use crate::crd::{ManagementState, ManilaDriver};
use crate::reconcilers::availability::{self, AvailabilityState};
use crate::reconcilers::share_types;
use crate::reconcilers::supervisor::ControllerSupervisor;
use crate::Result;

/// What a pass did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The resource is not in the Managed state; nothing was touched
    Skipped(ManagementState),
    /// The backend was probed; `storage_classes` is set when classes were synced
    Synced {
        state: AvailabilityState,
        storage_classes: Option<u32>,
    },
}

pub struct ManilaSync {
    catalog: Arc<dyn ShareTypeCatalog>,
    storage_classes: Arc<dyn ObjectStore<StorageClass>>,
    supervisor: ControllerSupervisor,
    secret: SecretRef,
}

impl ManilaSync {
    pub fn new(
        catalog: Arc<dyn ShareTypeCatalog>,
        storage_classes: Arc<dyn ObjectStore<StorageClass>>,
        supervisor: ControllerSupervisor,
        secret: SecretRef,
    ) -> Self {
        Self {
            catalog,
            storage_classes,
            supervisor,
            secret,
        }
    }

    pub fn supervisor(&self) -> &ControllerSupervisor {
        &self.supervisor
    }

    /// Run one pass for the driver resource.
    ///
    /// Transient probe failures are returned before the supervisor sees them,
    /// so a flaky catalog never flips availability.
    pub async fn sync_pass(&self, driver: &ManilaDriver) -> Result<PassOutcome> {
        let state = driver.spec.management_state;
        if state != ManagementState::Managed {
            debug!("ManilaDriver {} is {:?}, skipping", driver.name_any(), state);
            return Ok(PassOutcome::Skipped(state));
        }

        let probe = availability::probe(self.catalog.as_ref()).await?;
        self.supervisor.observe(&probe.state).await?;

        if !probe.state.is_available() {
            return Ok(PassOutcome::Synced {
                state: probe.state,
                storage_classes: None,
            });
        }

        let outcomes =
            share_types::sync_all(self.storage_classes.as_ref(), &probe.catalog, &self.secret)
                .await?;
        info!("Synced {} StorageClasses for Manila share types", outcomes.len());

        Ok(PassOutcome::Synced {
            state: probe.state,
            storage_classes: Some(outcomes.len() as u32),
        })
    }
}
