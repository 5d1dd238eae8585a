//! Detection of the Manila service behind the cloud credentials
//!
//! Permission and absence failures are steady states that gate the driver;
//! any other catalog failure is transient and is returned as an error so the
//! pass is retried instead of flipping availability.

use std::fmt;

use tracing::{debug, info};

use crate::adapters::openstack::{CatalogError, ShareTypeCatalog};
use crate::adapters::storage_class_builder::ShareTypeEntry;
use crate::metrics::BACKEND_AVAILABLE;
use crate::Result;

/// Why the backend is considered unavailable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Manila answered but offers no share types
    EmptyCatalog,
    /// The credentials may not list share types
    Forbidden,
    /// The cloud has no Manila endpoint
    ServiceAbsent,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::EmptyCatalog => "empty-catalog",
            UnavailableReason::Forbidden => "forbidden",
            UnavailableReason::ServiceAbsent => "service-absent",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of the backend as last observed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AvailabilityState {
    #[default]
    Unknown,
    Available,
    Unavailable {
        reason: UnavailableReason,
        message: String,
    },
}

impl AvailabilityState {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityState::Available)
    }

    fn unavailable(reason: UnavailableReason, message: &str) -> Self {
        AvailabilityState::Unavailable {
            reason,
            message: message.to_string(),
        }
    }
}

/// Outcome of one probe
#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub catalog: Vec<ShareTypeEntry>,
    pub state: AvailabilityState,
}

/// List the share type catalog and classify the backend
pub async fn probe(catalog: &dyn ShareTypeCatalog) -> Result<ProbeResult> {
    let result = match catalog.list_share_types().await {
        Ok(share_types) if share_types.is_empty() => {
            debug!("Manila does not provide any share types");
            ProbeResult {
                catalog: share_types,
                state: AvailabilityState::unavailable(
                    UnavailableReason::EmptyCatalog,
                    "Manila does not provide any share types",
                ),
            }
        }
        Ok(share_types) => {
            debug!("Manila provides {} share types", share_types.len());
            ProbeResult {
                catalog: share_types,
                state: AvailabilityState::Available,
            }
        }
        Err(CatalogError::Forbidden(e)) => {
            info!("User doesn't have access to Manila service: {}", e);
            ProbeResult {
                catalog: Vec::new(),
                state: AvailabilityState::unavailable(
                    UnavailableReason::Forbidden,
                    "User doesn't have access to Manila service",
                ),
            }
        }
        Err(e @ CatalogError::EndpointNotFound { .. }) => {
            info!("This OpenStack cluster does not provide Manila service: {}", e);
            ProbeResult {
                catalog: Vec::new(),
                state: AvailabilityState::unavailable(
                    UnavailableReason::ServiceAbsent,
                    "This OpenStack cluster does not provide Manila service",
                ),
            }
        }
        Err(e) => return Err(e.into()),
    };

    BACKEND_AVAILABLE.set(if result.state.is_available() { 1.0 } else { 0.0 });
    Ok(result)
}
