//! StorageClass per Manila share type
//!
//! Every share type in the catalog gets a StorageClass. Classes are added and
//! updated, never pruned: a share type that disappears from Manila keeps its
//! class, because Manila may only be under maintenance.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::storage::v1::StorageClass;
use tracing::{debug, warn};

use crate::adapters::storage_class_builder::{
    build_storage_class, storage_class_name, SecretRef, ShareTypeEntry,
};
use crate::adapters::store::ObjectStore;
use crate::metrics::MANAGED_STORAGE_CLASSES;
use crate::reconcilers::resource::{self, SyncOutcome};
use crate::{Error, Result};

/// Sync one StorageClass per share type.
///
/// Every entry is attempted; failures are collected into `Error::Aggregate`.
/// The first share type mapping to a name owns it, even when its sync fails.
/// Returns the outcome per StorageClass name.
pub async fn sync_all(
    store: &dyn ObjectStore<StorageClass>,
    catalog: &[ShareTypeEntry],
    secret: &SecretRef,
) -> Result<BTreeMap<String, SyncOutcome>> {
    let mut outcomes = BTreeMap::new();
    let mut claimed = BTreeSet::new();
    let mut errors = Vec::new();

    for share_type in catalog {
        let name = storage_class_name(share_type);
        if !claimed.insert(name.clone()) {
            warn!(
                "Share type {} ({}) maps to StorageClass {} which is already taken, skipping",
                share_type.name, share_type.id, name
            );
            continue;
        }

        debug!("Syncing StorageClass {} for share type {}", name, share_type.name);
        match resource::sync(store, build_storage_class(share_type, secret)).await {
            Ok(outcome) => {
                outcomes.insert(name, outcome);
            }
            Err(e) => {
                warn!("Failed to sync StorageClass {}: {}", name, e);
                errors.push(e);
            }
        }
    }

    MANAGED_STORAGE_CLASSES.set(outcomes.len() as f64);
    Error::aggregate(errors)?;
    Ok(outcomes)
}
