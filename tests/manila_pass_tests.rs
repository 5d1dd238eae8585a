//! Integration tests for a full Manila controller pass

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use k8s_openapi::api::storage::v1::StorageClass;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{
    settle, share_type, CountingRunnable, MemoryStore, Op, RecordingSink, Reply, ScriptedCatalog,
};
use manila_csi_driver_operator::adapters::storage_class_builder::SecretRef;
use manila_csi_driver_operator::controllers::manila_controller::requeue_after;
use manila_csi_driver_operator::crd::{ManagementState, ManilaDriver, ManilaDriverSpec};
use manila_csi_driver_operator::reconcilers::availability::{AvailabilityState, UnavailableReason};
use manila_csi_driver_operator::reconcilers::manila::{ManilaSync, PassOutcome};
use manila_csi_driver_operator::reconcilers::status::{disabled_condition_type, PassRecord};
use manila_csi_driver_operator::reconcilers::supervisor::{
    ControllerSupervisor, ManagedControllerSet, Runnable,
};
use manila_csi_driver_operator::Error;

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    manila: ManilaSync,
    catalog: Arc<ScriptedCatalog>,
    store: Arc<MemoryStore<StorageClass>>,
    sink: Arc<RecordingSink>,
    controller: Arc<CountingRunnable>,
}

fn harness(replies: Vec<Reply>) -> Harness {
    let catalog = Arc::new(ScriptedCatalog::new(replies));
    let store = Arc::new(MemoryStore::<StorageClass>::new());
    let sink = Arc::new(RecordingSink::default());
    let controller = CountingRunnable::new("controller-service");

    let supervisor = ControllerSupervisor::new(
        ManagedControllerSet::new(vec![controller.clone() as Arc<dyn Runnable>]),
        sink.clone(),
        CancellationToken::new(),
    );
    let manila = ManilaSync::new(
        catalog.clone(),
        store.clone(),
        supervisor,
        SecretRef {
            namespace: "openshift-manila-csi-driver".to_string(),
            name: "manila-driver-credentials".to_string(),
        },
    );

    Harness {
        manila,
        catalog,
        store,
        sink,
        controller,
    }
}

fn driver(state: ManagementState) -> ManilaDriver {
    ManilaDriver::new(
        "cluster",
        ManilaDriverSpec {
            management_state: state,
        },
    )
}

// ============================================================================
// Passes
// ============================================================================

#[tokio::test]
async fn pass_with_share_types_starts_controllers_and_syncs_classes() {
    let h = harness(vec![Reply::Types(vec![
        share_type("1", "Default"),
        share_type("2", "gold"),
    ])]);

    let outcome = h.manila.sync_pass(&driver(ManagementState::Managed)).await.unwrap();
    settle().await;

    assert_eq!(
        outcome,
        PassOutcome::Synced {
            state: AvailabilityState::Available,
            storage_classes: Some(2),
        }
    );
    assert_eq!(h.controller.starts(), 1);
    assert_eq!(h.store.names(), vec!["csi-manila-default", "csi-manila-gold"]);
    assert!(h.manila.supervisor().is_started());
}

#[tokio::test]
async fn pass_without_manila_syncs_nothing() {
    let h = harness(vec![Reply::Absent]);

    let outcome = h.manila.sync_pass(&driver(ManagementState::Managed)).await.unwrap();
    settle().await;

    assert_matches!(
        outcome,
        PassOutcome::Synced {
            state: AvailabilityState::Unavailable {
                reason: UnavailableReason::ServiceAbsent,
                ..
            },
            storage_classes: None,
        }
    );
    assert_eq!(h.controller.starts(), 0);
    assert_eq!(h.store.writes(), 0);
    assert!(h.sink.get(&disabled_condition_type()).is_some());
}

#[tokio::test]
async fn pass_transient_probe_failure_leaves_state_untouched() {
    let h = harness(vec![Reply::Unreachable]);

    let result = h.manila.sync_pass(&driver(ManagementState::Managed)).await;

    assert_matches!(result, Err(Error::CatalogError(_)));
    assert_eq!(h.manila.supervisor().last_state().await, AvailabilityState::Unknown);
    assert!(h.sink.conditions().is_empty());
    assert_eq!(h.store.writes(), 0);
}

#[tokio::test]
async fn pass_is_skipped_unless_managed() {
    for state in [ManagementState::Unmanaged, ManagementState::Removed] {
        let h = harness(vec![Reply::Types(vec![share_type("1", "Default")])]);

        let outcome = h.manila.sync_pass(&driver(state)).await.unwrap();

        assert_eq!(outcome, PassOutcome::Skipped(state));
        assert_eq!(h.catalog.calls(), 0);
        assert_eq!(h.store.writes(), 0);
    }
}

#[tokio::test]
async fn controllers_keep_running_when_manila_disappears() {
    let h = harness(vec![
        Reply::Types(vec![share_type("1", "Default")]),
        Reply::Forbidden,
    ]);

    h.manila.sync_pass(&driver(ManagementState::Managed)).await.unwrap();
    let outcome = h.manila.sync_pass(&driver(ManagementState::Managed)).await.unwrap();
    settle().await;

    assert_matches!(outcome, PassOutcome::Synced { storage_classes: None, .. });
    assert_eq!(h.controller.starts(), 1);
    assert_eq!(h.controller.stops(), 0);
    assert_eq!(h.store.names(), vec!["csi-manila-default"]);
}

#[tokio::test]
async fn failed_pass_still_records_started_controllers() {
    let h = harness(vec![Reply::Types(vec![share_type("1", "Default")])]);
    h.store.fail(Op::Create, "csi-manila-default");

    let result = h.manila.sync_pass(&driver(ManagementState::Managed)).await;
    let record = PassRecord::new(Some(3), &result, h.manila.supervisor().is_started());

    assert_matches!(result, Err(Error::Aggregate(_)));
    assert_eq!(
        record,
        PassRecord {
            observed_generation: None,
            storage_classes: None,
            controllers_started: true,
        }
    );
    assert_eq!(record.to_patch(), json!({ "status": { "controllersStarted": true } }));
}

#[tokio::test]
async fn successful_pass_records_generation_and_class_count() {
    let h = harness(vec![Reply::Types(vec![
        share_type("1", "Default"),
        share_type("2", "gold"),
    ])]);

    let result = h.manila.sync_pass(&driver(ManagementState::Managed)).await;
    let record = PassRecord::new(Some(3), &result, h.manila.supervisor().is_started());

    assert_eq!(
        record.to_patch(),
        json!({
            "status": {
                "observedGeneration": 3,
                "storageClasses": 2,
                "controllersStarted": true
            }
        })
    );
}

// ============================================================================
// Error policy
// ============================================================================

#[test]
fn error_policy_retries_config_problems_slowly() {
    let missing = Error::MissingKey {
        secret: "manila-cloud-credentials".to_string(),
        key: "clouds.yaml".to_string(),
    };

    assert_eq!(requeue_after(&missing).as_secs(), 300);
    assert_eq!(requeue_after(&Error::CloudConfigError("bad".to_string())).as_secs(), 300);
    assert_eq!(requeue_after(&Error::ConfigError("bad".to_string())).as_secs(), 300);
}

#[test]
fn error_policy_retries_aggregates_after_a_minute() {
    let aggregate = Error::Aggregate(vec![Error::ConfigError("one".to_string())]);

    assert_eq!(requeue_after(&aggregate).as_secs(), 60);
}

#[test]
fn aggregate_of_nothing_is_ok() {
    assert!(Error::aggregate(Vec::new()).is_ok());
    assert_matches!(
        Error::aggregate(vec![Error::ConfigError("x".to_string())]),
        Err(Error::Aggregate(ref errors)) if errors.len() == 1
    );
}

#[test]
fn aggregate_message_lists_every_failure() {
    let err = Error::Aggregate(vec![
        Error::ConfigError("first".to_string()),
        Error::ConfigError("second".to_string()),
    ]);

    assert_eq!(
        err.to_string(),
        "[Configuration error: first, Configuration error: second]"
    );
}
