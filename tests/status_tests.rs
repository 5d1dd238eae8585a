//! Tests for condition bookkeeping and the ManilaDriver resource definition

use chrono::{Duration, Utc};
use kube::CustomResourceExt;

use manila_csi_driver_operator::crd::{generate_crds, Condition, ManagementState, ManilaDriver};
use manila_csi_driver_operator::reconcilers::status::{
    disabled_condition, disabled_condition_type, remove_condition, upsert_condition,
};

fn condition(type_: &str, status: &str, reason: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: Utc::now() - Duration::hours(1),
        reason: Some(reason.to_string()),
        message: None,
    }
}

// ============================================================================
// Conditions
// ============================================================================

#[test]
fn disabled_condition_is_prefixed_and_true() {
    let c = disabled_condition("forbidden", "User doesn't have access to Manila service");

    assert_eq!(disabled_condition_type(), "ManilaControllerDisabled");
    assert_eq!(c.type_, "ManilaControllerDisabled");
    assert_eq!(c.status, "True");
    assert_eq!(c.reason.as_deref(), Some("forbidden"));
}

#[test]
fn upsert_adds_missing_condition() {
    let mut conditions = vec![condition("Available", "True", "AsExpected")];

    assert!(upsert_condition(
        &mut conditions,
        disabled_condition("forbidden", "denied")
    ));
    assert_eq!(conditions.len(), 2);
}

#[test]
fn upsert_same_observation_is_a_no_op() {
    let existing = disabled_condition("forbidden", "denied");
    let mut conditions = vec![existing.clone()];

    assert!(!upsert_condition(
        &mut conditions,
        disabled_condition("forbidden", "denied")
    ));
    assert_eq!(conditions, vec![existing]);
}

#[test]
fn upsert_keeps_transition_time_when_status_unchanged() {
    let old = condition("ManilaControllerDisabled", "True", "forbidden");
    let mut conditions = vec![old.clone()];

    assert!(upsert_condition(
        &mut conditions,
        disabled_condition("service-absent", "gone")
    ));
    assert_eq!(conditions[0].reason.as_deref(), Some("service-absent"));
    assert_eq!(conditions[0].last_transition_time, old.last_transition_time);
}

#[test]
fn upsert_moves_transition_time_when_status_flips() {
    let old = condition("ManilaControllerDisabled", "False", "AsExpected");
    let mut conditions = vec![old.clone()];

    upsert_condition(&mut conditions, disabled_condition("forbidden", "denied"));

    assert!(conditions[0].last_transition_time > old.last_transition_time);
}

#[test]
fn remove_only_touches_named_condition() {
    let mut conditions = vec![
        condition("Available", "True", "AsExpected"),
        condition("ManilaControllerDisabled", "True", "forbidden"),
    ];

    assert!(remove_condition(&mut conditions, "ManilaControllerDisabled"));
    assert!(!remove_condition(&mut conditions, "ManilaControllerDisabled"));
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].type_, "Available");
}

// ============================================================================
// Custom resource
// ============================================================================

#[test]
fn management_state_defaults_to_managed() {
    let spec: manila_csi_driver_operator::crd::ManilaDriverSpec =
        serde_json::from_str("{}").unwrap();

    assert_eq!(spec.management_state, ManagementState::Managed);
}

#[test]
fn crd_is_cluster_scoped() {
    let crd = ManilaDriver::crd();

    assert_eq!(crd.spec.group, "csi.openshift.io");
    assert_eq!(crd.spec.names.kind, "ManilaDriver");
    assert_eq!(crd.spec.scope, "Cluster");
    assert_eq!(crd.spec.versions[0].name, "v1alpha1");
}

#[test]
fn generated_crds_are_yaml() {
    let crds = generate_crds().unwrap();

    assert_eq!(crds.len(), 1);
    assert!(crds[0].contains("name: maniladrivers.csi.openshift.io"));
}
