//! Last-applied fingerprints
//!
//! A fingerprint is the canonical JSON of an object's logical content: store
//! assigned metadata, status and the fingerprint annotation itself are
//! removed and mapping keys are sorted. It is stored on the object so the
//! next observation carries its own baseline.

use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::Result;

/// Annotation holding the last applied fingerprint
pub const LAST_APPLIED_ANNOTATION: &str = "manila.csi.openshift.io/last-applied";

const STORE_ASSIGNED_METADATA: [&str; 8] = [
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
    "managedFields",
    "selfLink",
    "deletionTimestamp",
    "deletionGracePeriodSeconds",
];

/// Compute the canonical fingerprint of an object
pub fn fingerprint<K: Serialize>(object: &K) -> Result<String> {
    let mut value = serde_json::to_value(object)?;
    strip(&mut value);
    Ok(serde_json::to_string(&canonical(value))?)
}

/// Store the fingerprint of `object` in its own annotations
pub fn annotate<K: Resource + Serialize>(object: &mut K) -> Result<()> {
    let fingerprint = fingerprint(object)?;
    object
        .annotations_mut()
        .insert(LAST_APPLIED_ANNOTATION.to_string(), fingerprint);
    Ok(())
}

/// The fingerprint stored on an object, if any
pub fn last_applied<K: Resource>(object: &K) -> Option<&str> {
    object
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
        .map(String::as_str)
}

/// Whether `observed` was last applied from the same logical content as `desired`.
///
/// Mappings compare regardless of key order; sequences and scalars compare
/// exactly. An observed object without a readable baseline never matches.
pub fn matches<K: Resource + Serialize>(observed: &K, desired: &K) -> Result<bool> {
    let Some(baseline) = last_applied(observed) else {
        return Ok(false);
    };
    let baseline: Value = match serde_json::from_str(baseline) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "Ignoring unreadable {} annotation on {}: {}",
                LAST_APPLIED_ANNOTATION,
                observed.name_any(),
                e
            );
            return Ok(false);
        }
    };

    let wanted: Value = serde_json::from_str(&fingerprint(desired)?)?;
    Ok(baseline == wanted)
}

fn strip(value: &mut Value) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    object.remove("status");

    let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    for field in STORE_ASSIGNED_METADATA {
        metadata.remove(field);
    }

    let annotations_empty = match metadata.get_mut("annotations").and_then(Value::as_object_mut) {
        Some(annotations) => {
            annotations.remove(LAST_APPLIED_ANNOTATION);
            annotations.is_empty()
        }
        None => false,
    };
    if annotations_empty {
        metadata.remove("annotations");
    }
}

fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonical(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}
