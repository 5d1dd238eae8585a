//! Operator status conditions on the ManilaDriver resource

use async_trait::async_trait;
use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::Api;
use serde_json::Value;
use tracing::debug;

use crate::crd::{Condition, ManilaDriver};
use crate::reconcilers::manila::PassOutcome;
use crate::Result;

/// Prefix of every condition owned by the Manila controller
pub const CONDITION_PREFIX: &str = "ManilaController";

/// Condition published while the backend does not offer Manila
pub fn disabled_condition_type() -> String {
    format!("{}Disabled", CONDITION_PREFIX)
}

/// Build the Disabled condition for an unavailability reason
pub fn disabled_condition(reason: &str, message: &str) -> Condition {
    Condition {
        type_: disabled_condition_type(),
        status: "True".to_string(),
        last_transition_time: Utc::now(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Insert or refresh a condition; returns whether anything changed.
///
/// The transition time is kept when the status does not change.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.same_observation(&condition) => false,
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Drop a condition by type; returns whether it was present
pub fn remove_condition(conditions: &mut Vec<Condition>, type_: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.type_ != type_);
    conditions.len() != before
}

/// Status fields written after every pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassRecord {
    pub observed_generation: Option<i64>,
    pub storage_classes: Option<u32>,
    pub controllers_started: bool,
}

impl PassRecord {
    /// Summarize a pass. A failed pass only reports whether the controllers
    /// run; generation and StorageClass count keep their previous values.
    pub fn new(
        generation: Option<i64>,
        pass: &Result<PassOutcome>,
        controllers_started: bool,
    ) -> Self {
        match pass {
            Ok(outcome) => Self {
                observed_generation: generation,
                storage_classes: match outcome {
                    PassOutcome::Synced {
                        storage_classes, ..
                    } => *storage_classes,
                    PassOutcome::Skipped(_) => None,
                },
                controllers_started,
            },
            Err(_) => Self {
                controllers_started,
                ..Default::default()
            },
        }
    }

    /// Merge patch for the status subresource; unset fields are left alone
    pub fn to_patch(&self) -> Value {
        let mut status = serde_json::json!({ "controllersStarted": self.controllers_started });
        if let Some(generation) = self.observed_generation {
            status["observedGeneration"] = generation.into();
        }
        if let Some(count) = self.storage_classes {
            status["storageClasses"] = count.into();
        }
        serde_json::json!({ "status": status })
    }
}

/// Read-modify-write access to operator conditions.
///
/// Implementations only touch the condition named in each call.
#[async_trait]
pub trait ConditionSink: Send + Sync {
    async fn set_condition(&self, condition: Condition) -> Result<()>;

    async fn remove_condition(&self, type_: &str) -> Result<()>;
}

/// Conditions stored in the status of the ManilaDriver singleton
pub struct DriverStatus {
    api: Api<ManilaDriver>,
    name: String,
}

impl DriverStatus {
    pub fn new(api: Api<ManilaDriver>, name: &str) -> Self {
        Self {
            api,
            name: name.to_string(),
        }
    }

    async fn edit_conditions<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Condition>) -> bool + Send,
    {
        let Some(driver) = self.api.get_opt(&self.name).await? else {
            debug!("ManilaDriver {} not found, skipping status update", self.name);
            return Ok(());
        };

        let mut conditions = driver.status.map(|s| s.conditions).unwrap_or_default();
        if !edit(&mut conditions) {
            return Ok(());
        }

        let patch = serde_json::json!({
            "status": { "conditions": conditions }
        });
        self.api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Record the outcome of a pass
    pub async fn record_pass(&self, record: &PassRecord) -> Result<()> {
        self.api
            .patch_status(
                &self.name,
                &PatchParams::default(),
                &Patch::Merge(&record.to_patch()),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConditionSink for DriverStatus {
    async fn set_condition(&self, condition: Condition) -> Result<()> {
        debug!(
            "Setting condition {}={} on ManilaDriver {}: {}",
            condition.type_,
            condition.status,
            self.name,
            condition.message.as_deref().unwrap_or_default()
        );
        self.edit_conditions(move |conditions| upsert_condition(conditions, condition))
            .await
    }

    async fn remove_condition(&self, type_: &str) -> Result<()> {
        let type_ = type_.to_string();
        self.edit_conditions(move |conditions| remove_condition(conditions, &type_))
            .await
    }
}
