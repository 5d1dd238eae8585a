//! Controller for the ManilaDriver singleton
//!
//! Passes run on the resync interval, whenever the ManilaDriver changes and
//! whenever a StorageClass managed by the operator is edited or deleted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::{
    runtime::{
        controller::{Action, Controller},
        reflector::ObjectRef,
        watcher::Config,
    },
    Api, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::adapters::labels::managed_selector;
use crate::controllers::Context;
use crate::crd::ManilaDriver;
use crate::metrics::prometheus::{RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS};
use crate::reconcilers::status::PassRecord;
use crate::Error;

const KIND: &str = "ManilaDriver";

/// Run the ManilaDriver controller
pub async fn run(ctx: Arc<Context>) {
    let name = ctx.config.driver_resource_name.clone();
    let drivers: Api<ManilaDriver> = Api::all(ctx.client.clone());
    let storage_classes: Api<StorageClass> = Api::all(ctx.client.clone());

    info!("Starting ManilaDriver controller for {}", name);

    let singleton = Config::default().fields(&format!("metadata.name={}", name));
    let managed = Config::default().labels(&managed_selector());

    Controller::new(drivers, singleton)
        .watches(storage_classes, managed, move |_: StorageClass| {
            Some(ObjectRef::<ManilaDriver>::new(&name))
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("Reconciled {:?}", o),
                Err(e) => error!("Reconcile failed: {:?}", e),
            }
        })
        .await;

    info!("ManilaDriver controller stopped");
}

#[instrument(skip(driver, ctx), fields(name = %driver.name_any()))]
async fn reconcile(driver: Arc<ManilaDriver>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start = Instant::now();
    let name = driver.name_any();

    RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let result = apply(&driver, &ctx).await;

    let duration = start.elapsed().as_secs_f64();
    RECONCILE_DURATION.with_label_values(&[KIND]).observe(duration);

    match &result {
        Ok(_) => info!("Successfully reconciled {} in {:.2}s", name, duration),
        Err(e) => {
            RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
            error!("Failed to reconcile {}: {}", name, e);
        }
    }

    result
}

async fn apply(driver: &ManilaDriver, ctx: &Context) -> Result<Action, Error> {
    let pass = ctx.manila.sync_pass(driver).await;

    // Failed passes still report whether the controllers run
    let record = PassRecord::new(
        driver.metadata.generation,
        &pass,
        ctx.manila.supervisor().is_started(),
    );
    let recorded = ctx.status.record_pass(&record).await;

    pass?;
    recorded?;
    Ok(Action::requeue(ctx.config.resync_interval()))
}

fn error_policy(driver: Arc<ManilaDriver>, err: &Error, _ctx: Arc<Context>) -> Action {
    error!("Reconciliation error for {}: {:?}", driver.name_any(), err);
    Action::requeue(requeue_after(err))
}

/// Delay before retrying a failed pass
pub fn requeue_after(err: &Error) -> Duration {
    match err {
        Error::KubeError(_) | Error::CatalogError(_) => Duration::from_secs(30),
        Error::ConfigError(_) | Error::CloudConfigError(_) | Error::MissingKey { .. } => {
            Duration::from_secs(300)
        }
        _ => Duration::from_secs(60),
    }
}
