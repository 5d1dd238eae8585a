//! Manila CSI Driver Operator
//!
//! Main entry point for the operator. Loads the cloud profile, wires the
//! driver controllers behind the supervisor and runs the ManilaDriver
//! controller until a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::{Api, Client};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use manila_csi_driver_operator::{
    adapters::{openstack::OpenStackClient, storage_class_builder::SecretRef},
    config::OperatorConfig,
    controllers::{manila_controller, Context},
    crd::ManilaDriver,
    metrics,
    reconcilers::{
        driver::driver_controllers,
        manila::ManilaSync,
        status::DriverStatus,
        supervisor::{ControllerSupervisor, ManagedControllerSet},
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::parse();

    init_tracing();

    info!("Starting Manila CSI Driver Operator");

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let catalog = OpenStackClient::from_config(&config).await?;

    let status = Arc::new(DriverStatus::new(
        Api::<ManilaDriver>::all(client.clone()),
        &config.driver_resource_name,
    ));
    let shutdown = CancellationToken::new();
    let supervisor = ControllerSupervisor::new(
        ManagedControllerSet::new(driver_controllers(&client, &config)),
        status.clone(),
        shutdown.clone(),
    );
    let manila = ManilaSync::new(
        Arc::new(catalog),
        Arc::new(Api::<StorageClass>::all(client.clone())),
        supervisor,
        SecretRef {
            namespace: config.operand_namespace.clone(),
            name: config.driver_credentials_secret.clone(),
        },
    );

    let metrics_port = config.metrics_port;
    let context = Context::new(client, config, manila, status);

    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let controller_handle = tokio::spawn(manila_controller::run(context.clone()));

    tokio::select! {
        _ = controller_handle => {
            error!("ManilaDriver controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    context.manila.supervisor().shutdown().await;

    info!("Manila CSI Driver Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,manila_csi_driver_operator=debug,kube=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for SIGTERM or SIGINT
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
