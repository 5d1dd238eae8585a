//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "manila_csi_driver_operator_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "manila_csi_driver_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "manila_csi_driver_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Object syncs by kind and outcome
    pub static ref SYNC_OUTCOMES: CounterVec = register_counter_vec!(
        "manila_csi_driver_operator_sync_outcomes_total",
        "Object synchronizations by kind and outcome",
        &["kind", "outcome"]
    ).unwrap();

    /// Manila availability as last probed (1 = available)
    pub static ref BACKEND_AVAILABLE: Gauge = register_gauge!(
        "manila_csi_driver_operator_backend_available",
        "Whether Manila offered share types on the last probe (1 = available, 0 = not)"
    ).unwrap();

    /// Number of running CSI driver controllers
    pub static ref CONTROLLERS_STARTED: Gauge = register_gauge!(
        "manila_csi_driver_operator_controllers_started",
        "Number of CSI driver controllers started by the operator"
    ).unwrap();

    /// StorageClasses converged on the last pass
    pub static ref MANAGED_STORAGE_CLASSES: Gauge = register_gauge!(
        "manila_csi_driver_operator_managed_storage_classes",
        "Number of StorageClasses synced from Manila share types"
    ).unwrap();

    /// Driver controller sync runs
    pub static ref CONTROLLER_SYNCS: CounterVec = register_counter_vec!(
        "manila_csi_driver_operator_controller_syncs_total",
        "Total number of CSI driver controller syncs",
        &["controller"]
    ).unwrap();

    /// Failed driver controller sync runs
    pub static ref CONTROLLER_SYNC_ERRORS: CounterVec = register_counter_vec!(
        "manila_csi_driver_operator_controller_sync_errors_total",
        "Total number of failed CSI driver controller syncs",
        &["controller"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: Gauge = register_gauge!(
        "manila_csi_driver_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/readyz" => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(value) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
