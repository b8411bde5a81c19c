//! HTTP trigger, health checks and Prometheus metrics

use crate::config::BenchConfig;
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use startup_lib::{
    format_duration,
    health::{components, ComponentStatus, HealthRegistry},
    ErrorKind, MeasureError, Measurer, StartupMetrics,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub measurer: Arc<Measurer>,
    pub config: Arc<BenchConfig>,
    pub health_registry: HealthRegistry,
    pub metrics: StartupMetrics,
    /// Fires on shutdown and aborts in-flight runs
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(measurer: Measurer, config: BenchConfig, health_registry: HealthRegistry) -> Self {
        Self {
            measurer: Arc::new(measurer),
            config: Arc::new(config),
            health_registry,
            metrics: StartupMetrics::new(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Body of a `/measure` response
///
/// `startup_time` is always present and empty on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureResponse {
    pub startup_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MeasureResponse {
    pub fn success(startup_time: Duration) -> Self {
        Self {
            startup_time: format_duration(startup_time),
            error: None,
        }
    }

    pub fn failure(error: &MeasureError) -> Self {
        Self {
            startup_time: String::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Per-process sequence appended to run tokens
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Hex millisecond timestamp plus a sequence number, used to name per-run
/// workloads; distinct even for requests within the same millisecond
fn run_token() -> String {
    let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed) & 0xffff;
    format!("{:x}{:04x}", chrono::Utc::now().timestamp_millis(), seq)
}

/// Run one measurement and report its startup time
async fn measure(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let spec = state.config.workload_spec(&run_token());

    match state
        .measurer
        .run_measurement_with_cancel(&spec, &state.shutdown)
        .await
    {
        Ok(report) => {
            state.health_registry.set_healthy(components::CLUSTER_API).await;
            state.health_registry.set_healthy(components::MEASUREMENT).await;
            (
                StatusCode::OK,
                Json(MeasureResponse::success(report.startup_time)),
            )
        }
        Err(e) => {
            error!(workload = %spec.name, error = %e, "Measurement failed");
            record_failure(&state.health_registry, &e).await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MeasureResponse::failure(&e)),
            )
        }
    }
}

async fn record_failure(registry: &HealthRegistry, error: &MeasureError) {
    // Credentials or RBAC broken: no run can succeed until that is fixed
    if error.is_access_denied() {
        registry
            .set_unhealthy(components::CLUSTER_API, error.to_string())
            .await;
        return;
    }

    match error.kind() {
        ErrorKind::ControlPlane => {
            registry
                .set_degraded(components::CLUSTER_API, error.to_string())
                .await
        }
        ErrorKind::Discovery | ErrorKind::Deadline | ErrorKind::Internal => {
            registry
                .set_degraded(components::MEASUREMENT, error.to_string())
                .await
        }
        ErrorKind::Cancelled => {}
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still able to measure
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/measure", post(measure))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bind the API listener on all interfaces
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", addr))?;
    info!(addr = %addr, "API listener bound");
    Ok(listener)
}

/// Serve the API on a bound listener; returns once `state.shutdown` fires
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    info!(addr = ?listener.local_addr().ok(), "Starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
