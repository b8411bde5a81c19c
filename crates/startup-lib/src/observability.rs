//! Observability for startup measurements
//!
//! Provides:
//! - Prometheus metrics (time to ready, time to address, probe attempts, run outcomes)
//! - Structured JSON logging of run events with tracing

use crate::error::MeasureError;
use crate::format::format_duration;
use crate::models::{AddressObservation, MeasurementReport, WorkloadSpec};
use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for startup latencies (in seconds)
const STARTUP_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0, 30.0, 60.0, 120.0,
];

/// Buckets for the number of probe attempts per run
const ATTEMPT_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<StartupMetricsInner> = OnceLock::new();

struct StartupMetricsInner {
    time_to_ready_seconds: Histogram,
    time_to_address_seconds: Histogram,
    probe_attempts: Histogram,
    runs_total: IntCounterVec,
}

impl StartupMetricsInner {
    fn new() -> Self {
        Self {
            time_to_ready_seconds: register_histogram!(
                "startup_bench_time_to_ready_seconds",
                "Time from deployment create request to first healthy probe",
                STARTUP_BUCKETS.to_vec()
            )
            .expect("Failed to register time_to_ready_seconds"),

            time_to_address_seconds: register_histogram!(
                "startup_bench_time_to_address_seconds",
                "Time from deployment create request to pod address assignment",
                STARTUP_BUCKETS.to_vec()
            )
            .expect("Failed to register time_to_address_seconds"),

            probe_attempts: register_histogram!(
                "startup_bench_probe_attempts",
                "Health probe attempts needed per successful run",
                ATTEMPT_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_attempts"),

            runs_total: register_int_counter_vec!(
                "startup_bench_runs_total",
                "Measurement runs by outcome",
                &["outcome"]
            )
            .expect("Failed to register runs_total"),
        }
    }
}

/// Handle to the process-wide measurement metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct StartupMetrics {
    _private: (),
}

impl Default for StartupMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(StartupMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &StartupMetricsInner {
        GLOBAL_METRICS.get_or_init(StartupMetricsInner::new)
    }

    /// Record a successful run
    pub fn observe_success(&self, report: &MeasurementReport) {
        let inner = self.inner();
        inner
            .time_to_ready_seconds
            .observe(report.startup_time.as_secs_f64());
        inner
            .time_to_address_seconds
            .observe(report.time_to_address.as_secs_f64());
        inner.probe_attempts.observe(report.probe_attempts as f64);
        inner.runs_total.with_label_values(&["success"]).inc();
    }

    /// Record a failed run
    pub fn observe_failure(&self, error: &MeasureError) {
        self.inner()
            .runs_total
            .with_label_values(&[error.kind().as_str()])
            .inc();
    }

    /// Number of runs recorded with the given outcome label
    pub fn runs(&self, outcome: &str) -> u64 {
        self.inner().runs_total.with_label_values(&[outcome]).get()
    }
}

/// Structured logger for run events
///
/// Every event carries a stable `event` field so log pipelines can pick out
/// samples without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, strategy: &str) {
        info!(
            event = "service_started",
            namespace = %self.namespace,
            version = %version,
            discovery = %strategy,
            "Startup benchmark service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "Startup benchmark service shutting down"
        );
    }

    /// Log an accepted create request
    pub fn log_workload_created(&self, spec: &WorkloadSpec, elapsed: Duration) {
        info!(
            event = "workload_created",
            namespace = %self.namespace,
            workload = %spec.name,
            image = %spec.image,
            elapsed = %format_duration(elapsed),
            "Deployment created successfully"
        );
    }

    /// Log the discovered address
    pub fn log_address(&self, workload: &str, observation: &AddressObservation, elapsed: Duration) {
        info!(
            event = "address_discovered",
            namespace = %self.namespace,
            workload = %workload,
            instance = %observation.instance,
            address = %observation.address,
            discovery = %observation.strategy,
            elapsed = %format_duration(elapsed),
            "Pod address discovered"
        );
    }

    /// Log a completed measurement
    pub fn log_completed(&self, report: &MeasurementReport) {
        info!(
            event = "measurement_completed",
            namespace = %self.namespace,
            workload = %report.workload,
            address = %report.address,
            discovery = %report.strategy,
            time_to_address = %format_duration(report.time_to_address),
            time_to_healthy = %format_duration(report.time_to_healthy()),
            startup_time = %format_duration(report.startup_time),
            startup_ms = report.startup_time.as_millis() as u64,
            probe_attempts = report.probe_attempts,
            "Total startup time"
        );
    }

    /// Log a failed measurement
    pub fn log_failed(&self, workload: &str, error: &MeasureError, elapsed: Duration) {
        warn!(
            event = "measurement_failed",
            namespace = %self.namespace,
            workload = %workload,
            kind = error.kind().as_str(),
            error = %error,
            elapsed = %format_duration(elapsed),
            "Startup measurement failed"
        );
    }
}
