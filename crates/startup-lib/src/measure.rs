//! Measurement orchestration
//!
//! One run is strictly sequential: create the workload, discover its
//! address, probe until healthy. The timer starts when creation is requested,
//! so the sample includes control-plane admission latency.

use crate::cluster::ClusterBackend;
use crate::discovery::AddressResolver;
use crate::error::MeasureError;
use crate::models::{
    AddressObservation, DiscoveryStrategy, MeasurementReport, MeasurementRun, WorkloadSpec,
};
use crate::observability::{StartupMetrics, StructuredLogger};
use crate::probe::HealthProber;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default path probed on the workload
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Runs startup measurements against an injected cluster capability
pub struct Measurer {
    backend: Arc<dyn ClusterBackend>,
    resolver: Arc<dyn AddressResolver>,
    prober: HealthProber,
    health_path: String,
    deadline: Option<Duration>,
    metrics: StartupMetrics,
    logger: StructuredLogger,
}

impl Measurer {
    pub fn new(
        backend: Arc<dyn ClusterBackend>,
        resolver: Arc<dyn AddressResolver>,
        prober: HealthProber,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            backend,
            resolver,
            prober,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            deadline: None,
            metrics: StartupMetrics::new(),
            logger,
        }
    }

    /// Bound every run; `None` lets a run block until the workload is healthy
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    pub fn strategy(&self) -> DiscoveryStrategy {
        self.resolver.strategy()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Measure time to ready for one workload
    pub async fn run_measurement(
        &self,
        spec: &WorkloadSpec,
    ) -> Result<MeasurementReport, MeasureError> {
        self.run_measurement_with_cancel(spec, &CancellationToken::new())
            .await
    }

    /// Measure time to ready, stopping early when `cancel` fires
    pub async fn run_measurement_with_cancel(
        &self,
        spec: &WorkloadSpec,
        cancel: &CancellationToken,
    ) -> Result<MeasurementReport, MeasureError> {
        let run_cancel = cancel.child_token();

        info!(workload = %spec.name, discovery = %self.strategy(), "Starting deployment creation");
        let mut run = MeasurementRun::start(&spec.name);

        let outcome = match self.deadline {
            Some(deadline) => {
                tokio::time::timeout(deadline, self.drive(&mut run, spec, &run_cancel))
                    .await
                    .unwrap_or(Err(MeasureError::DeadlineExceeded(deadline)))
            }
            None => self.drive(&mut run, spec, &run_cancel).await,
        };
        run_cancel.cancel();

        match outcome {
            Ok(healthy) => {
                let report = run.complete(
                    healthy.observation,
                    healthy.time_to_address,
                    healthy.probe_attempts,
                );
                self.logger.log_completed(&report);
                self.metrics.observe_success(&report);
                Ok(report)
            }
            Err(e) => {
                run.fail();
                self.logger.log_failed(&spec.name, &e, run.elapsed());
                self.metrics.observe_failure(&e);
                Err(e)
            }
        }
    }

    /// Create, discover and probe
    async fn drive(
        &self,
        run: &mut MeasurementRun,
        spec: &WorkloadSpec,
        cancel: &CancellationToken,
    ) -> Result<Healthy, MeasureError> {
        self.backend
            .create_workload(spec)
            .await
            .map_err(MeasureError::CreateWorkload)?;
        self.logger.log_workload_created(spec, run.elapsed());

        let selector = spec.selector();
        debug!(selector = %selector, "Resolving pod address");
        let observation = self.resolver.resolve_address(&selector, cancel).await?;
        self.logger.log_address(&spec.name, &observation, run.elapsed());

        let time_to_address = run.address_resolved();
        run.probing();

        let attempt = self
            .prober
            .probe_until_healthy(
                &observation.address,
                spec.port,
                &self.health_path,
                run.start_instant(),
                cancel,
            )
            .await?;

        Ok(Healthy {
            observation,
            time_to_address,
            probe_attempts: attempt.ordinal,
        })
    }
}

/// What a successful `drive` hands back to complete the run
struct Healthy {
    observation: AddressObservation,
    time_to_address: Duration,
    probe_attempts: u64,
}
