//! Core data models for startup measurements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Label key used to select the workload's pods
pub const APP_LABEL: &str = "app";

/// Kubernetes object names are DNS-1123 labels
const MAX_NAME_LEN: usize = 63;

/// Description of the single-replica workload launched by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Deployment name
    pub name: String,
    /// Container image reference
    pub image: String,
    /// Container port serving the health endpoint
    pub port: u16,
    /// Pod labels, also used as the discovery selector
    pub labels: BTreeMap<String, String>,
}

impl WorkloadSpec {
    /// Create a spec labelled `app=<name>`
    pub fn new(name: impl Into<String>, image: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(APP_LABEL.to_string(), name.clone());
        Self {
            name,
            image: image.into(),
            port,
            labels,
        }
    }

    /// Create a spec whose name (and `app` label) carries a per-run token
    pub fn with_run_token(
        base_name: &str,
        token: &str,
        image: impl Into<String>,
        port: u16,
    ) -> Self {
        let max_base = MAX_NAME_LEN.saturating_sub(token.len() + 1);
        let base: String = base_name.chars().take(max_base).collect();
        let base = base.trim_end_matches('-');
        Self::new(format!("{}-{}", base, token), image, port)
    }

    /// Label selector string, e.g. `app=startup-test`
    pub fn selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Address discovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryStrategy {
    /// Watch pods for `status.podIP`
    PodWatch,
    /// List pods on a fixed cadence
    PodPoll,
    /// Watch CiliumEndpoint resources for an IPv4 address
    EndpointWatch,
}

impl DiscoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStrategy::PodWatch => "pod-watch",
            DiscoveryStrategy::PodPoll => "pod-poll",
            DiscoveryStrategy::EndpointWatch => "endpoint-watch",
        }
    }
}

impl fmt::Display for DiscoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for DiscoveryStrategy {
    fn default() -> Self {
        DiscoveryStrategy::PodWatch
    }
}

/// An address reported for the workload instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressObservation {
    pub address: String,
    /// Name of the pod or endpoint that carried the address
    pub instance: String,
    pub strategy: DiscoveryStrategy,
}

/// Result of a single health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(String),
}

/// One health-check call, kept for diagnostic logging only
#[derive(Debug, Clone)]
pub struct ProbeAttempt {
    /// 1-based attempt number
    pub ordinal: u64,
    pub outcome: ProbeOutcome,
    /// Time since the run started
    pub elapsed: Duration,
}

impl ProbeAttempt {
    pub fn is_healthy(&self) -> bool {
        self.outcome == ProbeOutcome::Healthy
    }
}

/// Phase of a measurement run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    AddressPending,
    AddressResolved,
    Probing,
    Completed,
    Failed,
}

/// A single in-flight measurement
///
/// The start instant is captured on creation and the terminal duration is
/// derived from it exactly once, in [`MeasurementRun::complete`].
#[derive(Debug)]
pub struct MeasurementRun {
    workload: String,
    started_at: DateTime<Utc>,
    start: Instant,
    phase: RunPhase,
}

impl MeasurementRun {
    /// Start timing a run for the named workload
    pub fn start(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
            started_at: Utc::now(),
            start: Instant::now(),
            phase: RunPhase::AddressPending,
        }
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Monotonic start instant, taken when creation was requested
    pub fn start_instant(&self) -> Instant {
        self.start
    }

    /// Monotonic time since the run started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Mark the address as known; returns the time to address
    pub fn address_resolved(&mut self) -> Duration {
        self.phase = RunPhase::AddressResolved;
        self.elapsed()
    }

    pub fn probing(&mut self) {
        self.phase = RunPhase::Probing;
    }

    pub fn fail(&mut self) {
        self.phase = RunPhase::Failed;
    }

    /// Finish the run and compute its duration
    pub fn complete(
        mut self,
        observation: AddressObservation,
        time_to_address: Duration,
        probe_attempts: u64,
    ) -> MeasurementReport {
        let startup_time = self.elapsed();
        self.phase = RunPhase::Completed;

        MeasurementReport {
            workload: self.workload,
            strategy: observation.strategy,
            address: observation.address,
            started_at: self.started_at,
            time_to_address,
            startup_time,
            probe_attempts,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementReport {
    pub workload: String,
    pub strategy: DiscoveryStrategy,
    pub address: String,
    pub started_at: DateTime<Utc>,
    /// Creation request to address assignment
    pub time_to_address: Duration,
    /// Creation request to first healthy probe
    pub startup_time: Duration,
    pub probe_attempts: u64,
}

impl MeasurementReport {
    /// Time spent between the address appearing and the first healthy probe
    pub fn time_to_healthy(&self) -> Duration {
        self.startup_time.saturating_sub(self.time_to_address)
    }
}
