//! Benchmark service configuration

use anyhow::Result;
use serde::Deserialize;
use startup_lib::{DiscoveryStrategy, ProbeConfig, WorkloadSpec};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_IMAGE: &str = "ghcr.io/mojojoji/k8s-startup-time-health-server:latest";

/// Benchmark service configuration, read from `STARTUP_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// Namespace the workloads are created in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deployment name and `app` label value
    #[serde(default = "default_workload_name")]
    pub workload_name: String,

    /// Health server image under test
    #[serde(default = "default_image")]
    pub image: String,

    /// Container port probed for health
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Address discovery strategy
    #[serde(default)]
    pub discovery: DiscoveryStrategy,

    /// Discovery poll and probe cadence in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Timeout of a single probe request in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Log every Nth failed probe
    #[serde(default = "default_log_every")]
    pub log_every: u64,

    /// Whole-run deadline; unset or 0 means no deadline
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Give every run its own workload name
    #[serde(default)]
    pub unique_names: bool,

    /// Port of the trigger service
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_namespace() -> String {
    "k8s-test".to_string()
}

fn default_workload_name() -> String {
    "startup-test".to_string()
}

fn default_image() -> String {
    std::env::var("HEALTH_SERVER_IMAGE")
        .ok()
        .filter(|image| !image.is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string())
}

fn default_health_port() -> u16 {
    8080
}

fn default_health_path() -> String {
    startup_lib::measure::DEFAULT_HEALTH_PATH.to_string()
}

fn default_poll_interval() -> u64 {
    20
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_log_every() -> u64 {
    10
}

fn default_listen_port() -> u16 {
    8080
}

impl BenchConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit variable map instead of the
    /// process environment
    pub fn load_from(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("STARTUP")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            interval: self.poll_interval(),
            request_timeout: Duration::from_millis(self.probe_timeout_ms.max(1)),
            log_every: self.log_every.max(1),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Workload spec for the next run
    ///
    /// With `unique_names` off every run reuses the configured name, so a
    /// second run in the same namespace fails at creation.
    pub fn workload_spec(&self, run_token: &str) -> WorkloadSpec {
        if self.unique_names {
            WorkloadSpec::with_run_token(&self.workload_name, run_token, &self.image, self.health_port)
        } else {
            WorkloadSpec::new(&self.workload_name, &self.image, self.health_port)
        }
    }
}
