//! Application-level health probing
//!
//! Issues `GET http://{address}:{port}{path}` on a fixed cadence until the
//! target answers 200. Connection errors and non-200 statuses are expected
//! while the container starts and only count as "not yet healthy".

use crate::error::MeasureError;
use crate::models::{ProbeAttempt, ProbeOutcome};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Health prober configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Delay between attempts (default: 20ms)
    pub interval: Duration,
    /// Timeout of a single GET (default: 1s)
    pub request_timeout: Duration,
    /// Log every Nth failed attempt (default: 10)
    pub log_every: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20),
            request_timeout: Duration::from_secs(1),
            log_every: 10,
        }
    }
}

/// Polls a health endpoint until it reports success
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: Client,
    config: ProbeConfig,
}

impl HealthProber {
    pub fn new(config: ProbeConfig) -> Result<Self, MeasureError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Issue a single probe
    pub async fn probe_once(&self, url: &str) -> ProbeOutcome {
        match self.client.get(url).send().await {
            Ok(response) if response.status() == StatusCode::OK => ProbeOutcome::Healthy,
            Ok(response) => ProbeOutcome::Unhealthy(format!("status {}", response.status())),
            Err(e) => ProbeOutcome::Unhealthy(e.to_string()),
        }
    }

    /// Probe until the target answers 200 or `cancel` fires
    ///
    /// `started` is the run's start instant; attempt timings are reported
    /// relative to it. Returns the successful attempt.
    pub async fn probe_until_healthy(
        &self,
        address: &str,
        port: u16,
        path: &str,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<ProbeAttempt, MeasureError> {
        let url = health_url(address, port, path);
        let log_every = self.config.log_every;
        let mut ordinal = 0u64;

        debug!(url = %url, "Starting health check attempts");

        loop {
            if cancel.is_cancelled() {
                return Err(MeasureError::Cancelled);
            }
            ordinal += 1;

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(MeasureError::Cancelled),
                outcome = self.probe_once(&url) => outcome,
            };
            let attempt = ProbeAttempt {
                ordinal,
                outcome,
                elapsed: started.elapsed(),
            };

            match &attempt.outcome {
                ProbeOutcome::Healthy => {
                    info!(
                        attempt = attempt.ordinal,
                        elapsed_ms = attempt.elapsed.as_millis() as u64,
                        "Health check successful"
                    );
                    return Ok(attempt);
                }
                ProbeOutcome::Unhealthy(reason) if logs_failure(attempt.ordinal, log_every) => {
                    info!(
                        attempt = attempt.ordinal,
                        elapsed_ms = attempt.elapsed.as_millis() as u64,
                        error = %reason,
                        "Health check attempt failed"
                    );
                }
                ProbeOutcome::Unhealthy(_) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(MeasureError::Cancelled),
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }
}

/// Whether the failed attempt with this 1-based ordinal is logged
fn logs_failure(ordinal: u64, log_every: u64) -> bool {
    ordinal % log_every.max(1) == 0
}

/// Build the probe URL, bracketing IPv6 literals
pub fn health_url(address: &str, port: u16, path: &str) -> String {
    let host = if address.contains(':') && !address.starts_with('[') {
        format!("[{}]", address)
    } else {
        address.to_string()
    };

    if path.starts_with('/') {
        format!("http://{}:{}{}", host, port, path)
    } else {
        format!("http://{}:{}/{}", host, port, path)
    }
}
