//! Pod list polling discovery

use super::AddressResolver;
use crate::cluster::ClusterBackend;
use crate::error::MeasureError;
use crate::models::{AddressObservation, DiscoveryStrategy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lists pods matching the selector on a fixed cadence
///
/// List failures are treated as "no result yet"; the loop only ends on an
/// address or cancellation.
pub struct PodPollResolver {
    backend: Arc<dyn ClusterBackend>,
    interval: Duration,
}

impl PodPollResolver {
    pub fn new(backend: Arc<dyn ClusterBackend>, interval: Duration) -> Self {
        Self { backend, interval }
    }
}

#[async_trait]
impl AddressResolver for PodPollResolver {
    fn strategy(&self) -> DiscoveryStrategy {
        DiscoveryStrategy::PodPoll
    }

    async fn resolve_address(
        &self,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<AddressObservation, MeasureError> {
        let mut polls = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(MeasureError::Cancelled);
            }
            polls += 1;

            match self.backend.list_instances(selector).await {
                Ok(instances) => {
                    let assigned = instances
                        .iter()
                        .find_map(|i| i.usable_address().map(|a| (i, a)));

                    if let Some((instance, address)) = assigned {
                        info!(pod = %instance.name, address = %address, polls, "Pod IP assigned");
                        return Ok(AddressObservation {
                            address: address.to_string(),
                            instance: instance.name.clone(),
                            strategy: DiscoveryStrategy::PodPoll,
                        });
                    }
                    debug!(matching = instances.len(), polls, "No pod address yet");
                }
                Err(e) => {
                    warn!(selector = %selector, error = %e, polls, "Failed to list pods, retrying");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(MeasureError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
