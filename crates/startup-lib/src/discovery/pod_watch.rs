//! Pod watch discovery

use super::AddressResolver;
use crate::cluster::ClusterBackend;
use crate::error::MeasureError;
use crate::models::{AddressObservation, DiscoveryStrategy};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Watches pods matching the selector until one reports `status.podIP`
pub struct PodWatchResolver {
    backend: Arc<dyn ClusterBackend>,
}

impl PodWatchResolver {
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl AddressResolver for PodWatchResolver {
    fn strategy(&self) -> DiscoveryStrategy {
        DiscoveryStrategy::PodWatch
    }

    async fn resolve_address(
        &self,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<AddressObservation, MeasureError> {
        let mut events = self
            .backend
            .watch_instances(selector)
            .await
            .map_err(MeasureError::Discovery)?;

        debug!(selector = %selector, "Watching for pod events");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(selector = %selector, "Pod watch cancelled");
                    return Err(MeasureError::Cancelled);
                }
                event = events.next() => {
                    match event {
                        Some(Ok(status)) => {
                            debug!(
                                pod = %status.name,
                                phase = ?status.phase,
                                "Pod event"
                            );
                            if let Some(address) = status.usable_address() {
                                info!(pod = %status.name, address = %address, "Pod IP assigned");
                                return Ok(AddressObservation {
                                    address: address.to_string(),
                                    instance: status.name.clone(),
                                    strategy: DiscoveryStrategy::PodWatch,
                                });
                            }
                        }
                        Some(Err(e)) => {
                            error!(selector = %selector, error = %e, "Pod watch error");
                            return Err(MeasureError::Discovery(e));
                        }
                        None => return Err(MeasureError::WatchClosed),
                    }
                }
            }
        }
    }
}
