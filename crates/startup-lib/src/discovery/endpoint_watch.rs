//! CiliumEndpoint watch discovery
//!
//! Some network plugin setups publish the pod address on their own endpoint
//! resource well before (or instead of) the pod status. The event loop is the
//! same as the pod watch; the address comes from the first populated IPv4
//! record of `status.networking.addressing`.

use super::AddressResolver;
use crate::cluster::ClusterBackend;
use crate::error::MeasureError;
use crate::models::{AddressObservation, DiscoveryStrategy};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct EndpointWatchResolver {
    backend: Arc<dyn ClusterBackend>,
}

impl EndpointWatchResolver {
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl AddressResolver for EndpointWatchResolver {
    fn strategy(&self) -> DiscoveryStrategy {
        DiscoveryStrategy::EndpointWatch
    }

    async fn resolve_address(
        &self,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<AddressObservation, MeasureError> {
        let mut events = self
            .backend
            .watch_endpoints(selector)
            .await
            .map_err(MeasureError::Discovery)?;

        debug!(selector = %selector, "Watching for CiliumEndpoint events");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(MeasureError::Cancelled),
                event = events.next() => {
                    match event {
                        Some(Ok(endpoint)) => {
                            debug!(
                                endpoint = %endpoint.name,
                                records = endpoint.ipv4.len(),
                                "CiliumEndpoint event"
                            );
                            if let Some(address) = endpoint.first_ipv4() {
                                info!(
                                    endpoint = %endpoint.name,
                                    address = %address,
                                    "Endpoint IPv4 assigned"
                                );
                                return Ok(AddressObservation {
                                    address: address.to_string(),
                                    instance: endpoint.name.clone(),
                                    strategy: DiscoveryStrategy::EndpointWatch,
                                });
                            }
                        }
                        Some(Err(e)) => {
                            error!(selector = %selector, error = %e, "CiliumEndpoint watch error");
                            return Err(MeasureError::Discovery(e));
                        }
                        None => return Err(MeasureError::WatchClosed),
                    }
                }
            }
        }
    }
}
