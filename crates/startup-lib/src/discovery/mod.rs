//! Address discovery for newly created workload instances
//!
//! All strategies implement [`AddressResolver`] and are interchangeable: the
//! orchestrator receives one at construction and never branches on which.
//!
//! - [`PodWatchResolver`] watches pods for `status.podIP`
//! - [`PodPollResolver`] lists pods on a fixed cadence
//! - [`EndpointWatchResolver`] watches Cilium endpoint records, for network
//!   plugins that populate pod addressing late or not at all

mod endpoint_watch;
mod pod_poll;
mod pod_watch;

pub use endpoint_watch::EndpointWatchResolver;
pub use pod_poll::PodPollResolver;
pub use pod_watch::PodWatchResolver;

use crate::cluster::ClusterBackend;
use crate::error::MeasureError;
use crate::models::{AddressObservation, DiscoveryStrategy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default list cadence for the polling strategy
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Resolves the network address of the instance matching a selector
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Strategy implemented by this resolver
    fn strategy(&self) -> DiscoveryStrategy;

    /// Block until an address is reported, setup fails, or `cancel` fires
    async fn resolve_address(
        &self,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<AddressObservation, MeasureError>;
}

/// Create the resolver for the configured strategy
pub fn create_resolver(
    strategy: DiscoveryStrategy,
    backend: Arc<dyn ClusterBackend>,
    poll_interval: Duration,
) -> Arc<dyn AddressResolver> {
    match strategy {
        DiscoveryStrategy::PodWatch => {
            tracing::info!("Using pod watch for address discovery");
            Arc::new(PodWatchResolver::new(backend))
        }
        DiscoveryStrategy::PodPoll => {
            tracing::info!(
                interval_ms = poll_interval.as_millis() as u64,
                "Using pod list polling for address discovery"
            );
            Arc::new(PodPollResolver::new(backend, poll_interval))
        }
        DiscoveryStrategy::EndpointWatch => {
            tracing::info!("Using CiliumEndpoint watch for address discovery");
            Arc::new(EndpointWatchResolver::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{
        pending_instance, running_instance, FakeCluster, ScriptedCluster, FAKE_INSTANCE,
    };
    use crate::cluster::EndpointStatus;
    use crate::error::ClusterError;
    use crate::models::WorkloadSpec;
    use std::sync::atomic::Ordering;
    use tokio::time::Instant;

    const ADDRESS_DELAY: Duration = Duration::from_millis(50);

    async fn resolve_with(strategy: DiscoveryStrategy) -> (AddressObservation, Duration) {
        let fake = Arc::new(FakeCluster::new("10.244.1.17", ADDRESS_DELAY));
        let spec = WorkloadSpec::new("startup-test", "img", 8080);
        fake.create_workload(&spec).await.unwrap();
        let created_at = fake.created_at().lock().unwrap().unwrap();

        let resolver = create_resolver(strategy, fake.clone(), DEFAULT_POLL_INTERVAL);
        assert_eq!(resolver.strategy(), strategy);

        let observation = resolver
            .resolve_address(&spec.selector(), &CancellationToken::new())
            .await
            .unwrap();
        (observation, created_at.elapsed())
    }

    #[tokio::test]
    async fn test_all_strategies_return_the_same_address() {
        for strategy in [
            DiscoveryStrategy::PodWatch,
            DiscoveryStrategy::PodPoll,
            DiscoveryStrategy::EndpointWatch,
        ] {
            let (observation, elapsed) = resolve_with(strategy).await;

            assert_eq!(observation.address, "10.244.1.17", "{}", strategy);
            assert_eq!(observation.instance, FAKE_INSTANCE);
            assert_eq!(observation.strategy, strategy);
            assert!(
                elapsed >= ADDRESS_DELAY,
                "{} returned after {:?}, before the address existed",
                strategy,
                elapsed
            );
        }
    }

    #[tokio::test]
    async fn test_watch_setup_failure_is_fatal() {
        for strategy in [DiscoveryStrategy::PodWatch, DiscoveryStrategy::EndpointWatch] {
            let fake = Arc::new(
                FakeCluster::new("10.244.1.17", ADDRESS_DELAY)
                    .failing_watch("pods is forbidden"),
            );
            let resolver = create_resolver(strategy, fake, DEFAULT_POLL_INTERVAL);

            let result = resolver
                .resolve_address("app=startup-test", &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(MeasureError::Discovery(_))));
        }
    }

    #[tokio::test]
    async fn test_poll_recovers_from_transient_list_errors() {
        let fake = Arc::new(FakeCluster::new("10.244.1.17", Duration::ZERO).failing_lists(3));
        let spec = WorkloadSpec::new("startup-test", "img", 8080);
        fake.create_workload(&spec).await.unwrap();

        let resolver = PodPollResolver::new(fake.clone(), Duration::from_millis(5));
        let observation = resolver
            .resolve_address(&spec.selector(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(observation.address, "10.244.1.17");
        assert_eq!(fake.list_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_resolvers_stop_on_cancellation() {
        for strategy in [
            DiscoveryStrategy::PodWatch,
            DiscoveryStrategy::PodPoll,
            DiscoveryStrategy::EndpointWatch,
        ] {
            // Address never arrives within the test
            let fake = Arc::new(FakeCluster::new("10.244.1.17", Duration::from_secs(3600)));
            let spec = WorkloadSpec::new("startup-test", "img", 8080);
            fake.create_workload(&spec).await.unwrap();

            let resolver = create_resolver(strategy, fake, DEFAULT_POLL_INTERVAL);
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                trigger.cancel();
            });

            let started = Instant::now();
            let result = resolver.resolve_address(&spec.selector(), &cancel).await;

            assert!(matches!(result, Err(MeasureError::Cancelled)), "{}", strategy);
            assert!(started.elapsed() < Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn test_watch_ending_before_address_is_watch_closed() {
        let pods = ScriptedCluster::instances(vec![Ok(pending_instance()), Ok(pending_instance())]);
        let result = PodWatchResolver::new(Arc::new(pods))
            .resolve_address("app=startup-test", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MeasureError::WatchClosed)), "{:?}", result);

        let endpoints = ScriptedCluster::endpoints(vec![Ok(EndpointStatus {
            name: FAKE_INSTANCE.to_string(),
            ipv4: vec![String::new()],
        })]);
        let result = EndpointWatchResolver::new(Arc::new(endpoints))
            .resolve_address("app=startup-test", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MeasureError::WatchClosed)), "{:?}", result);
    }

    #[tokio::test]
    async fn test_watch_error_after_events_is_fatal() {
        // The address arrives after the error and must not be used
        let pods = ScriptedCluster::instances(vec![
            Ok(pending_instance()),
            Err(ClusterError::rejected("watch desync 410 Gone")),
            Ok(running_instance("10.0.0.9")),
        ]);
        let result = PodWatchResolver::new(Arc::new(pods))
            .resolve_address("app=startup-test", &CancellationToken::new())
            .await;
        assert!(
            matches!(
                &result,
                Err(MeasureError::Discovery(ClusterError::Rejected(msg))) if msg == "watch desync 410 Gone"
            ),
            "{:?}",
            result
        );

        let endpoints = ScriptedCluster::endpoints(vec![
            Err(ClusterError::rejected("watch desync 410 Gone")),
            Ok(EndpointStatus {
                name: FAKE_INSTANCE.to_string(),
                ipv4: vec!["10.0.0.9".to_string()],
            }),
        ]);
        let result = EndpointWatchResolver::new(Arc::new(endpoints))
            .resolve_address("app=startup-test", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MeasureError::Discovery(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn test_watch_uses_first_usable_address() {
        let pods = ScriptedCluster::instances(vec![
            Ok(pending_instance()),
            Ok(running_instance("10.0.0.9")),
            Ok(running_instance("10.0.0.10")),
        ]);
        let observation = PodWatchResolver::new(Arc::new(pods))
            .resolve_address("app=startup-test", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(observation.address, "10.0.0.9");
    }
}
