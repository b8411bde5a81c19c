//! In-memory cluster backend for engine tests
//!
//! Simulates one workload whose instance appears immediately on creation and
//! is assigned an address after a configurable delay. Every capability call is
//! counted so tests can assert which stages ran.

use super::{
    ClusterBackend, EndpointStatus, EndpointStream, InstanceStatus, InstanceStream,
};
use crate::error::ClusterError;
use crate::models::WorkloadSpec;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

pub(crate) const FAKE_INSTANCE: &str = "startup-test-5c7b9d-x2k4q";

pub(crate) struct FakeCluster {
    address: String,
    address_delay: Duration,
    create_error: Option<String>,
    watch_error: Option<String>,
    failing_lists: AtomicUsize,
    created_at: Arc<Mutex<Option<Instant>>>,
    pub create_calls: AtomicUsize,
    pub watch_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub endpoint_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new(address: impl Into<String>, address_delay: Duration) -> Self {
        Self {
            address: address.into(),
            address_delay,
            create_error: None,
            watch_error: None,
            failing_lists: AtomicUsize::new(0),
            created_at: Arc::new(Mutex::new(None)),
            create_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            endpoint_calls: AtomicUsize::new(0),
        }
    }

    /// Reject every create request with the given message
    pub fn rejecting_create(mut self, message: impl Into<String>) -> Self {
        self.create_error = Some(message.into());
        self
    }

    /// Fail watch subscriptions at setup
    pub fn failing_watch(mut self, message: impl Into<String>) -> Self {
        self.watch_error = Some(message.into());
        self
    }

    /// Fail the first `n` list calls
    pub fn failing_lists(self, n: usize) -> Self {
        self.failing_lists.store(n, Ordering::SeqCst);
        self
    }

    /// Shared handle to the creation instant, set once the workload is accepted
    pub fn created_at(&self) -> Arc<Mutex<Option<Instant>>> {
        self.created_at.clone()
    }

    pub fn discovery_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
            + self.list_calls.load(Ordering::SeqCst)
            + self.endpoint_calls.load(Ordering::SeqCst)
    }

    fn address_ready_at(&self) -> Instant {
        let created = self
            .created_at
            .lock()
            .unwrap()
            .unwrap_or_else(Instant::now);
        created + self.address_delay
    }

    fn pending(&self) -> InstanceStatus {
        pending_instance()
    }

    fn assigned(&self) -> InstanceStatus {
        running_instance(&self.address)
    }

    /// Emit `before` immediately and `after` once the address delay has passed
    fn delayed_stream<T: Send + 'static>(
        &self,
        before: T,
        after: T,
    ) -> futures::stream::BoxStream<'static, Result<T, ClusterError>> {
        let (tx, rx) = mpsc::channel(4);
        let ready_at = self.address_ready_at();

        tokio::spawn(async move {
            if tx.send(Ok(before)).await.is_err() {
                return;
            }
            tokio::time::sleep_until(ready_at).await;
            let _ = tx.send(Ok(after)).await;
            // Keep the stream open like a live watch
            tx.closed().await;
        });

        ReceiverStream::new(rx).boxed()
    }
}

#[async_trait]
impl ClusterBackend for FakeCluster {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.create_error {
            return Err(ClusterError::rejected(message.clone()));
        }
        assert_eq!(spec.selector(), format!("app={}", spec.name));
        *self.created_at.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    async fn watch_instances(&self, _selector: &str) -> Result<InstanceStream, ClusterError> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.watch_error {
            return Err(ClusterError::rejected(message.clone()));
        }
        Ok(self.delayed_stream(self.pending(), self.assigned()))
    }

    async fn list_instances(&self, _selector: &str) -> Result<Vec<InstanceStatus>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing_lists.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_lists.store(remaining - 1, Ordering::SeqCst);
            return Err(ClusterError::rejected("etcdserver: request timed out"));
        }

        if self.created_at.lock().unwrap().is_none() {
            return Ok(Vec::new());
        }
        if Instant::now() >= self.address_ready_at() {
            Ok(vec![self.assigned()])
        } else {
            Ok(vec![self.pending()])
        }
    }

    async fn watch_endpoints(&self, _selector: &str) -> Result<EndpointStream, ClusterError> {
        self.endpoint_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.watch_error {
            return Err(ClusterError::rejected(message.clone()));
        }
        let before = EndpointStatus {
            name: FAKE_INSTANCE.to_string(),
            ipv4: Vec::new(),
        };
        let after = EndpointStatus {
            name: FAKE_INSTANCE.to_string(),
            ipv4: vec![String::new(), self.address.clone()],
        };
        Ok(self.delayed_stream(before, after))
    }
}

/// Backend whose watch streams replay a fixed script and then end
///
/// Creation always succeeds and listing returns nothing.
#[derive(Default)]
pub(crate) struct ScriptedCluster {
    instances: Mutex<Vec<Result<InstanceStatus, ClusterError>>>,
    endpoints: Mutex<Vec<Result<EndpointStatus, ClusterError>>>,
}

impl ScriptedCluster {
    pub fn instances(script: Vec<Result<InstanceStatus, ClusterError>>) -> Self {
        Self {
            instances: Mutex::new(script),
            ..Default::default()
        }
    }

    pub fn endpoints(script: Vec<Result<EndpointStatus, ClusterError>>) -> Self {
        Self {
            endpoints: Mutex::new(script),
            ..Default::default()
        }
    }
}

/// Instance without an address yet
pub(crate) fn pending_instance() -> InstanceStatus {
    InstanceStatus {
        name: FAKE_INSTANCE.to_string(),
        phase: Some("Pending".to_string()),
        address: None,
    }
}

/// Instance running at `address`
pub(crate) fn running_instance(address: &str) -> InstanceStatus {
    InstanceStatus {
        name: FAKE_INSTANCE.to_string(),
        phase: Some("Running".to_string()),
        address: Some(address.to_string()),
    }
}

#[async_trait]
impl ClusterBackend for ScriptedCluster {
    async fn create_workload(&self, _spec: &WorkloadSpec) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn watch_instances(&self, _selector: &str) -> Result<InstanceStream, ClusterError> {
        let script = std::mem::take(&mut *self.instances.lock().unwrap());
        Ok(futures::stream::iter(script).boxed())
    }

    async fn list_instances(&self, _selector: &str) -> Result<Vec<InstanceStatus>, ClusterError> {
        Ok(Vec::new())
    }

    async fn watch_endpoints(&self, _selector: &str) -> Result<EndpointStream, ClusterError> {
        let script = std::mem::take(&mut *self.endpoints.lock().unwrap());
        Ok(futures::stream::iter(script).boxed())
    }
}
