//! Cluster control-plane capability
//!
//! The measurement engine talks to the cluster only through
//! [`ClusterBackend`]: create the workload, watch or list its instances, and
//! watch the network plugin's per-instance endpoint records. The production
//! implementation is [`KubeCluster`]; tests substitute an in-memory fake.

mod k8s;

#[cfg(test)]
pub(crate) mod fake;

pub use k8s::{build_deployment, cilium_endpoint_resource, KubeCluster};

use crate::error::ClusterError;
use crate::models::WorkloadSpec;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of instance status updates in arrival order
pub type InstanceStream = BoxStream<'static, Result<InstanceStatus, ClusterError>>;

/// Stream of network-plugin endpoint updates in arrival order
pub type EndpointStream = BoxStream<'static, Result<EndpointStatus, ClusterError>>;

/// Status of one workload instance (pod) as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceStatus {
    pub name: String,
    pub phase: Option<String>,
    /// Assigned pod address, `None` until the instance is scheduled and networked
    pub address: Option<String>,
}

impl InstanceStatus {
    /// The reported address, ignoring empty strings
    pub fn usable_address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.is_empty())
    }
}

/// Network-plugin record for one instance
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointStatus {
    pub name: String,
    /// IPv4 entries of the addressing list, in plugin order (may be empty strings)
    pub ipv4: Vec<String>,
}

impl EndpointStatus {
    /// First populated IPv4 entry
    pub fn first_ipv4(&self) -> Option<&str> {
        self.ipv4.iter().map(String::as_str).find(|a| !a.is_empty())
    }
}

/// Operations the measurement engine needs from the cluster
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Submit the single-replica workload
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError>;

    /// Subscribe to instance changes matching a label selector
    async fn watch_instances(&self, selector: &str) -> Result<InstanceStream, ClusterError>;

    /// List instances matching a label selector
    async fn list_instances(&self, selector: &str) -> Result<Vec<InstanceStatus>, ClusterError>;

    /// Subscribe to network-plugin endpoint records matching a label selector
    async fn watch_endpoints(&self, selector: &str) -> Result<EndpointStream, ClusterError>;
}
