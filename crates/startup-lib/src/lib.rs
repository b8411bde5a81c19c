//! Startup-time measurement engine
//!
//! Measures how long a freshly created Kubernetes deployment takes to answer
//! its health check:
//! - Workload creation through an injected cluster capability
//! - Pod address discovery (pod watch, pod list polling, CiliumEndpoint watch)
//! - HTTP health probing of the discovered address
//! - Latency reporting, metrics and structured logs

pub mod cluster;
pub mod discovery;
pub mod error;
pub mod format;
pub mod health;
pub mod measure;
pub mod models;
pub mod observability;
pub mod probe;

pub use cluster::{ClusterBackend, KubeCluster};
pub use discovery::{create_resolver, AddressResolver};
pub use error::{ClusterError, ErrorKind, MeasureError};
pub use format::format_duration;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use measure::Measurer;
pub use models::*;
pub use observability::{StartupMetrics, StructuredLogger};
pub use probe::{HealthProber, ProbeConfig};
