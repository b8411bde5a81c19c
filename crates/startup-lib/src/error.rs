//! Error types for startup measurements

use thiserror::Error;

/// Errors raised by a cluster backend
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Watch stream error
    #[error("watch error: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    /// Request rejected by the control plane (name collision, validation, ...)
    #[error("request rejected: {0}")]
    Rejected(String),

    /// A resource could not be decoded into the shape discovery expects
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// The API server refused our credentials (401) or permissions (403)
    ///
    /// Retrying cannot fix this until the service account or RBAC changes.
    pub fn is_access_denied(&self) -> bool {
        use kube::runtime::watcher::Error as WatchError;

        match self {
            ClusterError::Kube(e) => kube_access_denied(e),
            ClusterError::Watch(
                WatchError::InitialListFailed(e)
                | WatchError::WatchStartFailed(e)
                | WatchError::WatchFailed(e),
            ) => kube_access_denied(e),
            ClusterError::Watch(WatchError::WatchError(resp)) => denied_code(resp.code),
            _ => false,
        }
    }
}

fn kube_access_denied(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(resp) if denied_code(resp.code))
}

fn denied_code(code: u16) -> bool {
    code == 401 || code == 403
}

/// Errors that abort a measurement run
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MeasureError {
    /// The control plane refused to create the workload
    #[error("error creating deployment: {0}")]
    CreateWorkload(#[source] ClusterError),

    /// Watch or list setup failed while discovering the instance address
    #[error("error discovering pod address: {0}")]
    Discovery(#[source] ClusterError),

    /// The event stream ended before any address was reported
    #[error("watch stream closed before an address was assigned")]
    WatchClosed,

    /// The run was cancelled from outside
    #[error("measurement cancelled")]
    Cancelled,

    /// The configured run deadline elapsed
    #[error("measurement exceeded deadline of {0:?}")]
    DeadlineExceeded(std::time::Duration),

    /// The probe HTTP client could not be built
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Coarse classification used for metric labels and health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ControlPlane,
    Discovery,
    Cancelled,
    Deadline,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ControlPlane => "control_plane",
            ErrorKind::Discovery => "discovery",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Deadline => "deadline",
            ErrorKind::Internal => "internal",
        }
    }
}

impl MeasureError {
    /// A control-plane call failed on credentials or permissions
    pub fn is_access_denied(&self) -> bool {
        match self {
            MeasureError::CreateWorkload(e) | MeasureError::Discovery(e) => e.is_access_denied(),
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MeasureError::CreateWorkload(_) => ErrorKind::ControlPlane,
            MeasureError::Discovery(_) | MeasureError::WatchClosed => ErrorKind::Discovery,
            MeasureError::Cancelled => ErrorKind::Cancelled,
            MeasureError::DeadlineExceeded(_) => ErrorKind::Deadline,
            MeasureError::HttpClient(_) => ErrorKind::Internal,
        }
    }
}
