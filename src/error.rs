//! Central error types for the node observability operator
//!
//! Uses `thiserror` for the error enum. Every variant is safe to retry on a
//! later pass because each reconcile step is idempotent; `is_retriable` only
//! decides how soon that pass happens.

use thiserror::Error;

/// Central error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs that has no more specific mapping
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error while building a payload
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Object is absent from the store
    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    /// Optimistic-concurrency collision or a create that lost a race
    #[error("Conflict on {kind}/{name}: modified concurrently")]
    Conflict { kind: String, name: String },

    /// A mutation succeeded but the follow-up read disagrees with it
    #[error("Inconsistent state for {kind}/{name}: store still reports the object after deletion")]
    InconsistentState { kind: String, name: String },

    /// Transient infrastructure failure talking to the API server
    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String),

    /// Finalizer-related error during cleanup
    #[error("Finalizer error: {0}")]
    FinalizerError(String),

    /// Operator configuration or startup error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// One or more capabilities failed to converge during a pass
    #[error("failed to converge profiling configs: {}", join_errors(.0))]
    Convergence(Vec<Error>),
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Classify a kube-rs error returned for `kind/name`
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref resp) if resp.code == 404 => Error::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref resp) if resp.code == 409 => Error::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref resp) if resp.code == 429 || resp.code >= 500 => {
                Error::StoreUnavailable(err.to_string())
            }
            kube::Error::Api(_) => Error::KubeError(err),
            other => Error::StoreUnavailable(other.to_string()),
        }
    }

    /// Build an aggregate from collected errors, `None` if nothing failed
    pub fn aggregate(errors: Vec<Error>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Error::Convergence(errors))
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this error type should trigger the short backoff
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(_)
            | Error::Conflict { .. }
            | Error::InconsistentState { .. }
            | Error::StoreUnavailable(_)
            | Error::FinalizerError(_) => true,
            Error::Convergence(errors) => errors.iter().any(Error::is_retriable),
            Error::SerializationError(_) | Error::NotFound { .. } | Error::ConfigError(_) => false,
        }
    }

    /// Short label used for the error metric
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::SerializationError(_) => "serialization",
            Error::NotFound { .. } => "not_found",
            Error::Conflict { .. } => "conflict",
            Error::InconsistentState { .. } => "inconsistent_state",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::FinalizerError(_) => "finalizer",
            Error::ConfigError(_) => "config",
            Error::Convergence(_) => "convergence",
        }
    }
}
