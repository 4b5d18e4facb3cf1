//! Error types for the change-triggered-job operator.

use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A watched resource referenced by a trigger does not exist.
    #[error("watched resource not found: {kind}/{name} in namespace {namespace:?}")]
    WatchedResourceMissing {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace, if namespaced.
        namespace: Option<String>,
    },

    /// A resource reference names an unknown kind or violates its scope.
    #[error("invalid resource reference: {0}")]
    InvalidReference(String),

    /// The embedded Job template was rejected by the API server.
    #[error("invalid job template: {0}")]
    InvalidJobTemplate(String),

    /// Invalid operator configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl OperatorError {
    /// Whether this error is a user configuration error that will not heal
    /// on retry. Fatal errors are recorded in the trigger's conditions and
    /// the reconciler waits for a spec change instead of requeueing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OperatorError::InvalidReference(_) | OperatorError::InvalidJobTemplate(_)
        )
    }

    /// Condition reason string recorded when this error aborts a reconcile.
    pub fn reason(&self) -> &'static str {
        match self {
            OperatorError::InvalidReference(_) => "InvalidReference",
            OperatorError::InvalidJobTemplate(_) => "InvalidJobTemplate",
            OperatorError::WatchedResourceMissing { .. } => "WatchedResourceMissing",
            _ => "Error",
        }
    }
}
