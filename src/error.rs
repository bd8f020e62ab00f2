//! Error types for the OpenSearch operator
//!
//! Errors carry enough context (object name, component) to be useful in
//! controller logs. The reconcile engine relies on [`Error::is_conflict`] to
//! decide which failures are retried locally and which are surfaced to the
//! controller runtime for backoff.

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (anything other than a version conflict)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Optimistic concurrency failure: the resourceVersion sent with a write
    /// no longer matches the stored object
    #[error("conflict writing {name}: {message}")]
    Conflict {
        /// Name of the object being written
        name: String,
        /// Message returned by the store
        message: String,
    },

    /// The object disappeared while a read-modify-write was in flight
    #[error("{namespace}/{name} not found")]
    NotFound {
        /// Namespace of the missing object
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// The reconcile call was cancelled before it could finish
    #[error("reconciliation cancelled")]
    Cancelled,

    /// A pipeline unit failed to converge its resources
    #[error("component {component} failed: {message}")]
    Component {
        /// Pipeline unit that failed (e.g. "tls", "dashboards")
        component: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Context where the error occurred (e.g. "runner", "telemetry")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a conflict error for the named object
    pub fn conflict(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error for the given object identity
    pub fn not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a component error
    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Returns true for version conflicts, the only errors retried locally
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true when the object no longer exists
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// Returns true when the call was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
