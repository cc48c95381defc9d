//! Error types for the waveflow engine.
//!
//! Every fallible operation returns [`FlowError`]. The struct errors carry the
//! structured detail for the kinds callers commonly match on.

use crate::observers::LifecycleEvent;
use std::time::Duration;
use thiserror::Error;

/// Boxed source error produced by task bodies and observers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for waveflow operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The pipeline or a service was configured incorrectly.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A declared dependency path was absent from an upstream result.
    #[error("{0}")]
    KeyLookup(#[from] KeyLookupError),

    /// An operation was attempted in the wrong lifecycle state.
    #[error("{0}")]
    InvalidState(#[from] InvalidStateError),

    /// A task computation returned an error or panicked.
    #[error("Service '{service}' failed: {source}")]
    TaskFailed {
        /// The failing service name.
        service: String,
        /// The underlying task error.
        #[source]
        source: BoxError,
    },

    /// A task computation did not finish within its timeout.
    #[error("Service '{service}' timed out after {timeout:?}")]
    Timeout {
        /// The service name.
        service: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A running service was aborted because its wave failed.
    #[error("Service '{service}' cancelled: {reason}")]
    Cancelled {
        /// The service name.
        service: String,
        /// Why the service was cancelled.
        reason: String,
    },

    /// An observer returned an error from a lifecycle hook.
    #[error("Observer failed during '{event}': {source}")]
    Observer {
        /// The lifecycle event being dispatched.
        event: LifecycleEvent,
        /// The observer error.
        #[source]
        source: BoxError,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Creates a task failure for the named service.
    pub fn task_failed(service: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::TaskFailed {
            service: service.into(),
            source: source.into(),
        }
    }

    /// Returns true for failures that `allow_failure` may absorb.
    #[must_use]
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailed { .. } | Self::Timeout { .. })
    }

    /// Returns true if the error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short, stable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::KeyLookup(_) => "KeyLookupError",
            Self::InvalidState(_) => "InvalidState",
            Self::TaskFailed { .. } => "TaskFailed",
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled { .. } => "Cancelled",
            Self::Observer { .. } => "ObserverError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// Error raised when a pipeline or service is misconfigured.
#[derive(Debug, Clone, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The service the error relates to, if any.
    pub service: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            service: None,
        }
    }

    /// Sets the service the error relates to.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// Error raised when a dotted path cannot be resolved in an upstream result.
#[derive(Debug, Clone, Error)]
#[error("Key '{path}' not found in result of '{upstream}'")]
pub struct KeyLookupError {
    /// The dotted path that failed to resolve.
    pub path: String,
    /// The upstream service name.
    pub upstream: String,
}

impl KeyLookupError {
    /// Creates a new key lookup error.
    #[must_use]
    pub fn new(path: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            upstream: upstream.into(),
        }
    }
}

/// Error raised when a lifecycle operation is not valid in the current state.
#[derive(Debug, Clone, Error)]
#[error("Invalid state for '{subject}' ({status}): {message}")]
pub struct InvalidStateError {
    /// The service or pipeline name.
    pub subject: String,
    /// The status at the time of the call.
    pub status: String,
    /// What was attempted.
    pub message: String,
}

impl InvalidStateError {
    /// Creates a new invalid state error.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        status: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            status: status.to_string(),
            message: message.into(),
        }
    }
}
