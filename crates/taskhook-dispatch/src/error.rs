//! Error types for durable dispatch.

use taskhook_core::TaskhookError;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failures while handing a webhook to the durable task queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The queue could not be reached or answered with a transient failure.
    #[error("task queue unavailable: {message}")]
    Unavailable {
        /// Error message describing the failure
        message: String,
    },

    /// The queue refused the task.
    #[error("task queue rejected task: HTTP {status}")]
    Rejected {
        /// HTTP status code returned by the queue
        status: u16,
        /// Response body content
        body: String,
    },

    /// The payload could not be encoded or decoded.
    #[error("payload serialization failed: {message}")]
    Serialization {
        /// Serializer error message
        message: String,
    },

    /// Dispatcher or queue client misconfiguration.
    #[error("invalid dispatch configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl DispatchError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether submitting the same task again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Rejected { status, .. } => *status == 429,
            Self::Serialization { .. } | Self::Configuration { .. } => false,
        }
    }
}

impl From<DispatchError> for TaskhookError {
    fn from(err: DispatchError) -> Self {
        if err.is_retryable() {
            Self::unavailable(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(DispatchError::unavailable("connect refused").is_retryable());
        assert!(DispatchError::Rejected { status: 429, body: String::new() }.is_retryable());
        assert!(!DispatchError::Rejected { status: 403, body: String::new() }.is_retryable());
        assert!(!DispatchError::serialization("bad").is_retryable());
    }

    #[test]
    fn maps_into_taxonomy() {
        let err: TaskhookError = DispatchError::unavailable("down").into();
        assert_eq!(err.status_code(), 503);

        let err: TaskhookError = DispatchError::configuration("no url").into();
        assert_eq!(err.status_code(), 500);
    }
}
