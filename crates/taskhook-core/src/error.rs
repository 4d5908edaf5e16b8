//! Error taxonomy and result handling for the webhook pipeline.
//!
//! Every failure that can surface at an HTTP boundary is classified into one
//! of five classes, each with a stable error code and status mapping. Narrow
//! collaborator errors (`StoreError`) are translated into this taxonomy by the
//! component that calls the collaborator.

use thiserror::Error;

use crate::stores::StoreError;

/// Result type alias using `TaskhookError`.
pub type Result<T> = std::result::Result<T, TaskhookError>;

/// Taskhook error types with codes and HTTP status mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskhookError {
    /// Malformed or unidentifiable request (E1001).
    #[error("[E1001] Bad request: {0}")]
    Client(String),

    /// Missing, mismatched, or unsupported signature (E1002).
    #[error("[E1002] Unauthorized: {0}")]
    Auth(String),

    /// Unknown tenant (E1003).
    #[error("[E1003] Unknown tenant: {tenant_id}")]
    NotFound {
        /// Tenant id that had no metadata
        tenant_id: String,
    },

    /// Tenant misconfiguration (E2001).
    #[error("[E2001] Tenant misconfigured: {0}")]
    Config(String),

    /// Transient failure of the metadata or secret store (E3001).
    #[error("[E3001] Dependency unavailable: {0}")]
    Unavailable(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskhookError {
    /// Creates a client error.
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client(message.into())
    }

    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Client(_) => "E1001",
            Self::Auth(_) => "E1002",
            Self::NotFound { .. } => "E1003",
            Self::Config(_) => "E2001",
            Self::Unavailable(_) => "E3001",
            Self::Internal(_) => "E9999",
        }
    }

    /// Returns the HTTP status code this error surfaces as.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Client(_) => 400,
            Self::Auth(_) => 401,
            Self::NotFound { .. } => 404,
            Self::Config(_) | Self::Internal(_) => 500,
            Self::Unavailable(_) => 503,
        }
    }

    /// Returns whether redelivering the same request could succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for TaskhookError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::Config(format!("{what} not found")),
            StoreError::Unavailable(message) => Self::Unavailable(message),
            StoreError::Invalid(message) => Self::Config(message),
        }
    }
}
