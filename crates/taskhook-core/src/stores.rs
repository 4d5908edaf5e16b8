//! Collaborator interfaces for tenant metadata, secrets and initiation state.
//!
//! The pipeline never talks to a concrete store directly. Production
//! implementations live in [`crate::storage`] and [`crate::secrets`]; tests
//! inject in-memory doubles.

use async_trait::async_trait;
use thiserror::Error;

/// Tenant metadata as stored: a flat JSON object.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Failure reported by a metadata, secret, or ledger collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient failure; retrying later may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The stored value exists but cannot be used.
    #[error("invalid stored value: {0}")]
    Invalid(String),
}

/// Keyed store holding per-tenant metadata documents.
#[async_trait]
pub trait MetadataStore: Send + Sync + std::fmt::Debug {
    /// Fetches the metadata document for `tenant_id` under `namespace`.
    async fn get(&self, namespace: &str, tenant_id: &str) -> Result<Metadata, StoreError>;
}

/// Store that turns a secret reference into its payload bytes.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Resolves `secret_ref` to the raw secret payload.
    async fn resolve(&self, secret_ref: &str) -> Result<Vec<u8>, StoreError>;
}

/// Record of which tenants have completed the initiation workflow.
#[async_trait]
pub trait InitiationLedger: Send + Sync + std::fmt::Debug {
    /// Returns whether `tenant_id` has already completed initiation.
    async fn is_initiated(&self, tenant_id: &str) -> Result<bool, StoreError>;

    /// Records that `tenant_id` completed initiation. Must be idempotent.
    async fn mark_initiated(&self, tenant_id: &str) -> Result<(), StoreError>;
}
