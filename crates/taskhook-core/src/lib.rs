//! Core domain models, tenant resolution and webhook verification.
//!
//! Provides the strongly-typed building blocks every other taskhook crate
//! depends on: the error taxonomy, the envelope and tenant context models,
//! collaborator traits for metadata, secrets and initiation state, the
//! [`TenantResolver`], and the [`WebhookVerifier`] that is the sole producer
//! of [`VerifiedWebhook`] values.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod error;
pub mod metadata;
pub mod models;
pub mod resolver;
pub mod secrets;
pub mod storage;
pub mod stores;
pub mod verifier;

pub use error::{Result, TaskhookError};
pub use models::{TenantContext, TenantId, VerificationScheme, VerifiedWebhook, WebhookEnvelope};
pub use resolver::TenantResolver;
pub use stores::{InitiationLedger, Metadata, MetadataStore, SecretStore, StoreError};
pub use verifier::{VerifierConfig, WebhookVerifier};
