//! Test infrastructure for the webhook pipeline.
//!
//! Provides in-memory doubles for every external collaborator, recording
//! doubles for the queue and handlers, webhook builders with signing helpers,
//! and a [`TestEnv`] wiring them into a complete in-process pipeline. Only
//! the [`database`] helpers touch PostgreSQL, and only when `DATABASE_URL`
//! is set.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod database;
pub mod env;
pub mod fixtures;
pub mod recording;
pub mod stores;

pub use database::{test_pool, unique_tenant, unreachable_pool};
pub use env::{TestEnv, CALLBACK_URL};
pub use fixtures::{
    hmac_signature, task_webhook, tenant_metadata, WebhookBuilder, PROVIDER, SCENARIO_BODY,
    SCENARIO_SECRET, SCENARIO_TENANT,
};
pub use recording::{CreatedTask, RecordingHandler, RecordingTaskQueue, StaticTaskDetailApi};
pub use stores::{InMemoryInitiationLedger, InMemoryMetadataStore, InMemorySecretStore};
