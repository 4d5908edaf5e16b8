//! In-memory metadata, secret and initiation stores.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use taskhook_core::{InitiationLedger, Metadata, MetadataStore, SecretStore, StoreError};
use tokio::sync::RwLock;

/// Metadata store keyed by (namespace, tenant id).
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    documents: RwLock<HashMap<(String, String), Metadata>>,
    failure: RwLock<Option<StoreError>>,
    reads: AtomicUsize,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `metadata` for `tenant_id` under `namespace`.
    pub async fn insert(&self, namespace: &str, tenant_id: &str, metadata: Metadata) {
        let key = (namespace.to_string(), tenant_id.to_string());
        self.documents.write().await.insert(key, metadata);
    }

    /// Makes every subsequent read fail with `error`, or succeed again with
    /// `None`.
    pub async fn fail_with(&self, error: Option<StoreError>) {
        *self.failure.write().await = error;
    }

    /// Number of reads served, including failed ones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, namespace: &str, tenant_id: &str) -> Result<Metadata, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.read().await.clone() {
            return Err(error);
        }

        self.documents
            .read()
            .await
            .get(&(namespace.to_string(), tenant_id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{tenant_id}")))
    }
}

/// Secret store keyed by reference.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, Vec<u8>>>,
    failure: RwLock<Option<StoreError>>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `secret_ref`, replacing any previous version.
    pub async fn insert(&self, secret_ref: &str, value: impl Into<Vec<u8>>) {
        self.secrets.write().await.insert(secret_ref.to_string(), value.into());
    }

    /// Makes every subsequent resolve fail with `error`, or succeed again
    /// with `None`.
    pub async fn fail_with(&self, error: Option<StoreError>) {
        *self.failure.write().await = error;
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn resolve(&self, secret_ref: &str) -> Result<Vec<u8>, StoreError> {
        if let Some(error) = self.failure.read().await.clone() {
            return Err(error);
        }

        self.secrets
            .read()
            .await
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(secret_ref.to_string()))
    }
}

/// Initiation ledger backed by a set of tenant ids.
#[derive(Debug, Default)]
pub struct InMemoryInitiationLedger {
    initiated: RwLock<HashSet<String>>,
    failure: RwLock<Option<StoreError>>,
    checks: AtomicUsize,
}

impl InMemoryInitiationLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `tenant_id` as initiated without going through the trait.
    pub async fn seed(&self, tenant_id: &str) {
        self.initiated.write().await.insert(tenant_id.to_string());
    }

    /// Whether `tenant_id` is recorded as initiated.
    pub async fn contains(&self, tenant_id: &str) -> bool {
        self.initiated.read().await.contains(tenant_id)
    }

    /// Makes every subsequent call fail with `error`, or succeed again with
    /// `None`.
    pub async fn fail_with(&self, error: Option<StoreError>) {
        *self.failure.write().await = error;
    }

    /// Number of `is_initiated` checks served.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InitiationLedger for InMemoryInitiationLedger {
    async fn is_initiated(&self, tenant_id: &str) -> Result<bool, StoreError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.read().await.clone() {
            return Err(error);
        }
        Ok(self.contains(tenant_id).await)
    }

    async fn mark_initiated(&self, tenant_id: &str) -> Result<(), StoreError> {
        if let Some(error) = self.failure.read().await.clone() {
            return Err(error);
        }
        self.seed(tenant_id).await;
        Ok(())
    }
}
