//! Integration tests for the PostgreSQL repositories.
//!
//! Tests that need a live database skip when `DATABASE_URL` is unset. The
//! unreachable-database tests always run.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;
use taskhook_core::{
    storage::Storage, InitiationLedger, Metadata, MetadataStore, StoreError, TaskhookError,
    TenantResolver,
};
use taskhook_testing::{test_pool, unique_tenant, unreachable_pool, InMemorySecretStore};

const NAMESPACE: &str = "accounts";

async fn storage() -> Option<Storage> {
    let pool = test_pool().await.expect("DATABASE_URL is set but unusable");
    if pool.is_none() {
        eprintln!("DATABASE_URL not set; skipping storage test");
    }
    pool.map(Storage::new)
}

fn metadata(value: serde_json::Value) -> Metadata {
    value.as_object().cloned().expect("metadata literal is an object")
}

#[tokio::test]
async fn initiation_marks_are_idempotent() {
    let Some(storage) = storage().await else { return };
    let tenant = unique_tenant("init");
    let other = unique_tenant("init");

    assert!(!storage.initiations.is_initiated(&tenant).await.unwrap());

    storage.initiations.mark_initiated(&tenant).await.unwrap();
    storage.initiations.mark_initiated(&tenant).await.unwrap();

    assert!(storage.initiations.is_initiated(&tenant).await.unwrap());
    assert!(!storage.initiations.is_initiated(&other).await.unwrap());
}

#[tokio::test]
async fn unknown_tenant_metadata_is_not_found() {
    let Some(storage) = storage().await else { return };

    let result = storage.tenant_metadata.get(NAMESPACE, &unique_tenant("missing")).await;

    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn metadata_upsert_round_trips_and_replaces() {
    let Some(storage) = storage().await else { return };
    let tenant = unique_tenant("meta");
    let first = metadata(json!({"webhookSecret": "ref-1", "glMapping": {"deposits": "2100"}}));
    let second = metadata(json!({"webhookSecret": "ref-2", "automatedTasksCategoryId": 55}));

    storage.tenant_metadata.upsert(NAMESPACE, &tenant, &first).await.unwrap();
    assert_eq!(storage.tenant_metadata.get(NAMESPACE, &tenant).await.unwrap(), first);

    storage.tenant_metadata.upsert(NAMESPACE, &tenant, &second).await.unwrap();
    assert_eq!(storage.tenant_metadata.get(NAMESPACE, &tenant).await.unwrap(), second);

    let elsewhere = storage.tenant_metadata.get("other-namespace", &tenant).await;
    assert!(matches!(elsewhere, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn resolver_reads_repository_metadata() {
    let Some(storage) = storage().await else { return };
    let tenant = unique_tenant("resolve");
    let secrets = InMemorySecretStore::new();
    secrets.insert("api-ref", "api-key").await;
    secrets.insert("hook-ref", "hook-secret").await;
    let doc = metadata(json!({"apiKeySecret": "api-ref", "webhookSecret": "hook-ref"}));
    storage.tenant_metadata.upsert(NAMESPACE, &tenant, &doc).await.unwrap();

    let resolver =
        TenantResolver::new(storage.tenant_metadata.clone(), Arc::new(secrets), NAMESPACE);
    let context = resolver.resolve(&tenant).await.unwrap();
    let missing = resolver.resolve(&unique_tenant("resolve")).await;

    assert_eq!(context.webhook_secret(), "hook-secret");
    assert_eq!(missing.unwrap_err().status_code(), 404);
}

#[tokio::test]
async fn unreachable_database_is_unavailable() {
    let storage = Storage::new(unreachable_pool().unwrap());

    let metadata = storage.tenant_metadata.get(NAMESPACE, "acct-1").await;
    let ledger = storage.initiations.is_initiated("acct-1").await;

    assert!(matches!(metadata, Err(StoreError::Unavailable(_))), "{metadata:?}");
    assert!(matches!(ledger, Err(StoreError::Unavailable(_))), "{ledger:?}");
}

#[tokio::test]
async fn unreachable_metadata_store_maps_to_503() {
    let storage = Storage::new(unreachable_pool().unwrap());
    let resolver = TenantResolver::new(
        storage.tenant_metadata.clone(),
        Arc::new(InMemorySecretStore::new()),
        NAMESPACE,
    );

    let err = resolver.resolve("acct-1").await.unwrap_err();

    assert!(matches!(err, TaskhookError::Unavailable(_)), "{err:?}");
    assert_eq!(err.status_code(), 503);
}
