//! Repository for tenant metadata documents.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use super::classify;
use crate::stores::{Metadata, MetadataStore, StoreError};

/// Repository for tenant metadata documents.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the metadata document for a tenant.
    ///
    /// # Errors
    ///
    /// Returns error if the upsert fails.
    pub async fn upsert(
        &self,
        namespace: &str,
        tenant_id: &str,
        metadata: &Metadata,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO tenant_metadata (namespace, tenant_id, metadata, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (namespace, tenant_id)
            DO UPDATE SET metadata = EXCLUDED.metadata, updated_at = NOW()
            ",
        )
        .bind(namespace)
        .bind(tenant_id)
        .bind(Json(metadata))
        .execute(&*self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }
}

#[async_trait]
impl MetadataStore for Repository {
    async fn get(&self, namespace: &str, tenant_id: &str) -> Result<Metadata, StoreError> {
        let row: Option<(Json<serde_json::Value>,)> = sqlx::query_as(
            r"
            SELECT metadata
            FROM tenant_metadata
            WHERE namespace = $1 AND tenant_id = $2
            ",
        )
        .bind(namespace)
        .bind(tenant_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(classify)?;

        match row {
            Some((Json(serde_json::Value::Object(metadata)),)) => Ok(metadata),
            Some(_) => Err(StoreError::Invalid(format!(
                "metadata for {namespace}/{tenant_id} is not an object"
            ))),
            None => Err(StoreError::NotFound(format!("{namespace}/{tenant_id}"))),
        }
    }
}
