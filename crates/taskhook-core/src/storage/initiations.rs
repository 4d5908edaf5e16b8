//! Repository recording which tenants completed initiation.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use super::classify;
use crate::stores::{InitiationLedger, StoreError};

/// Repository for completed-initiation records.
#[derive(Debug)]
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InitiationLedger for Repository {
    async fn is_initiated(&self, tenant_id: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tenant_initiations WHERE tenant_id = $1)",
        )
        .bind(tenant_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(classify)?;

        Ok(exists)
    }

    async fn mark_initiated(&self, tenant_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO tenant_initiations (tenant_id)
            VALUES ($1)
            ON CONFLICT (tenant_id) DO NOTHING
            ",
        )
        .bind(tenant_id)
        .execute(&*self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }
}
