//! PostgreSQL-backed collaborator implementations.
//!
//! Tenant metadata documents and the initiation ledger live in two tables.
//! Each repository implements one collaborator trait from [`crate::stores`],
//! so the resolver and processor never see SQL.

use std::sync::Arc;

use sqlx::PgPool;

pub mod initiations;
pub mod tenant_metadata;

use crate::stores::StoreError;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Tenant metadata documents.
    pub tenant_metadata: Arc<tenant_metadata::Repository>,

    /// Completed-initiation records.
    pub initiations: Arc<initiations::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);
        Self {
            tenant_metadata: Arc::new(tenant_metadata::Repository::new(pool.clone())),
            initiations: Arc::new(initiations::Repository::new(pool)),
        }
    }
}

/// Creates the tables this service owns if they do not exist yet.
///
/// # Errors
///
/// Returns the underlying database error if any statement fails.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tenant_metadata (
            namespace TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (namespace, tenant_id)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tenant_initiations (
            tenant_id TEXT PRIMARY KEY,
            completed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Classifies a database error for the collaborator layer.
///
/// Connection-level failures are transient; everything else means the stored
/// data cannot be used.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Invalid(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_transient() {
        assert!(matches!(classify(sqlx::Error::PoolTimedOut), StoreError::Unavailable(_)));
        assert!(matches!(classify(sqlx::Error::RowNotFound), StoreError::NotFound(_)));
        assert!(matches!(
            classify(sqlx::Error::ColumnNotFound("metadata".into())),
            StoreError::Invalid(_)
        ));
    }
}
