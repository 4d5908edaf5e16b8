//! PostgreSQL pools for storage tests.
//!
//! Storage tests run against the database named by `DATABASE_URL`. When the
//! variable is unset [`test_pool`] returns `None` and callers skip, so the
//! rest of the suite never needs a database.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use taskhook_core::storage;
use tokio::sync::Mutex;
use uuid::Uuid;

static MIGRATED: Mutex<bool> = Mutex::const_new(false);

/// Connects to `DATABASE_URL` and makes sure the service tables exist.
///
/// # Errors
///
/// Returns the connection or migration error when `DATABASE_URL` is set but
/// unusable.
pub async fn test_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await?;

    // Concurrent CREATE TABLE IF NOT EXISTS can race on the catalog.
    let mut migrated = MIGRATED.lock().await;
    if !*migrated {
        storage::migrate(&pool).await?;
        *migrated = true;
    }

    Ok(Some(pool))
}

/// Pool pointing at a port nothing listens on.
///
/// # Errors
///
/// Returns an error only if the hard-coded URL fails to parse.
pub fn unreachable_pool() -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy("postgresql://taskhook@127.0.0.1:1/taskhook")
}

/// Tenant id no other test run uses.
pub fn unique_tenant(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
