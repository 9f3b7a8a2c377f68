//! Persistence layer for workers and operations.
//!
//! Two backends implement the [`PresenceStore`] and [`OperationStore`]
//! traits:
//!
//! - [`MemoryStore`] -- process-local tables behind `tokio::sync::RwLock`.
//! - [`PgStore`] -- PostgreSQL via the repositories in [`repositories`].

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;
pub mod store;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{
    CasOutcome, ClaimOutcome, OperationStore, PresenceStore, ReleaseOutcome, StoreError,
    StoreResult,
};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
