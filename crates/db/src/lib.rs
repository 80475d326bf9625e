//! Record store and change feed for Firewatch.
//!
//! - [`RecordStore`] / [`ChangeFeed`]: the collaborator contracts the engine
//!   consumes.
//! - [`PgStore`] / [`PgChangeFeed`]: PostgreSQL implementations built on the
//!   [`repositories`] and `LISTEN/NOTIFY`.
//! - [`MemoryStore`]: an in-process implementation of both contracts used by
//!   tests and local tooling.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod feed;
pub mod memory;
pub mod models;
pub mod pg_feed;
pub mod pg_store;
pub mod repositories;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use feed::{ChangeFeed, FeedError, FeedSubscription};
pub use memory::MemoryStore;
pub use pg_feed::PgChangeFeed;
pub use pg_store::PgStore;
pub use store::RecordStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
