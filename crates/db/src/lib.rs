//! Postgres persistence for follows, the tracking cache, change events and
//! the notification outbox.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod models;
pub mod repositories;

pub use error::StoreError;

pub type DbPool = sqlx::PgPool;

/// Stored in `tracking_cache.season_number` for movies and full series.
pub const NO_SEASON: i32 = -1;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}

/// Map an optional season to its column value.
pub fn season_column(season_number: Option<i32>) -> i32 {
    season_number.unwrap_or(NO_SEASON)
}

/// Inverse of [`season_column`].
pub fn season_from_column(value: i32) -> Option<i32> {
    (value != NO_SEASON).then_some(value)
}
