//! Database layer: connection pool, embedded migrations, models, and
//! repositories for the ride dispatch platform.
//!
//! Repositories are zero-sized structs providing async methods that accept
//! `&PgPool` as the first argument. Every mutation of shared state (rides,
//! driver presence) is a single conditional `UPDATE` so concurrent
//! claim/cancel/report operations cannot interleave into an inconsistent
//! state.

pub mod models;
pub mod repositories;

use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
