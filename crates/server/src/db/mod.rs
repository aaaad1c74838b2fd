//! Database operations for the ordering `PostgreSQL`.
//!
//! # Tables
//!
//! - `carts` / `cart_lines` - One draft cart per customer
//! - `orders` / `order_lines` - Immutable order snapshots and their lifecycle status
//!
//! # Migrations
//!
//! Migrations live in `crates/server/migrations/` and run automatically on
//! startup when the Postgres backend is selected.

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
