//! SQLite persistence layer for the shared-counter service.
//!
//! This crate provides async database operations for counters, counter images,
//! and user color assignments using SQLx with SQLite. [`Database`] implements
//! [`CounterStore`], the collaborator the server's mutation endpoints and live
//! stream are written against.
//!
//! # Example
//!
//! ```no_run
//! use counter_core::NewCounter;
//! use database::{counter, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:counters.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Create a counter and bump it
//!     let (created, _) = counter::upsert_counter(db.pool(), &NewCounter::named("Laps")).await?;
//!     counter::apply_delta(db.pool(), &created.id, 1).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod counter;
pub mod error;
pub mod image;
pub mod models;
pub mod user_color;

pub use error::{DatabaseError, Result};
pub use models::{CounterImage, CounterRow, UserColorRow};

use async_trait::async_trait;
use counter_core::{Counter, CounterPatch, CounterStore, NewCounter, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    const DEFAULT_POOL_SIZE: u32 = 10;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Open a private in-memory database with the schema applied.
    ///
    /// Every SQLite connection to `:memory:` is a separate database, so the
    /// pool is pinned to a single connection.
    pub async fn in_memory() -> Result<Self> {
        let db = Self::connect_with_pool_size("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map a `NotFound` into `Ok(None)`, as the store contract expects.
fn optional(result: Result<Counter>) -> std::result::Result<Option<Counter>, StoreError> {
    match result {
        Ok(counter) => Ok(Some(counter)),
        Err(DatabaseError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CounterStore for Database {
    async fn list(&self) -> std::result::Result<Vec<Counter>, StoreError> {
        Ok(counter::list_counters(&self.pool).await?)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Option<Counter>, StoreError> {
        Ok(counter::find_counter(&self.pool, id).await?)
    }

    async fn apply_delta(
        &self,
        id: &str,
        delta: i64,
    ) -> std::result::Result<Option<Counter>, StoreError> {
        optional(counter::apply_delta(&self.pool, id, delta).await)
    }

    async fn upsert(&self, fields: NewCounter) -> std::result::Result<(Counter, bool), StoreError> {
        Ok(counter::upsert_counter(&self.pool, &fields).await?)
    }

    async fn update(
        &self,
        id: &str,
        patch: &CounterPatch,
    ) -> std::result::Result<Option<Counter>, StoreError> {
        optional(counter::update_counter(&self.pool, id, patch).await)
    }

    async fn delete(&self, id: &str) -> std::result::Result<Option<Counter>, StoreError> {
        optional(counter::delete_counter(&self.pool, id).await)
    }

    async fn set_image_url(
        &self,
        id: &str,
        image_url: Option<String>,
    ) -> std::result::Result<Option<Counter>, StoreError> {
        optional(counter::set_image_url(&self.pool, id, image_url.as_deref()).await)
    }
}
