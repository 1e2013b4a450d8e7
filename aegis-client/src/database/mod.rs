//! Durable storage for the origin
//!
//! SQLite file holding the origin's local storage area. Each tab opens its
//! own pool over the same file, and `SqliteStore` exposes it through the
//! `KeyValueStore` trait.

pub mod models;
pub mod repository;
pub mod schema;

pub use models::KvEntry;
pub use repository::SqliteStore;
pub use schema::{initialize_database, schema_version};

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Connections allowed per tab pool
const POOL_SIZE: u32 = 5;

/// Other tabs may hold the write lock briefly
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn connect_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal)
}

/// Open the storage file at `db_path`, migrating it first.
///
/// Migrations run on their own single connection, closed before the
/// returned pool opens any connection.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    {
        let migrator = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options(db_path))
            .await?;
        initialize_database(&migrator).await?;
        migrator.close().await;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(POOL_SIZE)
        .connect_with(connect_options(db_path))
        .await?;

    tracing::info!("Storage opened at {:?}", db_path);
    Ok(pool)
}
