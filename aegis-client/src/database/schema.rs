//! Storage schema
//!
//! Versioned migrations for the key-value table that backs the
//! origin-wide local storage area. The file is opened in WAL mode so the
//! pools of several tabs can read while one of them writes.

use crate::error::Result;
use sqlx::{sqlite::SqlitePool, Row};

/// Ordered list of schema migrations, keyed by version.
const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("migrations/001_key_value_store.sql"))];

/// Bring the storage schema up to the latest version
pub async fn initialize_database(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let from = schema_version(pool).await?;
    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _)| *v > from).collect();
    if pending.is_empty() {
        tracing::debug!("Storage schema already at version {}", from);
        return Ok(());
    }

    for (version, sql) in pending {
        apply_migration(pool, *version, sql).await?;
    }

    tracing::info!(
        "Storage schema migrated from version {} to {}",
        from,
        schema_version(pool).await?
    );
    Ok(())
}

/// Highest applied migration, 0 on a fresh file
pub async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    let version: i32 = sqlx::query("SELECT COALESCE(MAX(version), 0) FROM migrations")
        .fetch_one(pool)
        .await?
        .get(0);
    Ok(version)
}

/// Run one migration and record it atomically
async fn apply_migration(pool: &SqlitePool, version: i32, sql: &str) -> Result<()> {
    tracing::info!("Applying storage migration {}", version);

    let mut tx = pool.begin().await?;
    for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query("INSERT INTO migrations (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_is_migrated() {
        let pool = memory_pool().await;
        assert!(schema_version(&pool).await.is_err());

        initialize_database(&pool).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), 1);

        let rows: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let pool = memory_pool().await;
        initialize_database(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ('aegis_unread_count', '3', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        initialize_database(&pool).await.unwrap();

        let applied: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, 1);

        let value: String =
            sqlx::query_scalar("SELECT value FROM kv_store WHERE key = 'aegis_unread_count'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value, "3");
    }
}
