use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use super::KvStore;
use crate::{Error, Result};

fn store_error(e: sqlx::Error) -> Error {
    Error::Store(format!("sqlite: {}", e))
}

/// A `kv` table in SQLite.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(store_error)?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(|r| r.0))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        // substr instead of LIKE: LIKE is case-insensitive and treats % and _ as wildcards
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT key FROM kv
            WHERE substr(key, 1, ?) = ?
            ORDER BY key
            "#,
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let current = self.get(key).await?;
        if let Some(value) = &current {
            if value.parse::<i64>().is_err() {
                return Err(Error::Store(format!("Value at {} is not an integer", key)));
            }
        }

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO kv (key, value)
            VALUES (?, '1')
            ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
            RETURNING CAST(value AS INTEGER)
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.0)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
