//! Document store persisted in a SQLite table

use super::DocumentStore;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

/// Document store over a `documents(bucket, key, value, updated_at)` table
///
/// Writes are upserts, so the last writer of a key wins.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Wrap a pool, creating the documents table if needed
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        create_documents_table(&pool).await?;
        Ok(Self { pool })
    }
}

/// Create the documents table (idempotent)
pub async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            bucket TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (bucket, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_json(&self, bucket: &str, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM documents WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn put_json(&self, bucket: &str, key: &str, doc: &Value) -> Result<()> {
        let raw = serde_json::to_string(doc)?;

        sqlx::query(
            r#"
            INSERT INTO documents (bucket, key, value, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(bucket, key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteDocumentStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        SqliteDocumentStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_and_overwrite() {
        let store = store().await;
        assert!(store.get_json("b", "k").await.unwrap().is_none());

        store.put_json("b", "k", &json!({"v": 1})).await.unwrap();
        store.put_json("b", "k", &json!({"v": 2})).await.unwrap();
        assert_eq!(store.get_json("b", "k").await.unwrap(), Some(json!({"v": 2})));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let store = store().await;
        store.delete("b", "missing").await.unwrap();

        store.put_json("b", "k", &json!([1, 2])).await.unwrap();
        store.delete("b", "k").await.unwrap();
        assert!(store.get_json("b", "k").await.unwrap().is_none());
    }
}
