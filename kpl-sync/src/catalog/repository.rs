//! Read access to the live catalog generation

use super::CatalogItemRef;
use kpl_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Aggregate numbers for the live generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub items: i64,
    pub categories: i64,
    pub total_duration_seconds: i64,
    /// Distinct snapshot ids present; exactly one after any committed rebuild
    pub snapshot_ids: Vec<String>,
}

/// Catalog queries used by playlist resolution and the CLI
#[derive(Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up one item by `video_id`, with its category names
    pub async fn find_item(&self, video_id: &str) -> Result<Option<CatalogItemRef>> {
        let row = sqlx::query(
            r#"
            SELECT video_id, title, duration_seconds, manifest_url, snapshot_id
            FROM catalog_item
            WHERE video_id = ?
            "#,
        )
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let categories: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT c.name
            FROM catalog_item_category ic
            JOIN catalog_category c ON c.id = ic.category_id
            WHERE ic.video_id = ?
            ORDER BY c.name
            "#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(CatalogItemRef {
            video_id: row.get("video_id"),
            title: row.get("title"),
            categories,
            duration_seconds: row.get("duration_seconds"),
            manifest_url: row.get("manifest_url"),
            snapshot_id: row.get("snapshot_id"),
        }))
    }

    pub async fn count_items(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_item")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn stats(&self) -> Result<CatalogStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS items, COALESCE(SUM(duration_seconds), 0) AS total_duration
            FROM catalog_item
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_category")
            .fetch_one(&self.pool)
            .await?;

        let snapshot_ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT snapshot_id FROM catalog_item ORDER BY snapshot_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(CatalogStats {
            items: row.get("items"),
            categories,
            total_duration_seconds: row.get("total_duration"),
            snapshot_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::connector::{Connector, StaticConnector};
    use crate::catalog::rebuild_catalog;
    use crate::db::schema::init_catalog_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn seeded_repository() -> CatalogRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_catalog_schema(&pool).await.unwrap();
        rebuild_catalog(
            &pool,
            StaticConnector::sample().iter_items(),
            "snap1",
            Some("https://m.example.com"),
        )
        .await
        .unwrap();
        CatalogRepository::new(pool)
    }

    #[tokio::test]
    async fn test_find_item() {
        let repo = seeded_repository().await;

        let item = repo.find_item("v3").await.unwrap().unwrap();
        assert_eq!(item.title, "The Thing");
        assert_eq!(item.categories, vec!["Horror", "Sci-Fi"]);
        assert_eq!(item.duration_seconds, Some(109 * 60));
        assert_eq!(item.snapshot_id, "snap1");
        assert_eq!(
            item.manifest_url.as_deref(),
            Some("https://m.example.com/api/v1/media/cytube/v3.json?format=json")
        );

        assert!(repo.find_item("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let repo = seeded_repository().await;

        assert_eq!(repo.count_items().await.unwrap(), 3);

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.items, 3);
        assert_eq!(stats.categories, 2);
        assert_eq!(stats.total_duration_seconds, (96 + 98 + 109) * 60);
        assert_eq!(stats.snapshot_ids, vec!["snap1"]);
    }

    #[tokio::test]
    async fn test_stats_on_empty_catalog() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_catalog_schema(&pool).await.unwrap();

        let stats = CatalogRepository::new(pool).stats().await.unwrap();
        assert_eq!(stats, CatalogStats::default());
    }
}
