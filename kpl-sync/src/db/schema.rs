//! Catalog table definitions
//!
//! `catalog_item` rows are keyed by `video_id` and tagged with the snapshot
//! generation that wrote them. Categories and tags are normalized by name and
//! linked through join tables.

use kpl_common::Result;
use sqlx::SqlitePool;

/// Create all catalog tables (idempotent)
pub async fn init_catalog_schema(pool: &SqlitePool) -> Result<()> {
    create_catalog_item_table(pool).await?;
    create_catalog_category_tables(pool).await?;
    create_catalog_tag_tables(pool).await?;
    Ok(())
}

async fn create_catalog_item_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_item (
            video_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            duration_seconds INTEGER,
            thumbnail_url TEXT,
            manifest_url TEXT,
            snapshot_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catalog_item_snapshot ON catalog_item(snapshot_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_catalog_category_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_category (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_item_category (
            video_id TEXT NOT NULL REFERENCES catalog_item(video_id) ON DELETE CASCADE,
            category_id INTEGER NOT NULL REFERENCES catalog_category(id) ON DELETE CASCADE,
            PRIMARY KEY (video_id, category_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_catalog_tag_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_tag (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_item_tag (
            video_id TEXT NOT NULL REFERENCES catalog_item(video_id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES catalog_tag(id) ON DELETE CASCADE,
            PRIMARY KEY (video_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
