//! Catalog generation replace
//!
//! A rebuild drains one connector sequence into the catalog tables inside a
//! single transaction, tagging every row with the new snapshot id, then
//! deletes every row of any other snapshot before committing. Readers see
//! either the previous generation or the new one, never a mix. If anything
//! fails before commit the transaction is rolled back and the previous
//! generation stays intact.

use super::{catalog_manifest_url, ConnectorItem, ItemStream};
use futures::StreamExt;
use kpl_common::time::now_rfc3339;
use kpl_common::{Error, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Name tables that items link to
#[derive(Debug, Clone, Copy)]
enum NameTable {
    Category,
    Tag,
}

impl NameTable {
    fn table(self) -> &'static str {
        match self {
            NameTable::Category => "catalog_category",
            NameTable::Tag => "catalog_tag",
        }
    }

    fn link_table(self) -> &'static str {
        match self {
            NameTable::Category => "catalog_item_category",
            NameTable::Tag => "catalog_item_tag",
        }
    }

    fn link_column(self) -> &'static str {
        match self {
            NameTable::Category => "category_id",
            NameTable::Tag => "tag_id",
        }
    }
}

/// Replace the live catalog generation with the items of `items`
///
/// The sequence is drained completely before the cut-over commits and cannot
/// be iterated again. A transport error from the connector ends the sequence:
/// the rebuild proceeds with the items collected so far.
///
/// `manifest_base_url` of `None` leaves `manifest_url` unset; resolvers then
/// derive it from their own configured base.
///
/// `snapshot_id` must be new: an id already present in the catalog is
/// rejected with [`Error::InvalidInput`] before anything is written.
///
/// Returns the number of distinct items in the new generation.
pub async fn rebuild_catalog(
    pool: &SqlitePool,
    items: ItemStream,
    snapshot_id: &str,
    manifest_base_url: Option<&str>,
) -> Result<u64> {
    info!(snapshot_id, "Starting catalog rebuild");

    let mut tx = pool.begin().await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_item WHERE snapshot_id = ?")
        .bind(snapshot_id)
        .fetch_one(&mut *tx)
        .await?;
    if existing > 0 {
        return Err(Error::InvalidInput(format!(
            "snapshot id {} is already in the catalog",
            snapshot_id
        )));
    }

    let created_at = now_rfc3339();
    let mut seen: HashSet<String> = HashSet::new();
    let mut items = items;

    while let Some(next) = items.next().await {
        let item = match next {
            Ok(item) => item,
            Err(e) => {
                warn!(
                    snapshot_id,
                    collected = seen.len(),
                    error = %e,
                    "Connector failed mid-sequence, rebuilding with partial item set"
                );
                break;
            }
        };

        if item.video_id.trim().is_empty() {
            warn!(title = %item.title, "Skipping connector item without video_id");
            continue;
        }

        let manifest_url = manifest_base_url.map(|base| catalog_manifest_url(base, &item.video_id));
        insert_item(&mut tx, &item, snapshot_id, manifest_url.as_deref(), &created_at).await?;
        link_names(&mut tx, &item.video_id, &item.categories, NameTable::Category).await?;
        link_names(&mut tx, &item.video_id, &item.tags, NameTable::Tag).await?;

        debug!(video_id = %item.video_id, "Ingested catalog item");
        seen.insert(item.video_id);
    }

    let removed = delete_other_snapshots(&mut tx, snapshot_id).await?;
    delete_orphan_names(&mut tx, NameTable::Category).await?;
    delete_orphan_names(&mut tx, NameTable::Tag).await?;

    tx.commit().await?;

    let count = seen.len() as u64;
    info!(snapshot_id, items = count, removed, "Catalog rebuild committed");

    Ok(count)
}

/// Upsert one item row into the new generation
///
/// An existing row with the same `video_id` is taken over by the new snapshot
/// and its links are rebuilt from scratch.
async fn insert_item(
    tx: &mut Transaction<'_, Sqlite>,
    item: &ConnectorItem,
    snapshot_id: &str,
    manifest_url: Option<&str>,
    created_at: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO catalog_item (
            video_id, title, duration_seconds, thumbnail_url, manifest_url, snapshot_id, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(video_id) DO UPDATE SET
            title = excluded.title,
            duration_seconds = excluded.duration_seconds,
            thumbnail_url = excluded.thumbnail_url,
            manifest_url = excluded.manifest_url,
            snapshot_id = excluded.snapshot_id,
            created_at = excluded.created_at
        "#,
    )
    .bind(&item.video_id)
    .bind(&item.title)
    .bind(item.duration_seconds)
    .bind(&item.thumbnail_url)
    .bind(manifest_url)
    .bind(snapshot_id)
    .bind(created_at)
    .execute(&mut **tx)
    .await?;

    for table in [NameTable::Category, NameTable::Tag] {
        sqlx::query(&format!("DELETE FROM {} WHERE video_id = ?", table.link_table()))
            .bind(&item.video_id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Upsert names by value and link them to an item
async fn link_names(
    tx: &mut Transaction<'_, Sqlite>,
    video_id: &str,
    names: &[String],
    table: NameTable,
) -> Result<()> {
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        sqlx::query(&format!(
            "INSERT INTO {} (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            table.table()
        ))
        .bind(name)
        .execute(&mut **tx)
        .await?;

        let id: i64 = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE name = ?", table.table()))
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;

        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (video_id, {}) VALUES (?, ?)",
            table.link_table(),
            table.link_column()
        ))
        .bind(video_id)
        .bind(id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Delete every row not belonging to `snapshot_id`; returns items removed
async fn delete_other_snapshots(tx: &mut Transaction<'_, Sqlite>, snapshot_id: &str) -> Result<u64> {
    // Links first, so this holds with or without foreign key enforcement
    for table in [NameTable::Category, NameTable::Tag] {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE video_id IN (SELECT video_id FROM catalog_item WHERE snapshot_id != ?)",
            table.link_table()
        ))
        .bind(snapshot_id)
        .execute(&mut **tx)
        .await?;
    }

    let result = sqlx::query("DELETE FROM catalog_item WHERE snapshot_id != ?")
        .bind(snapshot_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

async fn delete_orphan_names(tx: &mut Transaction<'_, Sqlite>, table: NameTable) -> Result<()> {
    sqlx::query(&format!(
        "DELETE FROM {} WHERE id NOT IN (SELECT {} FROM {})",
        table.table(),
        table.link_column(),
        table.link_table()
    ))
    .execute(&mut **tx)
    .await?;

    Ok(())
}
