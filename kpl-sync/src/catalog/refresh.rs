//! Catalog refresh pipeline
//!
//! Rebuilds the catalog from a connector, then publishes the resulting
//! snapshot as two documents: the `snapshots/{id}` archive and the `current`
//! pointer. The archive is written first so `current` never names a snapshot
//! without an archive entry.

use super::{rebuild_catalog, Connector, Snapshot};
use kpl_common::store::{snapshot_key, DocumentStore, KvNamespace, KEY_CURRENT_SNAPSHOT};
use kpl_common::time::{now, to_rfc3339};
use kpl_common::Result;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// New snapshot id: UTC timestamp plus a random suffix, e.g. `20240101T120000Z-1a2b3c4d`
pub fn new_snapshot_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Run one full refresh: rebuild, then write the snapshot documents
///
/// A rebuild failure returns before any document is written, so the
/// previous `current` pointer stays in place.
pub async fn run_catalog_refresh(
    connector: &dyn Connector,
    pool: &SqlitePool,
    store: &dyn DocumentStore,
    namespace: &KvNamespace,
    manifest_base_url: Option<&str>,
    source: &str,
    notes: Option<&str>,
) -> Result<Snapshot> {
    let snapshot_id = new_snapshot_id();
    info!(
        snapshot_id = %snapshot_id,
        connector = connector.name(),
        source,
        "Running catalog refresh"
    );

    let item_count = rebuild_catalog(pool, connector.iter_items(), &snapshot_id, manifest_base_url).await?;

    let snapshot = Snapshot {
        snapshot_id: snapshot_id.clone(),
        created_at: to_rfc3339(now()),
        source: source.to_string(),
        item_count,
        notes: notes.map(str::to_string),
    };

    let doc = serde_json::to_value(&snapshot)?;
    let bucket = namespace.snapshot_bucket();
    store.put_json(&bucket, &snapshot_key(&snapshot_id), &doc).await?;
    store.put_json(&bucket, KEY_CURRENT_SNAPSHOT, &doc).await?;

    info!(snapshot_id = %snapshot_id, item_count, "Catalog snapshot is now current");

    Ok(snapshot)
}
