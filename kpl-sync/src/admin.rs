//! Admin-side document writes and reads
//!
//! These are the operations surrounding tooling performs against the
//! document store: requesting a refresh, publishing a playlist definition,
//! and inspecting the pointer documents.

use crate::catalog::Snapshot;
use crate::coordinator::{RefreshAckMarker, RefreshRequestMarker};
use crate::reconcile::PlaylistDefinition;
use kpl_common::store::{
    playlist_key, DocumentStore, KvNamespace, KEY_CURRENT_SNAPSHOT, KEY_REFRESH_ACK, KEY_REFRESH_REQUEST,
};
use kpl_common::time::now_rfc3339;
use kpl_common::{Error, Result};
use tracing::{info, warn};
use uuid::Uuid;

/// Write a refresh request marker, overwriting any pending one
///
/// A correlation id is generated when none is given.
pub async fn record_catalog_refresh_request(
    store: &dyn DocumentStore,
    namespace: &KvNamespace,
    requested_by: &str,
    correlation_id: Option<&str>,
) -> Result<RefreshRequestMarker> {
    let requested_by = requested_by.trim();
    if requested_by.is_empty() {
        return Err(Error::InvalidInput("requested_by must not be empty".to_string()));
    }

    let correlation_id = match correlation_id.map(str::trim) {
        Some("") => return Err(Error::InvalidInput("correlation_id must not be empty".to_string())),
        Some(id) => id.to_string(),
        None => Uuid::new_v4().to_string(),
    };

    let marker = RefreshRequestMarker {
        requested_by: requested_by.to_string(),
        correlation_id,
        requested_at: now_rfc3339(),
    };

    store
        .put_json(
            &namespace.snapshot_bucket(),
            KEY_REFRESH_REQUEST,
            &serde_json::to_value(&marker)?,
        )
        .await?;

    info!(
        correlation_id = %marker.correlation_id,
        requested_by = %marker.requested_by,
        "Catalog refresh requested"
    );

    Ok(marker)
}

/// Store a playlist definition at `playlists/{id}`
pub async fn put_playlist(
    store: &dyn DocumentStore,
    namespace: &KvNamespace,
    playlist: &PlaylistDefinition,
) -> Result<()> {
    if playlist.id.trim().is_empty() {
        return Err(Error::InvalidInput("playlist id must not be empty".to_string()));
    }

    store
        .put_json(
            &namespace.playlists_bucket(),
            &playlist_key(&playlist.id),
            &serde_json::to_value(playlist)?,
        )
        .await?;

    info!(playlist_id = %playlist.id, items = playlist.items.len(), "Stored playlist definition");
    Ok(())
}

/// The last acknowledged refresh request, if any
pub async fn last_processed_refresh(
    store: &dyn DocumentStore,
    namespace: &KvNamespace,
) -> Result<Option<RefreshAckMarker>> {
    let doc = store.get_json(&namespace.snapshot_bucket(), KEY_REFRESH_ACK).await?;
    Ok(doc.map(serde_json::from_value).transpose()?)
}

/// The snapshot the `current` pointer names, if any
pub async fn current_snapshot(store: &dyn DocumentStore, namespace: &KvNamespace) -> Result<Option<Snapshot>> {
    let Some(doc) = store.get_json(&namespace.snapshot_bucket(), KEY_CURRENT_SNAPSHOT).await? else {
        return Ok(None);
    };

    match serde_json::from_value(doc) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            warn!(error = %e, "Current snapshot pointer is unreadable");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::PlaylistItem;
    use kpl_common::store::MemoryDocumentStore;

    #[tokio::test]
    async fn test_record_refresh_request_generates_correlation_id() {
        let store = MemoryDocumentStore::new();
        let ns = KvNamespace::new("test");

        let marker = record_catalog_refresh_request(&store, &ns, " admin ", None).await.unwrap();
        assert_eq!(marker.requested_by, "admin");
        assert!(Uuid::parse_str(&marker.correlation_id).is_ok());

        let stored = store
            .get_json("test_snapshot", KEY_REFRESH_REQUEST)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["correlation_id"], marker.correlation_id.as_str());
    }

    #[tokio::test]
    async fn test_record_refresh_request_keeps_given_id() {
        let store = MemoryDocumentStore::new();
        let ns = KvNamespace::new("test");

        let marker = record_catalog_refresh_request(&store, &ns, "cli", Some("req-42"))
            .await
            .unwrap();
        assert_eq!(marker.correlation_id, "req-42");
    }

    #[tokio::test]
    async fn test_record_refresh_request_rejects_blank_fields() {
        let store = MemoryDocumentStore::new();
        let ns = KvNamespace::new("test");

        assert!(matches!(
            record_catalog_refresh_request(&store, &ns, "  ", None).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            record_catalog_refresh_request(&store, &ns, "admin", Some(" ")).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(store.write_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_put_playlist() {
        let store = MemoryDocumentStore::new();
        let ns = KvNamespace::new("test");
        let playlist = PlaylistDefinition {
            id: "p1".to_string(),
            items: vec![PlaylistItem::new("v1"), PlaylistItem::new("v2")],
        };

        put_playlist(&store, &ns, &playlist).await.unwrap();

        let stored = store.get_json("test_playlists", "playlists/p1").await.unwrap().unwrap();
        assert_eq!(stored["items"][1]["video_id"], "v2");
    }

    #[tokio::test]
    async fn test_pointer_reads_when_absent() {
        let store = MemoryDocumentStore::new();
        let ns = KvNamespace::new("test");

        assert!(last_processed_refresh(&store, &ns).await.unwrap().is_none());
        assert!(current_snapshot(&store, &ns).await.unwrap().is_none());
    }
}
