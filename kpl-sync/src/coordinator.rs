//! Catalog refresh coordinator
//!
//! Admin tooling writes a request marker to `catalog_refresh/last`. The
//! coordinator polls that document and, for every marker whose
//! `correlation_id` it has not yet seen, runs the refresh pipeline and then
//! writes an ack to `catalog_refresh/last_processed`.
//!
//! Processing is keyed on `correlation_id` only. The last seen id lives in a
//! [`CatalogRefreshWatchState`] owned by the supervising loop. A crash
//! between pipeline completion and the ack write causes the marker to be
//! processed again on restart, which is safe because a rebuild can be
//! repeated.
//!
//! Marker and ack documents are read and written through the
//! [`QueueGateway`], the same capability the reconciler uses.

use crate::catalog::{run_catalog_refresh, Connector};
use async_trait::async_trait;
use kpl_common::gateway::QueueGateway;
use kpl_common::store::{DocumentStore, KvNamespace, KEY_REFRESH_ACK, KEY_REFRESH_REQUEST};
use kpl_common::time::now_rfc3339;
use kpl_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A pending refresh request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequestMarker {
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub requested_at: String,
}

/// Record of the last marker fully processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshAckMarker {
    pub marker: RefreshRequestMarker,
    pub processed_at: String,
}

/// Coordinator state carried between polls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRefreshWatchState {
    pub last_seen_correlation_id: Option<String>,
}

impl CatalogRefreshWatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the state from the stored ack so a restart does not redo the last request
    pub async fn resume_from_ack(gateway: &dyn QueueGateway, namespace: &KvNamespace) -> Result<Self> {
        let ack = gateway
            .read_document(&namespace.snapshot_bucket(), KEY_REFRESH_ACK)
            .await?;

        let last_seen = ack
            .and_then(|doc| serde_json::from_value::<RefreshAckMarker>(doc).ok())
            .map(|ack| ack.marker.correlation_id)
            .filter(|id| !id.is_empty());

        if let Some(id) = &last_seen {
            debug!(correlation_id = %id, "Resuming refresh watcher after last acknowledged request");
        }

        Ok(Self {
            last_seen_correlation_id: last_seen,
        })
    }
}

/// The side effect run for each new refresh request
#[async_trait]
pub trait RefreshTrigger: Send + Sync {
    async fn refresh(&self, marker: &RefreshRequestMarker) -> Result<()>;
}

/// Check the request marker and process it if it is new
///
/// Returns the marker when it was processed, `None` when there was nothing
/// to do. If the trigger fails, neither the ack nor `state` is updated and
/// the error is returned, so the next call retries. A failed ack write is
/// also returned as an error.
pub async fn process_refresh_marker(
    gateway: &dyn QueueGateway,
    namespace: &KvNamespace,
    state: &mut CatalogRefreshWatchState,
    trigger: &dyn RefreshTrigger,
) -> Result<Option<RefreshRequestMarker>> {
    let bucket = namespace.snapshot_bucket();

    let Some(doc) = gateway.read_document(&bucket, KEY_REFRESH_REQUEST).await? else {
        return Ok(None);
    };

    let marker: RefreshRequestMarker = match serde_json::from_value(doc) {
        Ok(marker) => marker,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable refresh request marker");
            return Ok(None);
        }
    };

    if marker.correlation_id.is_empty() {
        warn!(requested_by = %marker.requested_by, "Ignoring refresh request marker without correlation_id");
        return Ok(None);
    }

    if state.last_seen_correlation_id.as_deref() == Some(marker.correlation_id.as_str()) {
        return Ok(None);
    }

    info!(
        correlation_id = %marker.correlation_id,
        requested_by = %marker.requested_by,
        "Processing catalog refresh request"
    );

    trigger.refresh(&marker).await?;

    let ack = RefreshAckMarker {
        marker: marker.clone(),
        processed_at: now_rfc3339(),
    };
    gateway
        .write_document(&bucket, KEY_REFRESH_ACK, &serde_json::to_value(&ack)?)
        .await?;

    state.last_seen_correlation_id = Some(marker.correlation_id.clone());

    info!(correlation_id = %marker.correlation_id, "Catalog refresh request acknowledged");

    Ok(Some(marker))
}

/// Production trigger: runs the catalog refresh pipeline
pub struct CatalogRefresher {
    pub connector: Arc<dyn Connector>,
    pub pool: SqlitePool,
    pub store: Arc<dyn DocumentStore>,
    pub namespace: KvNamespace,
    pub manifest_base_url: Option<String>,
}

#[async_trait]
impl RefreshTrigger for CatalogRefresher {
    async fn refresh(&self, marker: &RefreshRequestMarker) -> Result<()> {
        let notes = format!(
            "requested by {} ({})",
            marker.requested_by, marker.correlation_id
        );
        run_catalog_refresh(
            self.connector.as_ref(),
            &self.pool,
            self.store.as_ref(),
            &self.namespace,
            self.manifest_base_url.as_deref(),
            self.connector.name(),
            Some(&notes),
        )
        .await?;
        Ok(())
    }
}

/// Poll for refresh requests until `cancel` fires
///
/// Errors from a single poll are logged and the loop keeps going. Returns
/// the final state.
pub async fn run_refresh_watcher(
    gateway: Arc<dyn QueueGateway>,
    namespace: KvNamespace,
    trigger: Arc<dyn RefreshTrigger>,
    interval: Duration,
    cancel: CancellationToken,
) -> CatalogRefreshWatchState {
    let mut state = match CatalogRefreshWatchState::resume_from_ack(gateway.as_ref(), &namespace).await {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "Could not read refresh ack, starting with empty state");
            CatalogRefreshWatchState::new()
        }
    };

    info!(
        bucket = %namespace.snapshot_bucket(),
        interval_secs = interval.as_secs_f64(),
        "Catalog refresh watcher started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Catalog refresh watcher stopping");
                break;
            }
            _ = ticker.tick() => {
                match process_refresh_marker(gateway.as_ref(), &namespace, &mut state, trigger.as_ref()).await {
                    Ok(Some(marker)) => debug!(correlation_id = %marker.correlation_id, "Refresh request handled"),
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Catalog refresh request failed, will retry"),
                }
            }
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpl_common::bus::{MemoryCommandBus, QueueCommand};
    use kpl_common::gateway::{LiveQueueProjection, StoreGateway};
    use kpl_common::store::MemoryDocumentStore;
    use kpl_common::Error;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingTrigger {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl RefreshTrigger for CountingTrigger {
        async fn refresh(&self, _marker: &RefreshRequestMarker) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::other("connection reset")));
            }
            Ok(())
        }
    }

    fn fixture() -> (Arc<MemoryDocumentStore>, StoreGateway) {
        let store = Arc::new(MemoryDocumentStore::new());
        let gateway = StoreGateway::new(store.clone(), Arc::new(MemoryCommandBus::new()));
        (store, gateway)
    }

    /// Gateway that records every document access before delegating
    struct RecordingGateway {
        inner: StoreGateway,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueueGateway for RecordingGateway {
        async fn publish_command(&self, channel: &str, command: &QueueCommand) -> Result<()> {
            self.inner.publish_command(channel, command).await
        }

        async fn read_document(&self, bucket: &str, key: &str) -> Result<Option<Value>> {
            self.log.lock().unwrap().push(format!("read {}/{}", bucket, key));
            self.inner.read_document(bucket, key).await
        }

        async fn write_document(&self, bucket: &str, key: &str, doc: &Value) -> Result<()> {
            self.log.lock().unwrap().push(format!("write {}/{}", bucket, key));
            self.inner.write_document(bucket, key, doc).await
        }

        async fn read_live_queue_projection(&self, channel: &str) -> Result<LiveQueueProjection> {
            self.inner.read_live_queue_projection(channel).await
        }
    }

    async fn write_marker(store: &MemoryDocumentStore, correlation_id: &str) {
        store
            .put_json(
                "test_snapshot",
                KEY_REFRESH_REQUEST,
                &json!({
                    "requested_by": "admin",
                    "correlation_id": correlation_id,
                    "requested_at": "2024-01-01T00:00:00Z"
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_marker_is_noop() {
        let (_store, gateway) = fixture();
        let trigger = CountingTrigger::default();
        let mut state = CatalogRefreshWatchState::new();

        let result = process_refresh_marker(&gateway, &KvNamespace::new("test"), &mut state, &trigger)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_marker_processed_once_then_none() {
        let (store, gateway) = fixture();
        let ns = KvNamespace::new("test");
        let trigger = CountingTrigger::default();
        let mut state = CatalogRefreshWatchState::new();
        write_marker(&store, "abc").await;

        let first = process_refresh_marker(&gateway, &ns, &mut state, &trigger).await.unwrap();
        assert_eq!(first.unwrap().correlation_id, "abc");

        let second = process_refresh_marker(&gateway, &ns, &mut state, &trigger).await.unwrap();
        assert!(second.is_none());

        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.write_count("test_snapshot", KEY_REFRESH_ACK).await, 1);

        let ack = store.get_json("test_snapshot", KEY_REFRESH_ACK).await.unwrap().unwrap();
        assert_eq!(ack["marker"]["correlation_id"], "abc");
        assert!(ack["processed_at"].is_string());
        assert_eq!(state.last_seen_correlation_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_marker_and_ack_go_through_gateway() {
        let (store, inner) = fixture();
        let gateway = RecordingGateway {
            inner,
            log: Mutex::new(Vec::new()),
        };
        let ns = KvNamespace::new("test");
        let trigger = CountingTrigger::default();
        write_marker(&store, "abc").await;

        let mut state = CatalogRefreshWatchState::resume_from_ack(&gateway, &ns).await.unwrap();
        process_refresh_marker(&gateway, &ns, &mut state, &trigger).await.unwrap();

        assert_eq!(
            *gateway.log.lock().unwrap(),
            vec![
                "read test_snapshot/catalog_refresh/last_processed",
                "read test_snapshot/catalog_refresh/last",
                "write test_snapshot/catalog_refresh/last_processed",
            ]
        );
    }

    #[tokio::test]
    async fn test_new_correlation_id_is_processed() {
        let (store, gateway) = fixture();
        let ns = KvNamespace::new("test");
        let trigger = CountingTrigger::default();
        let mut state = CatalogRefreshWatchState::new();

        write_marker(&store, "one").await;
        process_refresh_marker(&gateway, &ns, &mut state, &trigger).await.unwrap();
        write_marker(&store, "two").await;
        let processed = process_refresh_marker(&gateway, &ns, &mut state, &trigger).await.unwrap();

        assert_eq!(processed.unwrap().correlation_id, "two");
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pipeline_failure_writes_no_ack_and_retries() {
        let (store, gateway) = fixture();
        let ns = KvNamespace::new("test");
        let trigger = CountingTrigger::default();
        trigger.fail.store(true, Ordering::SeqCst);
        let mut state = CatalogRefreshWatchState::new();
        write_marker(&store, "abc").await;

        let result = process_refresh_marker(&gateway, &ns, &mut state, &trigger).await;
        assert!(result.is_err());
        assert!(state.last_seen_correlation_id.is_none());
        assert_eq!(store.write_count("test_snapshot", KEY_REFRESH_ACK).await, 0);

        trigger.fail.store(false, Ordering::SeqCst);
        let retried = process_refresh_marker(&gateway, &ns, &mut state, &trigger).await.unwrap();
        assert!(retried.is_some());
        assert_eq!(store.write_count("test_snapshot", KEY_REFRESH_ACK).await, 1);
    }

    #[tokio::test]
    async fn test_marker_without_correlation_id_is_ignored() {
        let (store, gateway) = fixture();
        let trigger = CountingTrigger::default();
        let mut state = CatalogRefreshWatchState::new();
        store
            .put_json("test_snapshot", KEY_REFRESH_REQUEST, &json!({"requested_by": "admin"}))
            .await
            .unwrap();

        let result = process_refresh_marker(&gateway, &KvNamespace::new("test"), &mut state, &trigger)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resume_from_ack_skips_acknowledged_marker() {
        let (store, gateway) = fixture();
        let ns = KvNamespace::new("test");
        let trigger = CountingTrigger::default();
        write_marker(&store, "abc").await;

        let mut state = CatalogRefreshWatchState::new();
        process_refresh_marker(&gateway, &ns, &mut state, &trigger).await.unwrap();

        // Simulated restart after the ack was written
        let mut resumed = CatalogRefreshWatchState::resume_from_ack(&gateway, &ns).await.unwrap();
        assert_eq!(resumed.last_seen_correlation_id.as_deref(), Some("abc"));

        let result = process_refresh_marker(&gateway, &ns, &mut resumed, &trigger).await.unwrap();
        assert!(result.is_none());
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watcher_processes_marker_and_stops_on_cancel() {
        let (store, gateway) = fixture();
        let trigger = Arc::new(CountingTrigger::default());
        write_marker(&store, "watch-1").await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_refresh_watcher(
            Arc::new(gateway),
            KvNamespace::new("test"),
            trigger.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        for _ in 0..100 {
            if store.write_count("test_snapshot", KEY_REFRESH_ACK).await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        let state = handle.await.unwrap();
        assert_eq!(state.last_seen_correlation_id.as_deref(), Some("watch-1"));
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
    }
}
