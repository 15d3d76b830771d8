//! Test Helper Utilities
//!
//! Shared fixtures for kpl-sync integration tests: a single-connection
//! in-memory catalog, in-memory document store and command bus, and a
//! reconciler wired over them.

#![allow(dead_code)]

use kpl_common::bus::MemoryCommandBus;
use kpl_common::gateway::StoreGateway;
use kpl_common::store::{KvNamespace, MemoryDocumentStore};
use kpl_sync::admin::put_playlist;
use kpl_sync::catalog::connector::StaticConnector;
use kpl_sync::catalog::{rebuild_catalog, CatalogRepository, Connector, ConnectorItem};
use kpl_sync::db::schema::init_catalog_schema;
use kpl_sync::reconcile::{PlaylistDefinition, PlaylistItem, Reconciler};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub const NAMESPACE: &str = "test";
pub const CHANNEL: &str = "lounge";
pub const MANIFEST_BASE: &str = "https://media.example.com";

/// Everything a reconciliation or refresh test needs
pub struct TestEnv {
    pub pool: SqlitePool,
    pub store: Arc<MemoryDocumentStore>,
    pub bus: Arc<MemoryCommandBus>,
    pub namespace: KvNamespace,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self {
            pool: create_test_pool().await,
            store: Arc::new(MemoryDocumentStore::new()),
            bus: Arc::new(MemoryCommandBus::new()),
            namespace: KvNamespace::new(NAMESPACE),
        }
    }

    /// Same as `new`, with the three-item sample catalog loaded
    pub async fn with_sample_catalog() -> Self {
        let env = Self::new().await;
        env.load_catalog(&StaticConnector::sample(), "seed").await;
        env
    }

    pub async fn load_catalog(&self, connector: &dyn Connector, snapshot_id: &str) -> u64 {
        rebuild_catalog(&self.pool, connector.iter_items(), snapshot_id, Some(MANIFEST_BASE))
            .await
            .expect("Catalog rebuild should succeed")
    }

    /// Gateway over this environment's store and bus
    pub fn gateway(&self) -> Arc<StoreGateway> {
        Arc::new(StoreGateway::new(self.store.clone(), self.bus.clone()))
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.gateway(),
            CatalogRepository::new(self.pool.clone()),
            self.namespace.clone(),
            MANIFEST_BASE,
        )
    }

    pub async fn store_playlist(&self, id: &str, video_ids: &[&str]) {
        let playlist = PlaylistDefinition {
            id: id.to_string(),
            items: video_ids.iter().map(|v| PlaylistItem::new(*v)).collect(),
        };
        put_playlist(self.store.as_ref(), &self.namespace, &playlist)
            .await
            .expect("Storing playlist should succeed");
    }

    /// Write the executor's live queue projection for `CHANNEL`
    pub async fn set_live_queue(&self, current: Option<i64>, uids: &[i64]) {
        use kpl_common::store::DocumentStore;

        let bucket = format!("kryten_{}_playlist", CHANNEL);
        if let Some(uid) = current {
            self.store
                .put_json(&bucket, "current", &json!({"uid": uid}))
                .await
                .unwrap();
        }
        let items: Vec<_> = uids.iter().map(|uid| json!({"uid": uid})).collect();
        self.store.put_json(&bucket, "items", &json!(items)).await.unwrap();
    }
}

/// In-memory catalog database; one connection so every query sees the same data
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_catalog_schema(&pool).await.expect("Schema init should succeed");
    pool
}

/// Manifest URL the sample catalog stores for `video_id`
pub fn manifest_url(video_id: &str) -> String {
    format!("{}/api/v1/media/cytube/{}.json?format=json", MANIFEST_BASE, video_id)
}

pub fn item(video_id: &str, title: &str) -> ConnectorItem {
    ConnectorItem::new(video_id, title)
}
