//! Document store capability
//!
//! Namespaced get/put/delete of JSON documents. There are no transactions
//! across keys and concurrent writers of the same key are last-write-wins.

mod memory;
mod sqlite;

pub use memory::MemoryDocumentStore;
pub use sqlite::{create_documents_table, SqliteDocumentStore};

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Logical bucket holding catalog pointers and refresh markers
pub const BUCKET_SNAPSHOT: &str = "snapshot";
/// Logical bucket holding playlist definitions
pub const BUCKET_PLAYLISTS: &str = "playlists";

/// Refresh request marker (at most one pending request)
pub const KEY_REFRESH_REQUEST: &str = "catalog_refresh/last";
/// Acknowledgment of the last fully processed marker
pub const KEY_REFRESH_ACK: &str = "catalog_refresh/last_processed";
/// Pointer to the active catalog snapshot
pub const KEY_CURRENT_SNAPSHOT: &str = "current";

/// Live queue projection keys, written by the executor
pub const KEY_LIVE_CURRENT: &str = "current";
pub const KEY_LIVE_ITEMS: &str = "items";

/// Archive key for a snapshot document
pub fn snapshot_key(snapshot_id: &str) -> String {
    format!("snapshots/{}", snapshot_id)
}

/// Key of a playlist definition
pub fn playlist_key(playlist_id: &str) -> String {
    format!("playlists/{}", playlist_id)
}

/// Bucket the executor mirrors a room's queue into
///
/// Owned by the executor, so it is never namespaced.
pub fn live_queue_bucket(channel: &str) -> String {
    format!("kryten_{}_playlist", channel)
}

/// JSON document storage keyed by (bucket, key)
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document; `None` when the key is absent
    async fn get_json(&self, bucket: &str, key: &str) -> Result<Option<Value>>;

    /// Write (or overwrite) a document
    async fn put_json(&self, bucket: &str, key: &str, doc: &Value) -> Result<()>;

    /// Delete a document; deleting an absent key is not an error
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Prefix applied to this service's bucket names
///
/// Several deployments can share one store by using different prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvNamespace {
    prefix: String,
}

impl KvNamespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Physical bucket name for a logical bucket
    pub fn bucket(&self, logical: &str) -> String {
        format!("{}_{}", self.prefix, logical)
    }

    pub fn snapshot_bucket(&self) -> String {
        self.bucket(BUCKET_SNAPSHOT)
    }

    pub fn playlists_bucket(&self) -> String {
        self.bucket(BUCKET_PLAYLISTS)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
