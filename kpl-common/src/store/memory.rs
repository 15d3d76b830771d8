//! In-process document store

use super::DocumentStore;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Document store backed by a HashMap
///
/// Used by tests and single-process setups. Wrap in `Arc` to share between tasks.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<(String, String), Value>>,
    writes: RwLock<Vec<(String, String)>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every (bucket, key) written so far, in write order
    pub async fn write_log(&self) -> Vec<(String, String)> {
        self.writes.read().await.clone()
    }

    /// Number of writes made to one key
    pub async fn write_count(&self, bucket: &str, key: &str) -> usize {
        self.writes
            .read()
            .await
            .iter()
            .filter(|(b, k)| b == bucket && k == key)
            .count()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_json(&self, bucket: &str, key: &str) -> Result<Option<Value>> {
        let docs = self.docs.read().await;
        Ok(docs.get(&(bucket.to_string(), key.to_string())).cloned())
    }

    async fn put_json(&self, bucket: &str, key: &str, doc: &Value) -> Result<()> {
        self.docs
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), doc.clone());
        self.writes.write().await.push((bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.docs
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
