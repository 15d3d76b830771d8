//! Queue gateway: the one capability the reconciler depends on
//!
//! Bundles command publishing, document reads/writes, and the read-only live
//! queue projection behind a single closed interface. Production wiring and
//! test doubles both go through [`StoreGateway`].

use crate::bus::{queue_command_subject, CommandBus, QueueCommand};
use crate::store::{live_queue_bucket, DocumentStore, KEY_LIVE_CURRENT, KEY_LIVE_ITEMS};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// The executor's queue state as mirrored into the document store
///
/// Uids are the executor's own numeric addresses for live items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveQueueProjection {
    /// Uid of the playing item, if the executor reports one
    pub current: Option<i64>,
    /// Uids of every live item, in queue order
    pub items: Vec<i64>,
}

impl LiveQueueProjection {
    /// Build a projection from the raw `current` and `items` documents
    ///
    /// Uids may be JSON numbers or numeric strings. Entries without a usable
    /// uid are skipped, and a `current` document without one counts as absent.
    pub fn from_documents(current: Option<&Value>, items: Option<&Value>) -> Self {
        let current = current.and_then(|doc| doc.get("uid")).and_then(parse_uid);

        let entries = match items {
            Some(Value::Array(entries)) => entries.as_slice(),
            Some(Value::Object(obj)) => obj
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            _ => &[],
        };

        let items = entries
            .iter()
            .filter_map(|entry| {
                let uid = entry.get("uid").and_then(parse_uid);
                if uid.is_none() {
                    warn!(entry = %entry, "Skipping live queue entry without a usable uid");
                }
                uid
            })
            .collect();

        Self { current, items }
    }
}

fn parse_uid(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Closed capability interface used by the reconciliation engine
#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Dispatch a command for a room (fire-and-forget)
    async fn publish_command(&self, channel: &str, command: &QueueCommand) -> Result<()>;

    async fn read_document(&self, bucket: &str, key: &str) -> Result<Option<Value>>;

    async fn write_document(&self, bucket: &str, key: &str, doc: &Value) -> Result<()>;

    /// Read the executor's mirrored queue for a room
    async fn read_live_queue_projection(&self, channel: &str) -> Result<LiveQueueProjection>;
}

/// Gateway over a document store and a command bus
#[derive(Clone)]
pub struct StoreGateway {
    docs: Arc<dyn DocumentStore>,
    bus: Arc<dyn CommandBus>,
}

impl StoreGateway {
    pub fn new(docs: Arc<dyn DocumentStore>, bus: Arc<dyn CommandBus>) -> Self {
        Self { docs, bus }
    }
}

#[async_trait]
impl QueueGateway for StoreGateway {
    async fn publish_command(&self, channel: &str, command: &QueueCommand) -> Result<()> {
        let subject = queue_command_subject(channel);
        let doc = command.to_document()?;
        debug!(subject = %subject, action = command.action(), "Publishing queue command");
        self.bus.publish(&subject, &doc).await
    }

    async fn read_document(&self, bucket: &str, key: &str) -> Result<Option<Value>> {
        self.docs.get_json(bucket, key).await
    }

    async fn write_document(&self, bucket: &str, key: &str, doc: &Value) -> Result<()> {
        self.docs.put_json(bucket, key, doc).await
    }

    async fn read_live_queue_projection(&self, channel: &str) -> Result<LiveQueueProjection> {
        let bucket = live_queue_bucket(channel);
        let current = self.docs.get_json(&bucket, KEY_LIVE_CURRENT).await?;
        let items = self.docs.get_json(&bucket, KEY_LIVE_ITEMS).await?;
        Ok(LiveQueueProjection::from_documents(current.as_ref(), items.as_ref()))
    }
}
