//! Command bus capability
//!
//! Fire-and-forget publish of command documents to the external executor,
//! plus an occasional request/response call for control tooling. A
//! successful publish means "dispatched", never "applied".

mod broadcast;
mod http;
mod memory;

pub use broadcast::BroadcastCommandBus;
pub use http::HttpCommandBus;
pub use memory::MemoryCommandBus;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Subject the executor listens on for a room's queue commands
pub fn queue_command_subject(channel: &str) -> String {
    format!("kryten.commands.cytube.{}.playlist", channel)
}

/// A queue mutation understood by the executor
///
/// Serializes to the executor's wire documents:
/// `{"action":"clear"}`, `{"action":"rmvideo","data":{"uid":N}}`,
/// `{"action":"addvideo","data":{"id":URL}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum QueueCommand {
    /// Remove every item from the live queue
    #[serde(rename = "clear")]
    Clear,
    /// Remove one live item by its executor uid
    #[serde(rename = "rmvideo")]
    RemoveVideo { uid: i64 },
    /// Append a media item, addressed by its manifest URL
    #[serde(rename = "addvideo")]
    AddVideo { id: String },
}

impl QueueCommand {
    /// Wire action name
    pub fn action(&self) -> &'static str {
        match self {
            QueueCommand::Clear => "clear",
            QueueCommand::RemoveVideo { .. } => "rmvideo",
            QueueCommand::AddVideo { .. } => "addvideo",
        }
    }

    /// Destructive commands must be dispatched before any additive one
    pub fn is_destructive(&self) -> bool {
        !matches!(self, QueueCommand::AddVideo { .. })
    }

    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Publish/request transport to the external executor
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Dispatch a command document without awaiting its effect
    async fn publish(&self, subject: &str, doc: &Value) -> Result<()>;

    /// Send a document and wait (bounded by `timeout`) for the reply document
    async fn request(&self, subject: &str, doc: &Value, timeout: Duration) -> Result<Value>;
}

/// One published command as seen by a subscriber or a test
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedCommand {
    pub subject: String,
    pub doc: Value,
}
