//! In-process command bus over a tokio broadcast channel
//!
//! Same shape as an event bus: any number of subscribers each receive every
//! command published after they subscribed. Lagging subscribers lose the
//! oldest commands.

use super::{CommandBus, PublishedCommand};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BroadcastCommandBus {
    tx: broadcast::Sender<PublishedCommand>,
}

impl BroadcastCommandBus {
    /// Create a bus buffering up to `capacity` commands per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future commands
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedCommand> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl CommandBus for BroadcastCommandBus {
    async fn publish(&self, subject: &str, doc: &Value) -> Result<()> {
        let command = PublishedCommand {
            subject: subject.to_string(),
            doc: doc.clone(),
        };

        // Fire-and-forget: nobody listening is not an error
        if self.tx.send(command).is_err() {
            warn!(subject, "Command published with no subscribers");
        }
        Ok(())
    }

    async fn request(&self, subject: &str, _doc: &Value, _timeout: Duration) -> Result<Value> {
        Err(Error::Bus(format!(
            "request/response is not available on the in-process bus (subject {})",
            subject
        )))
    }
}
