//! Recording command bus for tests and dry runs

use super::{CommandBus, PublishedCommand};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Command bus that records every publish in order
#[derive(Debug, Default)]
pub struct MemoryCommandBus {
    published: Mutex<Vec<PublishedCommand>>,
    reply: Mutex<Option<Value>>,
    unreachable: Mutex<bool>,
}

impl MemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply returned by `request`
    pub fn set_reply(&self, reply: Value) {
        *lock(&self.reply) = Some(reply);
    }

    /// Make every call fail as if the transport were down
    pub fn set_unreachable(&self, unreachable: bool) {
        *lock(&self.unreachable) = unreachable;
    }

    /// Everything published so far, in publish order
    pub fn published(&self) -> Vec<PublishedCommand> {
        lock(&self.published).clone()
    }

    /// Published command documents, in publish order
    pub fn published_commands(&self) -> Vec<Value> {
        lock(&self.published).iter().map(|p| p.doc.clone()).collect()
    }

    /// The `action` field of every published document
    pub fn actions(&self) -> Vec<String> {
        lock(&self.published)
            .iter()
            .map(|p| p.doc.get("action").and_then(Value::as_str).unwrap_or_default().to_string())
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.published).clear();
    }

    fn check_reachable(&self) -> Result<()> {
        if *lock(&self.unreachable) {
            return Err(Error::Bus("command bus unreachable".to_string()));
        }
        Ok(())
    }
}

// A poisoned lock only means a test panicked mid-publish; keep the data.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CommandBus for MemoryCommandBus {
    async fn publish(&self, subject: &str, doc: &Value) -> Result<()> {
        self.check_reachable()?;
        lock(&self.published).push(PublishedCommand {
            subject: subject.to_string(),
            doc: doc.clone(),
        });
        Ok(())
    }

    async fn request(&self, subject: &str, _doc: &Value, timeout: Duration) -> Result<Value> {
        self.check_reachable()?;
        lock(&self.reply).clone().ok_or_else(|| {
            Error::Bus(format!("no reply on {} within {:?}", subject, timeout))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_in_order() {
        let bus = MemoryCommandBus::new();
        bus.publish("s", &json!({"action": "clear"})).await.unwrap();
        bus.publish("s", &json!({"action": "addvideo", "data": {"id": "u"}})).await.unwrap();

        assert_eq!(bus.actions(), vec!["clear", "addvideo"]);
        assert_eq!(bus.published()[0].subject, "s");
    }

    #[tokio::test]
    async fn test_unreachable_publish_fails() {
        let bus = MemoryCommandBus::new();
        bus.set_unreachable(true);
        assert!(bus.publish("s", &json!({})).await.is_err());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_request_uses_reply() {
        let bus = MemoryCommandBus::new();
        assert!(bus.request("s", &json!({}), Duration::from_millis(10)).await.is_err());

        bus.set_reply(json!({"ok": true}));
        let reply = bus.request("s", &json!({}), Duration::from_millis(10)).await.unwrap();
        assert_eq!(reply, json!({"ok": true}));
    }
}
