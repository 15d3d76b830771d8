//! Command bus speaking HTTP to the executor

use super::CommandBus;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("kpl-sync/", env!("CARGO_PKG_VERSION"));
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs command documents to `{base_url}/{subject}`
#[derive(Debug, Clone)]
pub struct HttpCommandBus {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCommandBus {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Bus(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, subject: &str) -> String {
        format!("{}/{}", self.base_url, subject)
    }

    async fn post(&self, subject: &str, doc: &Value, timeout: Duration) -> Result<reqwest::Response> {
        let url = self.url(subject);
        debug!(url = %url, "Posting command document");

        self.client
            .post(&url)
            .timeout(timeout)
            .json(doc)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| Error::Bus(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl CommandBus for HttpCommandBus {
    async fn publish(&self, subject: &str, doc: &Value) -> Result<()> {
        // Only transport acceptance is checked; the body is ignored
        self.post(subject, doc, PUBLISH_TIMEOUT).await?;
        Ok(())
    }

    async fn request(&self, subject: &str, doc: &Value, timeout: Duration) -> Result<Value> {
        let resp = self.post(subject, doc, timeout).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| Error::Bus(format!("Invalid reply on {}: {}", subject, e)))
    }
}
