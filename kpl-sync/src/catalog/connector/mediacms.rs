//! MediaCMS API connector
//!
//! Reads `/api/v1/categories` once to map category ids to titles, then pages
//! through `/api/v1/media?page=N`. Both a bare JSON list and the paginated
//! `{results, next}` envelope are accepted.
//!
//! The sequence stops on an empty page, an envelope whose `next` is null or
//! missing, or the first HTTP/parse error (which is yielded as the final
//! element).

use super::{Connector, ConnectorError, ItemStream};
use crate::catalog::ConnectorItem;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("kpl-sync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard stop for servers that never return an empty page
const MAX_PAGES: u32 = 10_000;

/// Connector for a MediaCMS instance
#[derive(Debug, Clone)]
pub struct MediaCmsConnector {
    client: reqwest::Client,
    base_url: String,
}

impl MediaCmsConnector {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConnectorError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Connector for MediaCmsConnector {
    fn name(&self) -> &str {
        "mediacms"
    }

    fn iter_items(&self) -> ItemStream {
        let client = self.client.clone();
        let base_url = self.base_url.clone();

        async_stream::stream! {
            let categories = match fetch_json(&client, &format!("{}/api/v1/categories", base_url)).await {
                Ok(body) => parse_categories(&body),
                Err(e) => {
                    warn!(error = %e, "Category lookup failed, continuing with embedded names only");
                    HashMap::new()
                }
            };

            let mut total = 0usize;
            for page in 1..=MAX_PAGES {
                let url = format!("{}/api/v1/media?page={}", base_url, page);
                let body = match fetch_json(&client, &url).await {
                    Ok(body) => body,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                let parsed = parse_media_page(&body, &categories);
                debug!(page, items = parsed.items.len(), "Fetched media page");
                if parsed.items.is_empty() {
                    break;
                }

                total += parsed.items.len();
                for item in parsed.items {
                    yield Ok(item);
                }

                if !parsed.has_more {
                    break;
                }
            }

            info!(items = total, "MediaCMS listing finished");
        }
        .boxed()
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value, ConnectorError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ConnectorError::Network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(ConnectorError::Api(status.as_u16(), text));
    }

    resp.json::<Value>()
        .await
        .map_err(|e| ConnectorError::Parse(format!("{}: {}", url, e)))
}

/// One page of the media listing
#[derive(Debug, Default)]
struct MediaPage {
    items: Vec<ConnectorItem>,
    has_more: bool,
}

/// Entries of a list response, bare or wrapped in `results`
fn list_entries(body: &Value) -> &[Value] {
    match body {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(obj) => obj
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

fn parse_categories(body: &Value) -> HashMap<i64, String> {
    list_entries(body)
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_i64()?;
            let title = category_label(entry)?;
            Some((id, title))
        })
        .collect()
}

fn category_label(entry: &Value) -> Option<String> {
    entry
        .get("title")
        .or_else(|| entry.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_media_page(body: &Value, categories: &HashMap<i64, String>) -> MediaPage {
    let items = list_entries(body)
        .iter()
        .filter_map(|entry| parse_media_entry(entry, categories))
        .collect();

    // A bare list carries no pagination info: keep going until an empty page.
    let has_more = match body {
        Value::Object(obj) => !matches!(obj.get("next"), None | Some(Value::Null)),
        _ => true,
    };

    MediaPage { items, has_more }
}

fn parse_media_entry(entry: &Value, categories: &HashMap<i64, String>) -> Option<ConnectorItem> {
    let video_id = entry
        .get("friendly_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(video_id)
        .to_string();

    let mut names: Vec<String> = Vec::new();
    if let Some(raw) = entry.get("categories").and_then(Value::as_array) {
        for cat in raw {
            let name = match cat {
                Value::Number(n) => n.as_i64().and_then(|id| categories.get(&id).cloned()),
                Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
                Value::Object(_) => category_label(cat),
                _ => None,
            };
            if let Some(name) = name {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }

    let duration_seconds = entry
        .get("duration")
        .and_then(Value::as_f64)
        .map(|secs| secs.round() as i64);

    let thumbnail_url = entry
        .get("thumbnail_url")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ConnectorItem {
        video_id: video_id.to_string(),
        title,
        categories: names,
        tags: Vec::new(),
        duration_seconds,
        thumbnail_url,
    })
}
