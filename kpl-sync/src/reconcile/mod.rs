//! Playlist reconciliation engine
//!
//! Applies a stored playlist definition to a room's live queue:
//!
//! 1. Load the definition from `playlists/{id}`. A missing playlist is a
//!    structural failure reported in the result, with no commands sent.
//! 2. Resolve each `video_id` against the live catalog generation. Misses
//!    are recorded in `failed[]` and skipped; they never fail the run.
//! 3. Read the live queue projection when the mode needs it.
//! 4. Plan the command sequence (see [`plan`]) and dispatch it in order.
//!
//! Every mode computes an absolute target state, so re-running after an
//! interrupted dispatch is safe. Success means the commands were
//! dispatched, not that the executor applied them.

pub mod plan;

pub use plan::plan_commands;

use crate::catalog::{catalog_manifest_url, CatalogRepository};
use kpl_common::bus::QueueCommand;
use kpl_common::gateway::{LiveQueueProjection, QueueGateway};
use kpl_common::store::{playlist_key, KvNamespace};
use kpl_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a playlist is applied to the live queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Add playlist items after whatever is queued
    Append,
    /// Clear the queue, then add playlist items
    HardReplace,
    /// Remove everything but the playing item, then add playlist items
    PreserveCurrent,
}

impl QueueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueMode::Append => "append",
            QueueMode::HardReplace => "hard_replace",
            QueueMode::PreserveCurrent => "preserve_current",
        }
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "append" => Ok(QueueMode::Append),
            "hard_replace" => Ok(QueueMode::HardReplace),
            "preserve_current" => Ok(QueueMode::PreserveCurrent),
            other => Err(format!(
                "unknown queue mode '{}' (expected append, hard_replace or preserve_current)",
                other
            )),
        }
    }
}

/// One entry of a playlist definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub video_id: Option<String>,
}

impl PlaylistItem {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: Some(video_id.into()),
        }
    }
}

/// An ordered playlist, stored as a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDefinition {
    /// Informational; the document key identifies the playlist
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

/// A playlist document as read back for reconciliation
///
/// Entries stay raw so one malformed item cannot reject the whole playlist.
#[derive(Debug, Deserialize)]
struct StoredPlaylist {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStatus {
    Ok,
    Error,
}

/// A playlist item that was left out of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub video_id: Option<String>,
    pub reason: String,
}

/// Outcome of one reconciliation run
///
/// `status: ok` with a non-empty `failed` list is a partial success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub status: ReconcileStatus,
    pub enqueued_count: usize,
    pub failed: Vec<FailedItem>,
    pub error: Option<String>,
}

impl ReconciliationResult {
    fn structural_error(message: impl Into<String>) -> Self {
        Self {
            status: ReconcileStatus::Error,
            enqueued_count: 0,
            failed: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReconcileStatus::Ok
    }
}

pub const PLAYLIST_NOT_FOUND: &str = "Playlist not found";
pub const REASON_MISSING_VIDEO_ID: &str = "missing video_id";
pub const REASON_NOT_IN_CATALOG: &str = "not in catalog";
pub const REASON_INVALID_VIDEO_ID: &str = "invalid video_id";
pub const REASON_INVALID_ITEM: &str = "invalid playlist item";

/// Applies playlists to live queues
pub struct Reconciler {
    gateway: Arc<dyn QueueGateway>,
    catalog: CatalogRepository,
    namespace: KvNamespace,
    manifest_base_url: String,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn QueueGateway>,
        catalog: CatalogRepository,
        namespace: KvNamespace,
        manifest_base_url: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            catalog,
            namespace,
            manifest_base_url: manifest_base_url.into(),
        }
    }

    /// Apply playlist `playlist_id` to the live queue of `channel`
    ///
    /// Store or bus failures are returned as `Err`. A bus failure part-way
    /// through leaves the already dispatched prefix in place.
    pub async fn apply_playlist_to_queue(
        &self,
        playlist_id: &str,
        channel: &str,
        mode: QueueMode,
    ) -> Result<ReconciliationResult> {
        let Some(doc) = self
            .gateway
            .read_document(&self.namespace.playlists_bucket(), &playlist_key(playlist_id))
            .await?
        else {
            warn!(playlist_id, "Playlist not found, nothing dispatched");
            return Ok(ReconciliationResult::structural_error(PLAYLIST_NOT_FOUND));
        };

        let parsed = if doc.is_object() {
            serde_json::from_value::<StoredPlaylist>(doc).map_err(|e| e.to_string())
        } else {
            Err("expected a JSON object".to_string())
        };
        let playlist = match parsed {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!(playlist_id, error = %e, "Playlist document is malformed, nothing dispatched");
                return Ok(ReconciliationResult::structural_error(format!(
                    "Invalid playlist document: {}",
                    e
                )));
            }
        };

        let (manifest_urls, failed) = self.resolve_items(&playlist.items).await?;

        let live = match mode {
            QueueMode::PreserveCurrent => self.gateway.read_live_queue_projection(channel).await?,
            QueueMode::Append | QueueMode::HardReplace => LiveQueueProjection::default(),
        };

        let commands = plan_commands(mode, &live, &manifest_urls);
        for command in &commands {
            self.gateway.publish_command(channel, command).await?;
        }

        let enqueued_count = commands
            .iter()
            .filter(|c| matches!(c, QueueCommand::AddVideo { .. }))
            .count();

        info!(
            playlist_id,
            channel,
            mode = %mode,
            commands = commands.len(),
            enqueued = enqueued_count,
            failed = failed.len(),
            "Playlist applied to queue"
        );

        Ok(ReconciliationResult {
            status: ReconcileStatus::Ok,
            enqueued_count,
            failed,
            error: None,
        })
    }

    /// Map playlist entries to manifest URLs, in playlist order
    async fn resolve_items(&self, items: &[Value]) -> Result<(Vec<String>, Vec<FailedItem>)> {
        let mut urls = Vec::with_capacity(items.len());
        let mut failed = Vec::new();

        for entry in items {
            let video_id = match entry_video_id(entry) {
                Ok(video_id) => video_id,
                Err(failure) => {
                    debug!(entry = %entry, reason = %failure.reason, "Skipping playlist entry");
                    failed.push(failure);
                    continue;
                }
            };

            match self.catalog.find_item(video_id).await? {
                Some(found) => {
                    let url = found
                        .manifest_url
                        .filter(|u| !u.is_empty())
                        .unwrap_or_else(|| catalog_manifest_url(&self.manifest_base_url, video_id));
                    urls.push(url);
                }
                None => {
                    debug!(video_id, "Playlist item not in catalog");
                    failed.push(FailedItem {
                        video_id: Some(video_id.to_string()),
                        reason: REASON_NOT_IN_CATALOG.to_string(),
                    });
                }
            }
        }

        Ok((urls, failed))
    }
}

/// The usable `video_id` of one raw playlist entry
fn entry_video_id(entry: &Value) -> std::result::Result<&str, FailedItem> {
    let Value::Object(obj) = entry else {
        return Err(FailedItem {
            video_id: None,
            reason: REASON_INVALID_ITEM.to_string(),
        });
    };

    match obj.get("video_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim()),
        Some(Value::String(id)) => Err(FailedItem {
            video_id: Some(id.clone()),
            reason: REASON_MISSING_VIDEO_ID.to_string(),
        }),
        None | Some(Value::Null) => Err(FailedItem {
            video_id: None,
            reason: REASON_MISSING_VIDEO_ID.to_string(),
        }),
        Some(other) => Err(FailedItem {
            video_id: Some(other.to_string()),
            reason: REASON_INVALID_VIDEO_ID.to_string(),
        }),
    }
}
