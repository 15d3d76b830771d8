//! Catalog: ingested media items, one snapshot generation at a time
//!
//! - `connector`: item sources (MediaCMS, static lists)
//! - `rebuild`: transactional generation replace
//! - `refresh`: rebuild plus the `current` / `snapshots/{id}` pointer documents
//! - `repository`: read access for resolution and stats

pub mod connector;
pub mod rebuild;
pub mod refresh;
pub mod repository;

pub use connector::{Connector, ConnectorError, ItemStream};
pub use rebuild::rebuild_catalog;
pub use refresh::{new_snapshot_id, run_catalog_refresh};
pub use repository::{CatalogRepository, CatalogStats};

use serde::{Deserialize, Serialize};

/// One item as produced by a connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorItem {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub duration_seconds: Option<i64>,
    pub thumbnail_url: Option<String>,
}

impl ConnectorItem {
    pub fn new(video_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            categories: Vec::new(),
            tags: Vec::new(),
            duration_seconds: None,
            thumbnail_url: None,
        }
    }

    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// Manifest URL the executor loads this item from
    pub fn manifest_url(&self, base_url: &str) -> String {
        catalog_manifest_url(base_url, &self.video_id)
    }
}

/// A catalog row of the live generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItemRef {
    pub video_id: String,
    pub title: String,
    pub categories: Vec<String>,
    pub duration_seconds: Option<i64>,
    pub manifest_url: Option<String>,
    pub snapshot_id: String,
}

/// Metadata of one catalog generation
///
/// Written once per rebuild as both the `current` pointer and the
/// `snapshots/{id}` archive document; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub created_at: String,
    pub source: String,
    pub item_count: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Cytube custom-media manifest URL for a MediaCMS video
pub fn cytube_manifest_url(base_url: &str, video_id: &str) -> String {
    format!(
        "{}/api/v1/media/cytube/{}.json",
        base_url.trim_end_matches('/'),
        video_id
    )
}

/// Manifest URL as stored in the catalog and sent to the executor
pub fn catalog_manifest_url(base_url: &str, video_id: &str) -> String {
    format!("{}?format=json", cytube_manifest_url(base_url, video_id))
}
