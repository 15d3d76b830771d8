//! Catalog item connectors
//!
//! A connector hands out item sequences. Each sequence is lazy, finite and
//! drain-once: it is consumed by value, so it cannot be iterated a second
//! time. Call [`Connector::iter_items`] again for a fresh sequence.
//!
//! A sequence may end with an `Err`. Consumers treat that as the end of the
//! sequence (truncation), not as a failed ingest.

mod mediacms;
mod static_items;

pub use mediacms::MediaCmsConnector;
pub use static_items::StaticConnector;

use super::ConnectorItem;
use futures::stream::BoxStream;
use thiserror::Error;

/// A drain-once sequence of connector items
pub type ItemStream = BoxStream<'static, Result<ConnectorItem, ConnectorError>>;

/// Connector transport errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Source of catalog items
pub trait Connector: Send + Sync {
    /// Short name recorded as the snapshot source
    fn name(&self) -> &str;

    /// Start a new item sequence
    fn iter_items(&self) -> ItemStream;
}
