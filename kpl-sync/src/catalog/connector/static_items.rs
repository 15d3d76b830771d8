//! Connector over a fixed list of items

use super::{Connector, ConnectorError, ItemStream};
use crate::catalog::ConnectorItem;
use futures::stream::{self, StreamExt};

/// Yields a fixed item list, optionally failing part-way through
#[derive(Debug, Clone)]
pub struct StaticConnector {
    items: Vec<ConnectorItem>,
    fail_after: Option<usize>,
}

impl StaticConnector {
    pub fn new(items: Vec<ConnectorItem>) -> Self {
        Self { items, fail_after: None }
    }

    /// Three-item sample catalog spanning the Horror and Sci-Fi categories
    pub fn sample() -> Self {
        Self::new(vec![
            ConnectorItem::new("v1", "Night of the Living Dead")
                .with_categories(&["Horror"])
                .with_duration(96 * 60),
            ConnectorItem::new("v2", "Forbidden Planet")
                .with_categories(&["Sci-Fi"])
                .with_duration(98 * 60),
            ConnectorItem::new("v3", "The Thing")
                .with_categories(&["Horror", "Sci-Fi"])
                .with_duration(109 * 60),
        ])
    }

    /// Emit a transport error after `count` items instead of finishing
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

impl Connector for StaticConnector {
    fn name(&self) -> &str {
        "static"
    }

    fn iter_items(&self) -> ItemStream {
        let mut results: Vec<Result<ConnectorItem, ConnectorError>> = Vec::new();
        for (idx, item) in self.items.iter().enumerate() {
            if self.fail_after == Some(idx) {
                results.push(Err(ConnectorError::Network("connection reset".to_string())));
                break;
            }
            results.push(Ok(item.clone()));
        }

        stream::iter(results).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sample_yields_three_items() {
        let items: Vec<_> = StaticConnector::sample().iter_items().collect().await;
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_failing_after_truncates_with_error() {
        let items: Vec<_> = StaticConnector::sample().failing_after(1).iter_items().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
