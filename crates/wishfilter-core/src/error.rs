//! Error taxonomy for wishfilter.
//!
//! Registry operations never fail for duplicate registrations, unknown ids
//! or predicate failures; those are logged and reported through return
//! values. The types here describe what a predicate may fail with, how a
//! single (item, filter) evaluation failed, and what the outer lifecycle
//! operations (catalog loading, configuration) may fail with.

use crate::filter::FilterId;
use crate::item::ItemId;

/// Failure of a single predicate evaluation, produced by a [`crate::Filter`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum FilterError {
    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("missing data for item {item}: {detail}")]
    MissingData { item: ItemId, detail: String },
}

/// Failure to link one item to one filter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    #[error("predicate of filter {filter} failed for item {item}: {source}")]
    Predicate {
        filter: FilterId,
        item: ItemId,
        #[source]
        source: FilterError,
    },

    #[error("predicate of filter {filter} timed out for item {item} after {timeout_ms}ms")]
    Timeout {
        filter: FilterId,
        item: ItemId,
        timeout_ms: u64,
    },
}

/// Errors of the registry lifecycle and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum WishfilterError {
    #[error("filter catalog unavailable: {0}")]
    Catalog(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("change feed closed before {0} was processed")]
    FeedClosed(String),
}

/// Result type for registry lifecycle operations.
pub type Result<T> = std::result::Result<T, WishfilterError>;

/// Result type for predicate evaluation.
pub type FilterResult<T> = std::result::Result<T, FilterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_names_pair() {
        let err = LinkError::Predicate {
            filter: FilterId::new("coupon-7"),
            item: ItemId::new("RJ01"),
            source: FilterError::Lookup("HTTP 503".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("coupon-7"));
        assert!(msg.contains("RJ01"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn test_timeout_error_reports_budget() {
        let err = LinkError::Timeout {
            filter: FilterId::new("f"),
            item: ItemId::new("i"),
            timeout_ms: 250,
        };
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_catalog_error_display() {
        let err = WishfilterError::Catalog("connection refused".to_string());
        assert!(err.to_string().contains("filter catalog unavailable"));
        assert!(err.to_string().contains("connection refused"));
    }
}
