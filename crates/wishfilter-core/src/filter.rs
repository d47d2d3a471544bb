//! Filters: selectable, possibly remote predicates over items.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FilterResult, Result};
use crate::item::Item;

/// Stable identifier of a filter, unique within a registry.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(String);

impl FilterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FilterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FilterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lexicographic presentation key; smaller sorts first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderKey(pub Vec<i64>);

impl OrderKey {
    pub fn new(parts: impl IntoIterator<Item = i64>) -> Self {
        Self(parts.into_iter().collect())
    }
}

/// A selectable predicate.
///
/// `matches` may suspend on a remote lookup. Implementations must be
/// cheap to share: the registry holds them as [`SharedFilter`] and clones
/// the handle into every evaluation.
#[async_trait]
pub trait Filter: Send + Sync + fmt::Debug {
    fn id(&self) -> &FilterId;

    fn name(&self) -> &str;

    /// Presentation order key. Ties are broken by id.
    fn order_key(&self) -> OrderKey {
        OrderKey::default()
    }

    /// Unavailable filters (for example expired ones) never enter a registry.
    fn is_available(&self, _now: DateTime<Utc>) -> bool {
        true
    }

    async fn matches(&self, item: &Item) -> FilterResult<bool>;
}

pub type SharedFilter = Arc<dyn Filter>;

/// Presentation order: `order_key`, then id.
pub fn presentation_order(a: &dyn Filter, b: &dyn Filter) -> Ordering {
    a.order_key()
        .cmp(&b.order_key())
        .then_with(|| a.id().cmp(b.id()))
}

/// Source of the filters a registry is initialised with.
#[async_trait]
pub trait FilterCatalog: Send + Sync {
    async fn fetch_filters(&self) -> Result<Vec<SharedFilter>>;
}

/// Presentation view of a registered filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub id: FilterId,
    pub name: String,
    pub active: bool,
    /// Number of items the filter currently matches.
    pub matching_items: usize,
}
