//! In-memory fakes for the filter seams (testing and offline runs).
//!
//! [`StaticFilter`] answers from a fixed set of matching item ids and can be
//! told to be slow, to fail, or to block until a gate is opened.
//! [`StaticCatalog`] serves a fixed filter list.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use crate::error::{FilterError, FilterResult, Result, WishfilterError};
use crate::filter::{Filter, FilterCatalog, FilterId, OrderKey, SharedFilter};
use crate::item::{Item, ItemId};

/// Filter whose predicate is a fixed set of matching ids.
#[derive(Debug)]
pub struct StaticFilter {
    id: FilterId,
    name: String,
    matching: BTreeSet<ItemId>,
    failing: BTreeSet<ItemId>,
    delay: Duration,
    item_delays: HashMap<ItemId, Duration>,
    order: OrderKey,
    available: bool,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl StaticFilter {
    pub fn new(id: impl Into<FilterId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            matching: BTreeSet::new(),
            failing: BTreeSet::new(),
            delay: Duration::ZERO,
            item_delays: HashMap::new(),
            order: OrderKey::default(),
            available: true,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn matching<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.matching.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Evaluations for these items fail with a lookup error.
    pub fn failing_for<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.failing.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay for one item, overriding the default delay.
    pub fn with_item_delay(mut self, id: impl Into<ItemId>, delay: Duration) -> Self {
        self.item_delays.insert(id.into(), delay);
        self
    }

    pub fn with_order(mut self, order: OrderKey) -> Self {
        self.order = order;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Every evaluation waits for a permit on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of predicate evaluations started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Filter for StaticFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn order_key(&self) -> OrderKey {
        self.order.clone()
    }

    fn is_available(&self, _now: DateTime<Utc>) -> bool {
        self.available
    }

    async fn matches(&self, item: &Item) -> FilterResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.item_delays.get(&item.id).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| FilterError::Lookup("gate closed".to_string()))?;
            permit.forget();
        }

        if self.failing.contains(&item.id) {
            return Err(FilterError::Lookup(format!(
                "lookup for {} failed",
                item.id
            )));
        }
        Ok(self.matching.contains(&item.id))
    }
}

/// Catalog serving a fixed list of filters, or a fixed error.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    filters: Vec<SharedFilter>,
    error: Option<String>,
}

impl StaticCatalog {
    pub fn new(filters: Vec<SharedFilter>) -> Self {
        Self {
            filters,
            error: None,
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            filters: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

#[async_trait]
impl FilterCatalog for StaticCatalog {
    async fn fetch_filters(&self) -> Result<Vec<SharedFilter>> {
        match &self.error {
            Some(reason) => Err(WishfilterError::Catalog(reason.clone())),
            None => Ok(self.filters.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_filter_counts_calls() {
        let filter = StaticFilter::new("f", "F").matching(["a"]);
        assert!(filter.matches(&Item::new("a")).await.unwrap());
        assert!(!filter.matches(&Item::new("b")).await.unwrap());
        assert_eq!(filter.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_catalog() {
        let catalog = StaticCatalog::failing("offline");
        assert!(catalog.fetch_filters().await.is_err());
    }
}
