//! Items whose visibility is being decided.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregator::OrFactors;
use crate::filter::FilterId;

/// Stable identifier of an item, unique within a registry.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The immutable payload handed to filter predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub title: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("[No Title]")
    }
}

/// Where an item stands with respect to predicate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Registered, no evaluation dispatched yet.
    Unlinked,
    /// One or more evaluations outstanding.
    Linking,
    /// Every known filter has been evaluated at least once.
    Linked,
}

/// Registry-owned state of one item.
#[derive(Debug, Clone)]
pub struct ItemEntry {
    item: Item,
    visible: bool,
    factors: OrFactors,
    pending: usize,
    state: LinkState,
    unresolved: BTreeSet<FilterId>,
}

impl ItemEntry {
    /// `linked` marks an item registered while no filter is known.
    pub fn new(item: Item, visible: bool, linked: bool) -> Self {
        Self {
            item,
            visible,
            factors: OrFactors::new(),
            pending: 0,
            state: if linked {
                LinkState::Linked
            } else {
                LinkState::Unlinked
            },
            unresolved: BTreeSet::new(),
        }
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub fn id(&self) -> &ItemId {
        &self.item.id
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Returns `true` when the flag changed.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        let changed = self.visible != visible;
        self.visible = visible;
        changed
    }

    /// Per-filter match factors, keyed by filter id.
    pub fn factors(&self) -> &OrFactors {
        &self.factors
    }

    /// Whether any known filter matched this item.
    pub fn matches_any_filter(&self) -> bool {
        self.factors.result()
    }

    pub fn link_state(&self) -> LinkState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Filters whose last evaluation for this item failed.
    pub fn unresolved(&self) -> &BTreeSet<FilterId> {
        &self.unresolved
    }

    pub fn begin_evaluation(&mut self) {
        self.pending += 1;
        self.state = LinkState::Linking;
    }

    pub fn finish_evaluation(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 {
            self.state = LinkState::Linked;
        }
    }

    /// Record a settled predicate result.
    pub fn record_match(&mut self, filter: &FilterId, matched: bool) -> bool {
        self.unresolved.remove(filter);
        self.factors.set_value(filter.as_str(), matched)
    }

    /// Record a failed evaluation: the pair is left without a factor.
    pub fn record_failure(&mut self, filter: &FilterId) -> bool {
        self.unresolved.insert(filter.clone());
        self.factors.remove_factor(filter.as_str())
    }

    /// Drop everything known about a filter that left the registry.
    pub fn forget_filter(&mut self, filter: &FilterId) -> bool {
        self.unresolved.remove(filter);
        self.factors.remove_factor(filter.as_str())
    }
}
