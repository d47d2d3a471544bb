//! The registry: live items, known filters, the reverse index and the
//! active selection.
//!
//! Visibility of an item is a projection of the selection onto the reverse
//! index:
//!
//! ```text
//! visible(item) = active.is_empty() || active.any(|f| reverse_index[f].contains(item))
//! ```
//!
//! An empty selection means "unfiltered" and shows everything, even items
//! that no filter matches. Changing the selection never re-runs predicates.
//!
//! Predicate results reach the registry as [`LinkOutcome`]s and are applied
//! one at a time under the state lock by the task that drives the outcome
//! stream. Each evaluation carries the generation it was dispatched in;
//! [`Registry::clear`] bumps the generation, so outcomes that complete
//! afterwards are discarded instead of touching a reused id. Outcomes also
//! carry the filter instance they ran with and are discarded when that
//! filter has been removed or replaced under the same id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Instrument};

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::filter::{presentation_order, Filter, FilterCatalog, FilterId, FilterSummary, SharedFilter};
use crate::item::{Item, ItemEntry, ItemId, LinkState};
use crate::linker::{LinkFailure, LinkOutcome, LinkReport, LinkTask, Linker};
use crate::metrics::METRICS;
use crate::obs;

/// Published whenever an item's visible flag flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChange {
    pub item: ItemId,
    pub visible: bool,
}

/// Settled summary of one discovery batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub registered: usize,
    pub duplicates: usize,
    pub link: LinkReport,
}

#[derive(Debug, Default)]
struct RegistryState {
    generation: u64,
    batches: u64,
    items: BTreeMap<ItemId, ItemEntry>,
    filters: BTreeMap<FilterId, SharedFilter>,
    active: BTreeSet<FilterId>,
    reverse_index: HashMap<FilterId, BTreeSet<ItemId>>,
}

impl RegistryState {
    fn project(&self, item: &ItemId) -> bool {
        self.active.is_empty()
            || self.active.iter().any(|filter| {
                self.reverse_index
                    .get(filter)
                    .is_some_and(|items| items.contains(item))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Re-project the item after each applied outcome.
    PerOutcome,
    /// The caller re-projects once the whole batch has settled.
    Deferred,
}

/// Owner of items, filters, the reverse index and the selection.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Debug, Clone)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
    linker: Linker,
    changes: broadcast::Sender<VisibilityChange>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_buffer.max(1));
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            linker: Linker::new(config.linker),
            changes,
        }
    }

    /// Receive every visibility flip from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<VisibilityChange> {
        self.changes.subscribe()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Load filters from `catalog`, skipping those unavailable at `now`, and
    /// link any already-registered items to them.
    ///
    /// Returns the number of filters admitted.
    pub async fn init(&self, catalog: &dyn FilterCatalog, now: DateTime<Utc>) -> Result<usize> {
        let fetched = catalog.fetch_filters().await?;
        let fetched_count = fetched.len();

        let mut admitted = Vec::new();
        for filter in fetched {
            if !filter.is_available(now) {
                debug!(filter = %filter.id(), name = %filter.name(), "skipping unavailable filter");
                continue;
            }
            let id = filter.id().clone();
            if self.insert_filter(filter) {
                admitted.push(id);
            }
        }

        let pairs = self.pairs_for_filters(&admitted);
        let tasks = self.dispatch(pairs);
        let report = self.run(tasks, Refresh::PerOutcome).await;

        info!(
            event = "registry.initialised",
            fetched = fetched_count,
            admitted = admitted.len(),
            evaluated = report.evaluated,
            failed = report.failed.len(),
        );
        Ok(admitted.len())
    }

    /// Show every item again and forget items, the selection and the
    /// reverse index. Filters stay known. Evaluations still in flight are
    /// discarded when they complete.
    pub fn clear(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.generation += 1;
        let cleared = state.items.len();
        for entry in state.items.values_mut() {
            if entry.set_visible(true) {
                self.publish(entry.id(), true);
            }
        }
        state.items.clear();
        state.active.clear();
        for targets in state.reverse_index.values_mut() {
            targets.clear();
        }

        obs::emit_registry_cleared(cleared, state.generation);
    }

    /// [`Registry::clear`], then forget every filter as well.
    pub fn teardown(&self) {
        self.clear();
        let mut state = self.lock();
        state.filters.clear();
        state.reverse_index.clear();
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    /// Register an item and link it to every known filter.
    ///
    /// A duplicate id is logged and ignored; the existing entry is left
    /// untouched. Returns whether the item was newly registered.
    pub async fn register_item(&self, item: Item) -> bool {
        let id = item.id.clone();
        if !self.insert_item(item) {
            return false;
        }

        let report = self.link_item_to_all_filters(&id).await;
        debug!(item = %id, evaluated = report.evaluated, failed = report.failed.len(), "item linked");
        true
    }

    /// Change-feed entry point: register a batch of newly discovered items,
    /// wait for every (item, filter) evaluation of the batch to settle, then
    /// apply the current selection to the new items.
    pub async fn on_items_discovered(&self, items: Vec<Item>) -> DiscoveryReport {
        let batch = self.next_batch();
        let span = obs::discovery_span(batch, items.len());

        async move {
            let mut report = DiscoveryReport::default();
            let mut added = Vec::new();
            for item in items {
                let id = item.id.clone();
                if self.insert_item(item) {
                    added.push(id);
                } else {
                    report.duplicates += 1;
                }
            }
            report.registered = added.len();

            let pairs = self.pairs_for_items(&added);
            let tasks = self.dispatch(pairs);
            report.link = self.run(tasks, Refresh::Deferred).await;
            self.refresh_items(&added);

            info!(
                event = "discovery.settled",
                registered = report.registered,
                duplicates = report.duplicates,
                matched = report.link.matched,
                failed = report.link.failed.len(),
                discarded = report.link.discarded,
            );
            report
        }
        .instrument(span)
        .await
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    /// Register a filter and link every item to it.
    ///
    /// Returns `None` when a filter with the same id is already known.
    pub async fn add_filter(&self, filter: SharedFilter) -> Option<LinkReport> {
        let id = filter.id().clone();
        if !self.insert_filter(filter) {
            warn!(filter = %id, "filter already registered; ignoring");
            return None;
        }
        Some(self.link_all_items_to_filter(&id).await)
    }

    /// Forget a filter: its factor is removed from every item, its reverse
    /// index entry dropped and it leaves the selection.
    pub fn remove_filter(&self, filter: &FilterId) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.filters.remove(filter).is_none() {
            obs::emit_unknown_id("filter", filter, "remove_filter");
            return false;
        }
        state.reverse_index.remove(filter);
        for entry in state.items.values_mut() {
            entry.forget_filter(filter);
        }
        if state.active.remove(filter) {
            obs::emit_filter_deactivated(filter, state.active.len());
            self.refresh_all(state);
        }
        info!(event = "filter.removed", filter = %filter);
        true
    }

    /// Add a filter to the selection and re-project every item.
    pub fn activate_filter(&self, filter: &FilterId) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;

        if !state.filters.contains_key(filter) {
            obs::emit_unknown_id("filter", filter, "activate_filter");
            return false;
        }
        if !state.active.insert(filter.clone()) {
            warn!(filter = %filter, "filter already active");
            return false;
        }

        obs::emit_filter_activated(filter, state.active.len());
        let changed = self.refresh_all(state);
        debug!(filter = %filter, changed = changed, "selection applied");
        true
    }

    /// Remove a filter from the selection and re-project every item.
    pub fn deactivate_filter(&self, filter: &FilterId) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;

        if !state.active.remove(filter) {
            if state.filters.contains_key(filter) {
                warn!(filter = %filter, "filter is not active");
            } else {
                obs::emit_unknown_id("filter", filter, "deactivate_filter");
            }
            return false;
        }

        obs::emit_filter_deactivated(filter, state.active.len());
        let changed = self.refresh_all(state);
        debug!(filter = %filter, changed = changed, "selection applied");
        true
    }

    // -----------------------------------------------------------------------
    // Linking
    // -----------------------------------------------------------------------

    /// Evaluate one filter for one item and apply the outcome.
    pub async fn link_item_to_filter(&self, item: &ItemId, filter: &FilterId) -> LinkReport {
        if !self.knows_item(item, "link_item_to_filter")
            || !self.knows_filter(filter, "link_item_to_filter")
        {
            return LinkReport::default();
        }
        let tasks = self.dispatch(vec![(item.clone(), filter.clone())]);
        self.run(tasks, Refresh::PerOutcome).await
    }

    /// Evaluate every known filter for one item.
    pub async fn link_item_to_all_filters(&self, item: &ItemId) -> LinkReport {
        if !self.knows_item(item, "link_item_to_all_filters") {
            return LinkReport::default();
        }
        let Some((item, filters, generation)) = self.begin_item_links(item) else {
            return LinkReport::default();
        };
        let outcomes = self
            .linker
            .link_item_to_all_filters(&item, &filters, generation);
        self.drain(outcomes, Refresh::PerOutcome).await
    }

    /// Evaluate one filter for every registered item.
    pub async fn link_all_items_to_filter(&self, filter: &FilterId) -> LinkReport {
        if !self.knows_filter(filter, "link_all_items_to_filter") {
            return LinkReport::default();
        }
        let Some((items, filter, generation)) = self.begin_filter_links(filter) else {
            return LinkReport::default();
        };
        let outcomes = self
            .linker
            .link_all_items_to_filter(&items, &filter, generation);
        self.drain(outcomes, Refresh::PerOutcome).await
    }

    /// Retry every pair whose last evaluation failed.
    pub async fn relink_unresolved(&self) -> LinkReport {
        let pairs: Vec<(ItemId, FilterId)> = {
            let state = self.lock();
            state
                .items
                .values()
                .flat_map(|entry| {
                    entry
                        .unresolved()
                        .iter()
                        .map(move |filter| (entry.id().clone(), filter.clone()))
                })
                .collect()
        };
        let tasks = self.dispatch(pairs);
        self.run(tasks, Refresh::PerOutcome).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current visible flag of an item. Unknown items are reported visible,
    /// since nothing has hidden them.
    pub fn is_visible(&self, item: &ItemId) -> bool {
        let state = self.lock();
        match state.items.get(item) {
            Some(entry) => entry.is_visible(),
            None => {
                obs::emit_unknown_id("item", item, "is_visible");
                true
            }
        }
    }

    /// Evaluate the selection against the reverse index for `item`.
    pub fn project_visibility(&self, item: &ItemId) -> bool {
        let state = self.lock();
        if !state.items.contains_key(item) {
            obs::emit_unknown_id("item", item, "project_visibility");
        }
        state.project(item)
    }

    pub fn link_state(&self, item: &ItemId) -> Option<LinkState> {
        self.lock().items.get(item).map(ItemEntry::link_state)
    }

    /// Settled predicate result for a pair, `None` while unresolved.
    pub fn item_factor(&self, item: &ItemId, filter: &FilterId) -> Option<bool> {
        self.lock()
            .items
            .get(item)
            .and_then(|entry| entry.factors().get(filter.as_str()))
    }

    /// Whether any known filter matches the item.
    pub fn matches_any_filter(&self, item: &ItemId) -> Option<bool> {
        self.lock().items.get(item).map(ItemEntry::matches_any_filter)
    }

    /// Filters whose last evaluation for `item` failed.
    pub fn unresolved(&self, item: &ItemId) -> BTreeSet<FilterId> {
        self.lock()
            .items
            .get(item)
            .map(|entry| entry.unresolved().clone())
            .unwrap_or_default()
    }

    /// Items the filter currently matches; empty for unknown filters.
    pub fn matching_items(&self, filter: &FilterId) -> BTreeSet<ItemId> {
        self.lock()
            .reverse_index
            .get(filter)
            .cloned()
            .unwrap_or_default()
    }

    pub fn active_filters(&self) -> BTreeSet<FilterId> {
        self.lock().active.clone()
    }

    pub fn filter(&self, filter: &FilterId) -> Option<SharedFilter> {
        self.lock().filters.get(filter).cloned()
    }

    /// Known filters in presentation order.
    pub fn filters(&self) -> Vec<FilterSummary> {
        let state = self.lock();
        let mut filters: Vec<&dyn Filter> = state.filters.values().map(|f| &**f).collect();
        filters.sort_by(|a, b| presentation_order(*a, *b));

        filters
            .into_iter()
            .map(|filter| FilterSummary {
                id: filter.id().clone(),
                name: filter.name().to_string(),
                active: state.active.contains(filter.id()),
                matching_items: state
                    .reverse_index
                    .get(filter.id())
                    .map_or(0, BTreeSet::len),
            })
            .collect()
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.lock().items.keys().cloned().collect()
    }

    pub fn visibility_snapshot(&self) -> BTreeMap<ItemId, bool> {
        self.lock()
            .items
            .iter()
            .map(|(id, entry)| (id.clone(), entry.is_visible()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Bumped by every [`Registry::clear`].
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_batch(&self) -> u64 {
        let mut state = self.lock();
        state.batches += 1;
        state.batches
    }

    fn knows_item(&self, item: &ItemId, operation: &str) -> bool {
        let known = self.lock().items.contains_key(item);
        if !known {
            obs::emit_unknown_id("item", item, operation);
        }
        known
    }

    fn knows_filter(&self, filter: &FilterId, operation: &str) -> bool {
        let known = self.lock().filters.contains_key(filter);
        if !known {
            obs::emit_unknown_id("filter", filter, operation);
        }
        known
    }

    fn insert_item(&self, item: Item) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.items.contains_key(&item.id) {
            obs::emit_duplicate_item(&item.id);
            return false;
        }

        let id = item.id.clone();
        let visible = state.project(&id);
        obs::emit_item_registered(&id, item.display_title(), visible);
        METRICS.inc_items_registered();

        let linked = state.filters.is_empty();
        state
            .items
            .insert(id.clone(), ItemEntry::new(item, visible, linked));
        if !visible {
            // Newly seen rows start shown; hide them until a match settles.
            self.publish(&id, false);
        }
        true
    }

    fn insert_filter(&self, filter: SharedFilter) -> bool {
        let mut state = self.lock();
        let id = filter.id().clone();
        if state.filters.contains_key(&id) {
            return false;
        }
        info!(event = "filter.registered", filter = %id, name = %filter.name());
        state.filters.insert(id.clone(), filter);
        state.reverse_index.entry(id).or_default();
        true
    }

    fn pairs_for_items(&self, items: &[ItemId]) -> Vec<(ItemId, FilterId)> {
        let state = self.lock();
        items
            .iter()
            .flat_map(|item| {
                state
                    .filters
                    .keys()
                    .map(move |filter| (item.clone(), filter.clone()))
            })
            .collect()
    }

    fn pairs_for_filters(&self, filters: &[FilterId]) -> Vec<(ItemId, FilterId)> {
        let state = self.lock();
        filters
            .iter()
            .flat_map(|filter| {
                state
                    .items
                    .keys()
                    .map(move |item| (item.clone(), filter.clone()))
            })
            .collect()
    }

    /// Mark the pairs as outstanding and build their evaluation tasks.
    fn dispatch(&self, pairs: Vec<(ItemId, FilterId)>) -> Vec<LinkTask> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let generation = state.generation;

        let mut tasks = Vec::with_capacity(pairs.len());
        for (item_id, filter_id) in pairs {
            let (Some(entry), Some(filter)) = (
                state.items.get_mut(&item_id),
                state.filters.get(&filter_id),
            ) else {
                continue;
            };
            entry.begin_evaluation();
            tasks.push(LinkTask {
                item: entry.item().clone(),
                filter: filter.clone(),
                generation,
            });
        }
        tasks
    }

    /// Drive the evaluations, applying each outcome as it completes.
    async fn run(&self, tasks: Vec<LinkTask>, refresh: Refresh) -> LinkReport {
        if tasks.is_empty() {
            return LinkReport::default();
        }
        self.drain(self.linker.link_tasks(tasks), refresh).await
    }

    async fn drain(&self, mut outcomes: BoxStream<'_, LinkOutcome>, refresh: Refresh) -> LinkReport {
        let mut report = LinkReport::default();
        while let Some(outcome) = outcomes.next().await {
            self.apply(outcome, refresh, &mut report);
        }
        report
    }

    /// Mark every filter as outstanding for `item`.
    fn begin_item_links(&self, item: &ItemId) -> Option<(Item, Vec<SharedFilter>, u64)> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let filters: Vec<SharedFilter> = state.filters.values().cloned().collect();
        let entry = state.items.get_mut(item)?;
        for _ in &filters {
            entry.begin_evaluation();
        }
        Some((entry.item().clone(), filters, state.generation))
    }

    /// Mark `filter` as outstanding for every item.
    fn begin_filter_links(&self, filter: &FilterId) -> Option<(Vec<Item>, SharedFilter, u64)> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let filter = state.filters.get(filter)?.clone();
        let items = state
            .items
            .values_mut()
            .map(|entry| {
                entry.begin_evaluation();
                entry.item().clone()
            })
            .collect();
        Some((items, filter, state.generation))
    }

    fn apply(&self, outcome: LinkOutcome, refresh: Refresh, report: &mut LinkReport) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let LinkOutcome {
            item_id,
            filter_id,
            filter,
            generation,
            result,
            elapsed,
        } = outcome;

        if generation != state.generation {
            Self::discard(&item_id, &filter_id, "registry cleared", report);
            return;
        }
        let Some(entry) = state.items.get_mut(&item_id) else {
            Self::discard(&item_id, &filter_id, "item no longer registered", report);
            return;
        };
        entry.finish_evaluation();
        let current = state
            .filters
            .get(&filter_id)
            .is_some_and(|registered| Arc::ptr_eq(registered, &filter));
        if !current {
            Self::discard(&item_id, &filter_id, "filter removed or replaced", report);
            return;
        }

        match result {
            Ok(matched) => {
                entry.record_match(&filter_id, matched);
                let targets = state.reverse_index.entry(filter_id.clone()).or_default();
                if matched {
                    targets.insert(item_id.clone());
                    report.matched += 1;
                } else {
                    targets.remove(&item_id);
                }
                report.evaluated += 1;
                obs::emit_link_settled(&item_id, &filter_id, matched, elapsed.as_millis() as u64);
            }
            Err(err) => {
                entry.record_failure(&filter_id);
                if let Some(targets) = state.reverse_index.get_mut(&filter_id) {
                    targets.remove(&item_id);
                }
                METRICS.inc_predicate_failures();
                obs::emit_link_failed(&item_id, &filter_id, &err);
                report.failed.push(LinkFailure {
                    item: item_id.clone(),
                    filter: filter_id.clone(),
                    reason: err.to_string(),
                });
            }
        }

        if refresh == Refresh::PerOutcome {
            self.refresh(state, &item_id);
        }
    }

    fn discard(item: &ItemId, filter: &FilterId, reason: &str, report: &mut LinkReport) {
        METRICS.inc_stale_outcomes();
        obs::emit_link_discarded(item, filter, reason);
        report.discarded += 1;
    }

    fn refresh(&self, state: &mut RegistryState, item: &ItemId) {
        let visible = state.project(item);
        if let Some(entry) = state.items.get_mut(item) {
            if entry.set_visible(visible) {
                self.publish(item, visible);
            }
        }
    }

    fn refresh_items(&self, items: &[ItemId]) {
        let mut state = self.lock();
        for item in items {
            self.refresh(&mut state, item);
        }
    }

    fn refresh_all(&self, state: &mut RegistryState) -> usize {
        let updates: Vec<(ItemId, bool)> = state
            .items
            .keys()
            .map(|id| (id.clone(), state.project(id)))
            .collect();

        let mut changed = 0;
        for (id, visible) in updates {
            if let Some(entry) = state.items.get_mut(&id) {
                if entry.set_visible(visible) {
                    self.publish(&id, visible);
                    changed += 1;
                }
            }
        }
        changed
    }

    fn publish(&self, item: &ItemId, visible: bool) {
        METRICS.inc_visibility_changes();
        // Sending fails only when nobody subscribed.
        let _ = self.changes.send(VisibilityChange {
            item: item.clone(),
            visible,
        });
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
