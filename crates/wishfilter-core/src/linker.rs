//! Predicate evaluation for (item, filter) pairs.
//!
//! The [`Linker`] only evaluates: it runs `Filter::matches` under a timeout
//! and reports a [`LinkOutcome`]. Applying outcomes to item factors and the
//! reverse index is the registry's job, which consumes the outcome stream
//! on a single task so writes for one item never interleave.
//!
//! Bulk operations fan out with bounded concurrency and have "settled"
//! semantics: every evaluation runs to success or failure independently
//! and a failure never cancels its siblings.

use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::LinkerConfig;
use crate::error::LinkError;
use crate::filter::{FilterId, SharedFilter};
use crate::item::{Item, ItemId};
use crate::metrics::METRICS;

/// One pending evaluation.
#[derive(Debug, Clone)]
pub struct LinkTask {
    pub item: Item,
    pub filter: SharedFilter,
    /// Registry generation the task was dispatched in.
    pub generation: u64,
}

/// Result of one evaluation.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub item_id: ItemId,
    pub filter_id: FilterId,
    /// The filter instance that produced the result. A filter removed and
    /// re-added under the same id is a different instance.
    pub filter: SharedFilter,
    pub generation: u64,
    pub result: Result<bool, LinkError>,
    pub elapsed: Duration,
}

/// A pair whose evaluation failed, with the reason rendered for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFailure {
    pub item: ItemId,
    pub filter: FilterId,
    pub reason: String,
}

/// Settled summary of a bulk link operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    /// Outcomes applied to the registry (matched or not).
    pub evaluated: usize,
    /// Applied outcomes whose predicate returned `true`.
    pub matched: usize,
    pub failed: Vec<LinkFailure>,
    /// Outcomes dropped because their item, filter or generation was gone.
    pub discarded: usize,
}

impl LinkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.discarded == 0
    }

    pub fn merge(&mut self, other: LinkReport) {
        self.evaluated += other.evaluated;
        self.matched += other.matched;
        self.failed.extend(other.failed);
        self.discarded += other.discarded;
    }
}

/// Evaluates filter predicates against items.
#[derive(Debug, Clone)]
pub struct Linker {
    config: LinkerConfig,
}

impl Linker {
    pub fn new(config: LinkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// Evaluate one filter against one item.
    pub async fn link_item_to_filter(
        &self,
        item: &Item,
        filter: &SharedFilter,
        generation: u64,
    ) -> LinkOutcome {
        self.evaluate(LinkTask {
            item: item.clone(),
            filter: filter.clone(),
            generation,
        })
        .await
    }

    /// Evaluate every filter against one item.
    pub fn link_item_to_all_filters<'a>(
        &'a self,
        item: &Item,
        filters: &[SharedFilter],
        generation: u64,
    ) -> BoxStream<'a, LinkOutcome> {
        let tasks = filters
            .iter()
            .map(|filter| LinkTask {
                item: item.clone(),
                filter: filter.clone(),
                generation,
            })
            .collect();
        self.link_tasks(tasks)
    }

    /// Evaluate one filter against every item.
    pub fn link_all_items_to_filter<'a>(
        &'a self,
        items: &[Item],
        filter: &SharedFilter,
        generation: u64,
    ) -> BoxStream<'a, LinkOutcome> {
        let tasks = items
            .iter()
            .map(|item| LinkTask {
                item: item.clone(),
                filter: filter.clone(),
                generation,
            })
            .collect();
        self.link_tasks(tasks)
    }

    /// Evaluate arbitrary tasks, yielding outcomes in completion order.
    pub fn link_tasks<'a>(&'a self, tasks: Vec<LinkTask>) -> BoxStream<'a, LinkOutcome> {
        stream::iter(tasks)
            .map(move |task| self.evaluate(task))
            .buffer_unordered(self.config.concurrency())
            .boxed()
    }

    async fn evaluate(&self, task: LinkTask) -> LinkOutcome {
        let started = Instant::now();
        let timeout = self.config.predicate_timeout();
        let item_id = task.item.id.clone();
        let filter_id = task.filter.id().clone();

        let result = match tokio::time::timeout(timeout, task.filter.matches(&task.item)).await {
            Ok(Ok(matched)) => Ok(matched),
            Ok(Err(source)) => Err(LinkError::Predicate {
                filter: filter_id.clone(),
                item: item_id.clone(),
                source,
            }),
            Err(_) => Err(LinkError::Timeout {
                filter: filter_id.clone(),
                item: item_id.clone(),
                timeout_ms: self.config.predicate_timeout_ms,
            }),
        };
        METRICS.inc_predicates_evaluated();

        LinkOutcome {
            item_id,
            filter_id,
            filter: task.filter,
            generation: task.generation,
            result,
            elapsed: started.elapsed(),
        }
    }
}
