//! The discovery-event coordinator.
//!
//! Detection (whatever notices new wishlist rows) only sends [`FeedEvent`]s
//! through a [`ChangeFeed`]. One coordinator task consumes them in order and
//! drives the [`Registry`], so a batch is fully linked and its visibility
//! applied before the next event is looked at.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, WishfilterError};
use crate::filter::{FilterId, SharedFilter};
use crate::item::Item;
use crate::linker::LinkReport;
use crate::registry::Registry;

/// One unit of work for the coordinator loop.
#[derive(Debug)]
pub enum FeedEvent {
    ItemsDiscovered(Vec<Item>),
    ActivateFilter(FilterId),
    DeactivateFilter(FilterId),
    AddFilter(SharedFilter),
    RemoveFilter(FilterId),
    RetryUnresolved,
    Clear,
    /// Answered once every event sent before it has been processed.
    Settle(oneshot::Sender<()>),
}

impl FeedEvent {
    fn kind(&self) -> &'static str {
        match self {
            FeedEvent::ItemsDiscovered(_) => "items_discovered",
            FeedEvent::ActivateFilter(_) => "activate_filter",
            FeedEvent::DeactivateFilter(_) => "deactivate_filter",
            FeedEvent::AddFilter(_) => "add_filter",
            FeedEvent::RemoveFilter(_) => "remove_filter",
            FeedEvent::RetryUnresolved => "retry_unresolved",
            FeedEvent::Clear => "clear",
            FeedEvent::Settle(_) => "settle",
        }
    }
}

/// What the coordinator did before its feed closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSummary {
    pub events: usize,
    pub batches: usize,
    pub registered: usize,
    pub duplicates: usize,
    pub link: LinkReport,
}

/// Cloneable sending side of the coordinator.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: mpsc::Sender<FeedEvent>,
}

impl ChangeFeed {
    pub async fn send(&self, event: FeedEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|err| WishfilterError::FeedClosed(err.0.kind().to_string()))
    }

    pub async fn items_discovered(&self, items: Vec<Item>) -> Result<()> {
        self.send(FeedEvent::ItemsDiscovered(items)).await
    }

    pub async fn activate_filter(&self, filter: FilterId) -> Result<()> {
        self.send(FeedEvent::ActivateFilter(filter)).await
    }

    pub async fn deactivate_filter(&self, filter: FilterId) -> Result<()> {
        self.send(FeedEvent::DeactivateFilter(filter)).await
    }

    pub async fn add_filter(&self, filter: SharedFilter) -> Result<()> {
        self.send(FeedEvent::AddFilter(filter)).await
    }

    pub async fn remove_filter(&self, filter: FilterId) -> Result<()> {
        self.send(FeedEvent::RemoveFilter(filter)).await
    }

    pub async fn retry_unresolved(&self) -> Result<()> {
        self.send(FeedEvent::RetryUnresolved).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.send(FeedEvent::Clear).await
    }

    /// Wait until every event sent before this call has been processed.
    pub async fn settled(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.send(FeedEvent::Settle(done)).await?;
        wait.await
            .map_err(|_| WishfilterError::FeedClosed("settle".to_string()))
    }
}

/// Single consumer of discovery events.
pub struct Coordinator {
    registry: Registry,
    rx: mpsc::Receiver<FeedEvent>,
    summary: CoordinatorSummary,
}

impl Coordinator {
    /// Start the loop on the current runtime. It stops once every
    /// [`ChangeFeed`] clone has been dropped.
    pub fn spawn(registry: Registry, capacity: usize) -> (ChangeFeed, JoinHandle<CoordinatorSummary>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let coordinator = Coordinator {
            registry,
            rx,
            summary: CoordinatorSummary::default(),
        };
        (ChangeFeed { tx }, tokio::spawn(coordinator.run()))
    }

    async fn run(mut self) -> CoordinatorSummary {
        info!(event = "coordinator.started");
        while let Some(event) = self.rx.recv().await {
            self.summary.events += 1;
            debug!(event = "coordinator.event", kind = event.kind());
            self.handle(event).await;
        }
        info!(
            event = "coordinator.stopped",
            events = self.summary.events,
            batches = self.summary.batches,
            registered = self.summary.registered,
        );
        self.summary
    }

    async fn handle(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::ItemsDiscovered(items) => {
                let report = self.registry.on_items_discovered(items).await;
                self.summary.batches += 1;
                self.summary.registered += report.registered;
                self.summary.duplicates += report.duplicates;
                self.summary.link.merge(report.link);
            }
            FeedEvent::ActivateFilter(filter) => {
                self.registry.activate_filter(&filter);
            }
            FeedEvent::DeactivateFilter(filter) => {
                self.registry.deactivate_filter(&filter);
            }
            FeedEvent::AddFilter(filter) => {
                if let Some(report) = self.registry.add_filter(filter).await {
                    self.summary.link.merge(report);
                }
            }
            FeedEvent::RemoveFilter(filter) => {
                self.registry.remove_filter(&filter);
            }
            FeedEvent::RetryUnresolved => {
                let report = self.registry.relink_unresolved().await;
                self.summary.link.merge(report);
            }
            FeedEvent::Clear => self.registry.clear(),
            FeedEvent::Settle(done) => {
                // The waiter may have given up; nothing to do then.
                let _ = done.send(());
            }
        }
    }
}
