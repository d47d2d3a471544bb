//! Wishfilter Core Library
//!
//! Incremental visibility aggregation for lists of items filtered by any
//! number of asynchronous predicates. Items and filters are linked once;
//! changing the active selection only re-projects the cached results.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod fakes;
pub mod feed;
pub mod filter;
pub mod item;
pub mod linker;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod telemetry;

pub use aggregator::{AllOf, AndFactors, AnyOf, Combinator, Factors, OrFactors};
pub use config::{LinkerConfig, RegistryConfig};
pub use error::{FilterError, FilterResult, LinkError, Result, WishfilterError};
pub use feed::{ChangeFeed, Coordinator, CoordinatorSummary, FeedEvent};
pub use filter::{
    presentation_order, Filter, FilterCatalog, FilterId, FilterSummary, OrderKey, SharedFilter,
};
pub use item::{Item, ItemEntry, ItemId, LinkState};
pub use linker::{LinkFailure, LinkOutcome, LinkReport, LinkTask, Linker};
pub use registry::{DiscoveryReport, Registry, VisibilityChange};

pub use metrics::METRICS;
pub use obs::{
    discovery_span, emit_duplicate_item, emit_filter_activated, emit_filter_deactivated,
    emit_item_registered, emit_link_discarded, emit_link_failed, emit_link_settled,
    emit_registry_cleared, emit_unknown_id,
};
pub use telemetry::init_tracing;

/// Wishfilter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
