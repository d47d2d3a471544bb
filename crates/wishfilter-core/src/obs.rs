//! Structured observability hooks for registry lifecycle events.
//!
//! Every diagnostic the registry promises (duplicate registration, failed
//! predicate, unknown id) goes through one of these functions so the event
//! names stay stable for log pipelines. Lifecycle events are emitted at
//! `info!`, per-pair results at `debug!`, diagnostics at `warn!`.

use tracing::{debug, info, warn};

use crate::filter::FilterId;
use crate::item::ItemId;

/// Span covering one batch of discovered items, from registration until
/// its visibility is applied. Attach with `tracing::Instrument`.
pub fn discovery_span(batch: u64, size: usize) -> tracing::Span {
    tracing::info_span!("wishfilter.discovery", batch = batch, size = size)
}

pub fn emit_item_registered(item: &ItemId, title: &str, visible: bool) {
    info!(event = "item.registered", item = %item, title = %title, visible = visible);
}

pub fn emit_duplicate_item(item: &ItemId) {
    warn!(event = "item.duplicate", item = %item, "item already registered; ignoring");
}

pub fn emit_link_settled(item: &ItemId, filter: &FilterId, matched: bool, elapsed_ms: u64) {
    debug!(
        event = "link.settled",
        item = %item,
        filter = %filter,
        matched = matched,
        elapsed_ms = elapsed_ms,
    );
}

pub fn emit_link_failed(item: &ItemId, filter: &FilterId, error: &dyn std::fmt::Display) {
    warn!(event = "link.failed", item = %item, filter = %filter, error = %error);
}

/// An evaluation finished after its registry state was invalidated.
pub fn emit_link_discarded(item: &ItemId, filter: &FilterId, reason: &str) {
    debug!(event = "link.discarded", item = %item, filter = %filter, reason = %reason);
}

pub fn emit_filter_activated(filter: &FilterId, active: usize) {
    info!(event = "filter.activated", filter = %filter, active = active);
}

pub fn emit_filter_deactivated(filter: &FilterId, active: usize) {
    info!(event = "filter.deactivated", filter = %filter, active = active);
}

/// An operation referenced an id the registry does not know.
pub fn emit_unknown_id(kind: &str, id: &dyn std::fmt::Display, operation: &str) {
    warn!(event = "registry.unknown_id", kind = %kind, id = %id, operation = %operation);
}

pub fn emit_registry_cleared(items: usize, generation: u64) {
    info!(event = "registry.cleared", items = items, generation = generation);
}
