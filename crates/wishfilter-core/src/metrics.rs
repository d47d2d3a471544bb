//! Global atomic counters for registry activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. after a discovery batch settles).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters. No allocation or locking on increment.
pub struct Metrics {
    items_registered: AtomicU64,
    predicates_evaluated: AtomicU64,
    predicate_failures: AtomicU64,
    stale_outcomes: AtomicU64,
    visibility_changes: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            items_registered: AtomicU64::new(0),
            predicates_evaluated: AtomicU64::new(0),
            predicate_failures: AtomicU64::new(0),
            stale_outcomes: AtomicU64::new(0),
            visibility_changes: AtomicU64::new(0),
        }
    }

    pub fn inc_items_registered(&self) {
        self.items_registered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "items_registered", "counter incremented");
    }

    pub fn inc_predicates_evaluated(&self) {
        self.predicates_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "predicates_evaluated", "counter incremented");
    }

    pub fn inc_predicate_failures(&self) {
        self.predicate_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "predicate_failures", "counter incremented");
    }

    /// An outcome arrived after its item, filter or registry generation was gone.
    pub fn inc_stale_outcomes(&self) {
        self.stale_outcomes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stale_outcomes", "counter incremented");
    }

    pub fn inc_visibility_changes(&self) {
        self.visibility_changes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "visibility_changes", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            items_registered = self.items_registered(),
            predicates_evaluated = self.predicates_evaluated(),
            predicate_failures = self.predicate_failures(),
            stale_outcomes = self.stale_outcomes(),
            visibility_changes = self.visibility_changes(),
        );
    }

    pub fn items_registered(&self) -> u64 {
        self.items_registered.load(Ordering::Relaxed)
    }

    pub fn predicates_evaluated(&self) -> u64 {
        self.predicates_evaluated.load(Ordering::Relaxed)
    }

    pub fn predicate_failures(&self) -> u64 {
        self.predicate_failures.load(Ordering::Relaxed)
    }

    pub fn stale_outcomes(&self) -> u64 {
        self.stale_outcomes.load(Ordering::Relaxed)
    }

    pub fn visibility_changes(&self) -> u64 {
        self.visibility_changes.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.items_registered.store(0, Ordering::Relaxed);
        self.predicates_evaluated.store(0, Ordering::Relaxed);
        self.predicate_failures.store(0, Ordering::Relaxed);
        self.stale_outcomes.store(0, Ordering::Relaxed);
        self.visibility_changes.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_items_registered();
        m.inc_items_registered();
        assert_eq!(m.items_registered(), 2);

        m.inc_predicates_evaluated();
        m.inc_predicate_failures();
        assert_eq!(m.predicates_evaluated(), 1);
        assert_eq!(m.predicate_failures(), 1);

        m.inc_stale_outcomes();
        m.inc_visibility_changes();
        m.inc_visibility_changes();
        assert_eq!(m.stale_outcomes(), 1);
        assert_eq!(m.visibility_changes(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_items_registered();
        m.inc_predicate_failures();
        m.inc_visibility_changes();
        m.reset();
        assert_eq!(m.items_registered(), 0);
        assert_eq!(m.predicate_failures(), 0);
        assert_eq!(m.visibility_changes(), 0);
    }
}
