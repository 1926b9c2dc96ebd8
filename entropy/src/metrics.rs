//! Slow-path metrics for a [CachedReader](crate::CachedReader).
//!
//! Nothing on the fast path (reserve and copy) touches these counters.

use prometheus_client::{metrics::counter::Counter, registry::Registry};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// Pages refilled from the source and made active.
    pub refills: Counter,
    /// Refills that failed because the source returned an error.
    pub refill_failures: Counter,
    /// Refills skipped because another caller swapped pages while this one waited for the lock.
    pub refill_skipped: Counter,
    /// Reservations abandoned because they ran past the end of the active page.
    pub discarded: Counter,
}

impl Metrics {
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "refills",
            "Number of pages refilled from the source",
            self.refills.clone(),
        );
        registry.register(
            "refill_failures",
            "Number of refills that failed with a source error",
            self.refill_failures.clone(),
        );
        registry.register(
            "refill_skipped",
            "Number of refills skipped because the page was already swapped",
            self.refill_skipped.clone(),
        );
        registry.register(
            "discarded",
            "Number of reservations discarded at a page boundary",
            self.discarded.clone(),
        );
    }
}
