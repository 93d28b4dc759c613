//! # Engine resource counters.
//!
//! [`EngineStats`] is a set of relaxed atomics updated by the driver and producers.
//! Cells may read it (see `Graph::stats`) to sample the engine's own resource usage;
//! the sampling cell is an ordinary client of the engine.
//!
//! ```text
//! Driver ──► passes / evaluations / failures / arrivals / timer_fires / input_changes
//!        └─► cached_bytes (sum of cached values after each pass)
//! Producer ─► dropped_items
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between the engine and the cells that observe it.
#[derive(Debug, Default)]
pub struct EngineStats {
    passes: AtomicU64,
    evaluations: AtomicU64,
    failures: AtomicU64,
    arrivals: AtomicU64,
    timer_fires: AtomicU64,
    input_changes: AtomicU64,
    dropped_items: AtomicU64,
    cached_bytes: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub passes: u64,
    pub evaluations: u64,
    pub failures: u64,
    pub arrivals: u64,
    pub timer_fires: u64,
    pub input_changes: u64,
    pub dropped_items: u64,
    /// Approximate heap footprint of all cached values.
    pub cached_bytes: u64,
}

impl StatsSnapshot {
    /// Cached value footprint in megabytes.
    pub fn cached_megabytes(&self) -> f64 {
        self.cached_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_pass(&self, evaluated: u64, failed: u64) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.evaluations.fetch_add(evaluated, Ordering::Relaxed);
        self.failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub(crate) fn record_arrival(&self) {
        self.arrivals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timer_fire(&self) {
        self.timer_fires.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_input_change(&self) {
        self.input_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_items.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_cached_bytes(&self, bytes: u64) {
        self.cached_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Reads all counters. Individual fields are consistent, the set as a whole is not.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            arrivals: self.arrivals.load(Ordering::Relaxed),
            timer_fires: self.timer_fires.load(Ordering::Relaxed),
            input_changes: self.input_changes.load(Ordering::Relaxed),
            dropped_items: self.dropped_items.load(Ordering::Relaxed),
            cached_bytes: self.cached_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = EngineStats::new();
        stats.record_pass(3, 1);
        stats.record_pass(2, 0);
        stats.record_arrival();
        stats.record_dropped();
        stats.set_cached_bytes(2 * 1024 * 1024);

        let snap = stats.snapshot();
        assert_eq!(snap.passes, 2);
        assert_eq!(snap.evaluations, 5);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.arrivals, 1);
        assert_eq!(snap.dropped_items, 1);
        assert_eq!(snap.cached_megabytes(), 2.0);
    }
}
