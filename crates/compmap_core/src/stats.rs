//! Compaction map statistics and telemetry.
//!
//! [`MapStats`] holds atomic counters maintained by
//! [`CompactionMapRoot`](crate::CompactionMapRoot). [`MapTelemetry`] is a
//! serializable per-layer breakdown of one composite, meant for management
//! consoles and memory-pressure controllers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Compaction map counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct MapStats {
    /// Reference lookups served through the root.
    lookups: AtomicU64,
    /// Lookups that found a relocation.
    hits: AtomicU64,
    /// Generations prepended.
    extends: AtomicU64,
    /// Prune passes applied.
    prunes: AtomicU64,
    /// Records removed by pruning.
    records_pruned: AtomicU64,
    /// Layers dropped because pruning emptied them.
    layers_dropped: AtomicU64,
}

impl MapStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_extend(&self) {
        self.extends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prune(&self, records: u64, layers: u64) {
        self.prunes.fetch_add(1, Ordering::Relaxed);
        self.records_pruned.fetch_add(records, Ordering::Relaxed);
        self.layers_dropped.fetch_add(layers, Ordering::Relaxed);
    }

    /// Returns the number of lookups.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups that found a relocation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of generations prepended.
    pub fn extends(&self) -> u64 {
        self.extends.load(Ordering::Relaxed)
    }

    /// Returns the number of prune passes.
    pub fn prunes(&self) -> u64 {
        self.prunes.load(Ordering::Relaxed)
    }

    /// Returns the number of records removed by pruning.
    pub fn records_pruned(&self) -> u64 {
        self.records_pruned.load(Ordering::Relaxed)
    }

    /// Returns the number of layers dropped by pruning.
    pub fn layers_dropped(&self) -> u64 {
        self.layers_dropped.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lookups: self.lookups(),
            hits: self.hits(),
            extends: self.extends(),
            prunes: self.prunes(),
            records_pruned: self.records_pruned(),
            layers_dropped: self.layers_dropped(),
        }
    }
}

/// A point-in-time copy of [`MapStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Reference lookups served.
    pub lookups: u64,
    /// Lookups that found a relocation.
    pub hits: u64,
    /// Generations prepended.
    pub extends: u64,
    /// Prune passes applied.
    pub prunes: u64,
    /// Records removed by pruning.
    pub records_pruned: u64,
    /// Layers dropped by pruning.
    pub layers_dropped: u64,
}

/// Diagnostics for one layer of a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerTelemetry {
    /// Compaction generation of the layer.
    pub generation: u32,
    /// Estimated memory footprint in bytes.
    pub estimated_weight: u64,
    /// Number of before-segments.
    pub segment_count: u64,
    /// Number of relocated records.
    pub record_count: u64,
    /// Whether the layer uses the packed encoding.
    pub packed: bool,
}

/// Diagnostics for a whole composite, layers newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MapTelemetry {
    /// Number of layers.
    pub depth: usize,
    /// Sum of all layer weights.
    pub total_weight: u64,
    /// Sum of all layer record counts.
    pub total_records: u64,
    /// Per-layer breakdown.
    pub layers: Vec<LayerTelemetry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = MapStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = MapStats::new();
        stats.record_lookup(true);
        stats.record_lookup(false);
        stats.record_extend();
        stats.record_prune(12, 1);
        stats.record_prune(0, 0);

        let snap = stats.snapshot();
        assert_eq!(snap.lookups, 2);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.extends, 1);
        assert_eq!(snap.prunes, 2);
        assert_eq!(snap.records_pruned, 12);
        assert_eq!(snap.layers_dropped, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(MapStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for i in 0..100 {
                        s.record_lookup(i % 2 == 0);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.lookups(), 800);
        assert_eq!(stats.hits(), 400);
    }
}
