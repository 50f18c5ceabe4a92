//! The current compaction map, shared between the compactor and readers.

use crate::composite::{CompactionMap, PruneSummary};
use crate::config::MapConfig;
use crate::error::{CoreError, CoreResult};
use crate::id::{RecordId, SegmentId};
use crate::partial::PartialCompactionMap;
use crate::stats::MapStats;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Holder of the "current" [`CompactionMap`].
///
/// The root provides:
/// - Lock-free snapshots for readers via [`load`](Self::load)
/// - Serialized generation transitions for writers
///
/// ## Single-Writer Guarantee
///
/// `extend` and `prune` take an exclusive write lock, compute the next
/// composite from the current one and publish it with a single atomic swap.
/// Several compactor or cleanup threads may call them; they simply queue.
/// Readers never take the lock. A snapshot returned by `load` is never
/// modified afterwards.
pub struct CompactionMapRoot {
    current: ArcSwap<CompactionMap>,
    write_lock: Mutex<()>,
    config: MapConfig,
    stats: MapStats,
}

impl CompactionMapRoot {
    /// Creates a root holding the empty composite.
    pub fn new(config: MapConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(CompactionMap::EMPTY),
            write_lock: Mutex::new(()),
            config,
            stats: MapStats::new(),
        }
    }

    /// Creates a root with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MapConfig::default())
    }

    /// Returns the current composite.
    ///
    /// The returned snapshot answers every query the same way for as long as
    /// it is held, regardless of later `extend` or `prune` calls.
    pub fn load(&self) -> Arc<CompactionMap> {
        self.current.load_full()
    }

    /// Starts a new generation map configured like this root.
    pub fn new_generation(&self, generation: u32) -> PartialCompactionMap {
        PartialCompactionMap::with_config(generation, &self.config)
    }

    /// Publishes `layer` as the newest generation.
    ///
    /// Fails with [`CoreError::InvalidState`] if the layer has not been
    /// finalized, since the compactor must be done writing to it.
    pub fn extend(&self, layer: PartialCompactionMap) -> CoreResult<Arc<CompactionMap>> {
        if !layer.is_finalized() {
            return Err(CoreError::invalid_state(format!(
                "generation {} must be finalized before it is published",
                layer.generation()
            )));
        }

        let _guard = self.write_lock.lock();
        let next = Arc::new(self.current.load().extend(layer));
        self.current.store(Arc::clone(&next));
        self.stats.record_extend();

        debug!(depth = next.depth(), "published compaction generation");
        self.check_pressure(&next);
        Ok(next)
    }

    /// Prunes `ids` from the current composite and publishes the result.
    ///
    /// Snapshots loaded earlier are unaffected.
    pub fn prune(&self, ids: &HashSet<SegmentId>) -> PruneSummary {
        let _guard = self.write_lock.lock();
        let (next, summary) = self.current.load().pruned(ids);
        if summary != PruneSummary::default() {
            self.current.store(Arc::new(next));
        }
        self.stats
            .record_prune(summary.records_removed, summary.layers_dropped);
        summary
    }

    /// Resolves `before` against the current composite.
    pub fn resolve(&self, before: RecordId) -> Option<RecordId> {
        let after = self.current.load().resolve(before);
        self.stats.record_lookup(after.is_some());
        after
    }

    /// Checks segment membership against the current composite.
    pub fn was_compacted(&self, segment: SegmentId) -> bool {
        self.current.load().was_compacted(segment)
    }

    /// Whether the current composite exceeds the configured weight budget.
    pub fn needs_pruning(&self) -> bool {
        match self.config.weight_budget {
            Some(budget) => self.current.load().total_weight() > budget,
            None => false,
        }
    }

    /// Returns the root's counters.
    pub fn stats(&self) -> &MapStats {
        &self.stats
    }

    /// Returns the root's configuration.
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    fn check_pressure(&self, map: &CompactionMap) {
        if map.depth() > self.config.depth_warning {
            warn!(
                depth = map.depth(),
                threshold = self.config.depth_warning,
                "compaction map depth exceeds threshold"
            );
        }
        if let Some(budget) = self.config.weight_budget {
            let weight = map.total_weight();
            if weight > budget {
                warn!(weight, budget, "compaction map weight exceeds budget");
            }
        }
    }
}

impl Default for CompactionMapRoot {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CompactionMapRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompactionMapRoot")
            .field("current", &*self.current.load())
            .field("config", &self.config)
            .finish()
    }
}
