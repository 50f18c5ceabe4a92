//! Forwarding table for a single compaction pass.
//!
//! A [`PartialCompactionMap`] is populated by the compactor while it rewrites
//! live records into fresh segments, then finalized. Finalizing freezes the
//! record and segment counters and, by default, swaps the exact live index for
//! the packed encoding in [`crate::packed`].
//!
//! ## Lifecycle
//!
//! ```text
//! new() -> put()* -> finalize() -> resolve()/contains_segment()* -> remove()* -> dropped
//! ```
//!
//! ## Invariants
//!
//! - A record is never relocated into its own segment
//! - A segment written by this pass is never a before-segment of this pass
//! - Counters are exact: they change only by the number of entries actually
//!   inserted or removed

use crate::config::MapConfig;
use crate::error::{CoreError, CoreResult};
use crate::id::{RecordId, SegmentId};
use crate::packed::PackedTable;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::mem::size_of;
use tracing::debug;

/// Amortized B-tree bookkeeping per live entry, on top of the key and value.
const LIVE_ENTRY_OVERHEAD: u64 = 16;

#[derive(Debug, Clone)]
enum Tier {
    /// Exact, mutable index used while the pass is being populated.
    Live {
        entries: BTreeMap<RecordId, RecordId>,
        after_segments: BTreeSet<SegmentId>,
    },
    /// Compact encoding built at finalize time.
    Packed(PackedTable),
}

/// The before → after record mapping produced by one compaction pass.
#[derive(Debug, Clone)]
pub struct PartialCompactionMap {
    generation: u32,
    tier: Tier,
    finalized: bool,
    pack_on_finalize: bool,
    record_count: u64,
    segment_count: u64,
}

impl PartialCompactionMap {
    /// Creates an empty map for the given compaction generation.
    #[must_use]
    pub fn new(generation: u32) -> Self {
        Self::with_config(generation, &MapConfig::default())
    }

    /// Creates an empty map using the given configuration.
    #[must_use]
    pub fn with_config(generation: u32, config: &MapConfig) -> Self {
        Self {
            generation,
            tier: Tier::Live {
                entries: BTreeMap::new(),
                after_segments: BTreeSet::new(),
            },
            finalized: false,
            pack_on_finalize: config.pack_on_finalize,
            record_count: 0,
            segment_count: 0,
        }
    }

    /// Builds and finalizes a map from `(before, after)` pairs.
    pub fn from_entries<I>(generation: u32, entries: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (RecordId, RecordId)>,
    {
        let mut map = Self::new(generation);
        for (before, after) in entries {
            map.put(before, after)?;
        }
        map.finalize()?;
        Ok(map)
    }

    /// The compaction generation that produced this map.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether [`finalize`](Self::finalize) has been called.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Whether the entries are held in the packed encoding.
    #[must_use]
    pub fn is_packed(&self) -> bool {
        matches!(self.tier, Tier::Packed(_))
    }

    /// Records that `before` was relocated to `after`.
    ///
    /// Overwrites any earlier mapping for `before`. Fails with
    /// [`CoreError::InvalidState`] once the map is finalized and with
    /// [`CoreError::InvalidArgument`] if the pair would break the
    /// before/after segment separation of a single pass.
    pub fn put(&mut self, before: RecordId, after: RecordId) -> CoreResult<()> {
        if self.finalized {
            return Err(CoreError::invalid_state(format!(
                "generation {} is finalized, cannot put {before}",
                self.generation
            )));
        }
        let Tier::Live {
            entries,
            after_segments,
        } = &mut self.tier
        else {
            return Err(CoreError::invalid_state(format!(
                "generation {} is packed",
                self.generation
            )));
        };

        if before.segment() == after.segment() {
            return Err(CoreError::invalid_argument(format!(
                "record {before} cannot be relocated into its own segment"
            )));
        }
        if after_segments.contains(&before.segment()) {
            return Err(CoreError::invalid_argument(format!(
                "segment {} was written by generation {}",
                before.segment(),
                self.generation
            )));
        }
        if live_contains_segment(entries, after.segment()) {
            return Err(CoreError::invalid_argument(format!(
                "segment {} was compacted by generation {}",
                after.segment(),
                self.generation
            )));
        }

        let new_segment = !live_contains_segment(entries, before.segment());
        if entries.insert(before, after).is_none() {
            self.record_count += 1;
        }
        if new_segment {
            self.segment_count += 1;
        }
        after_segments.insert(after.segment());
        Ok(())
    }

    /// Ends population of this map.
    ///
    /// Counters are frozen at their current values. Unless the map was
    /// configured otherwise, the live index is replaced by the packed tier.
    pub fn finalize(&mut self) -> CoreResult<()> {
        if self.finalized {
            return Err(CoreError::invalid_state(format!(
                "generation {} is already finalized",
                self.generation
            )));
        }
        let live_weight = self.estimated_weight();

        if self.pack_on_finalize {
            if let Tier::Live { entries, .. } = &mut self.tier {
                let entries = std::mem::take(entries);
                self.tier = Tier::Packed(PackedTable::from_sorted(entries));
            }
        }
        self.finalized = true;

        debug!(
            generation = self.generation,
            records = self.record_count,
            segments = self.segment_count,
            live_weight,
            weight = self.estimated_weight(),
            "finalized compaction generation"
        );
        Ok(())
    }

    /// Returns the after id `before` was relocated to by this pass.
    #[must_use]
    pub fn resolve(&self, before: RecordId) -> Option<RecordId> {
        match &self.tier {
            Tier::Live { entries, .. } => entries.get(&before).copied(),
            Tier::Packed(table) => table.get(before),
        }
    }

    /// Whether this pass relocated `before` to exactly `after`.
    #[must_use]
    pub fn was_compacted_to(&self, before: RecordId, after: RecordId) -> bool {
        self.resolve(before) == Some(after)
    }

    /// Whether some record of `segment` was relocated by this pass.
    #[must_use]
    pub fn contains_segment(&self, segment: SegmentId) -> bool {
        match &self.tier {
            Tier::Live { entries, .. } => live_contains_segment(entries, segment),
            Tier::Packed(table) => table.contains_segment(segment),
        }
    }

    /// Whether any of `ids` is a before-segment of this pass.
    #[must_use]
    pub fn contains_any(&self, ids: &HashSet<SegmentId>) -> bool {
        if ids.len() as u64 > self.segment_count {
            self.segment_ids().any(|s| ids.contains(&s))
        } else {
            ids.iter().any(|&s| self.contains_segment(s))
        }
    }

    /// Removes every entry whose before id lies in one of `ids`.
    ///
    /// Returns the number of entries removed. Segments not present are
    /// ignored, so repeated calls with the same set are no-ops.
    pub fn remove(&mut self, ids: &HashSet<SegmentId>) -> u64 {
        let (records, segments) = match &mut self.tier {
            Tier::Live {
                entries,
                after_segments,
            } => {
                let before = entries.len() as u64;
                let mut segments = 0u64;
                for &segment in ids {
                    let keys: Vec<RecordId> = entries
                        .range(segment_range(segment))
                        .map(|(k, _)| *k)
                        .collect();
                    if !keys.is_empty() {
                        segments += 1;
                    }
                    for key in keys {
                        entries.remove(&key);
                    }
                }
                if segments > 0 {
                    *after_segments = entries.values().map(|v| v.segment()).collect();
                }
                (before - entries.len() as u64, segments)
            }
            Tier::Packed(table) => {
                if !ids.iter().any(|&s| table.contains_segment(s)) {
                    return 0;
                }
                let (pruned, records, segments) = table.without(ids);
                *table = pruned;
                (records, segments)
            }
        };

        self.record_count -= records;
        self.segment_count -= segments;
        records
    }

    /// Estimated memory footprint in bytes.
    #[must_use]
    pub fn estimated_weight(&self) -> u64 {
        let inline = size_of::<Self>() as u64;
        match &self.tier {
            Tier::Live {
                entries,
                after_segments,
            } => {
                let entry = 2 * size_of::<RecordId>() as u64 + LIVE_ENTRY_OVERHEAD;
                inline
                    + entries.len() as u64 * entry
                    + after_segments.len() as u64 * size_of::<SegmentId>() as u64
            }
            Tier::Packed(table) => inline + table.estimated_weight(),
        }
    }

    /// Number of distinct before-segments.
    #[must_use]
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    /// Number of relocated records.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Whether no entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Number of distinct segments the remaining entries were written to.
    #[must_use]
    pub fn after_segment_count(&self) -> u64 {
        match &self.tier {
            Tier::Live { after_segments, .. } => after_segments.len() as u64,
            Tier::Packed(table) => table.after_segment_count(),
        }
    }

    /// Before-segments in ascending order.
    pub fn segment_ids(&self) -> Box<dyn Iterator<Item = SegmentId> + '_> {
        match &self.tier {
            Tier::Live { entries, .. } => {
                let mut last = None;
                Box::new(entries.keys().filter_map(move |k| {
                    let segment = k.segment();
                    (last.replace(segment) != Some(segment)).then_some(segment)
                }))
            }
            Tier::Packed(table) => Box::new(table.segments()),
        }
    }

    /// Iterates the live index in before-id order.
    ///
    /// Returns `None` once the map is packed; use [`entries`](Self::entries)
    /// to decode a packed map.
    pub fn iter(&self) -> Option<impl Iterator<Item = (RecordId, RecordId)> + '_> {
        match &self.tier {
            Tier::Live { entries, .. } => Some(entries.iter().map(|(k, v)| (*k, *v))),
            Tier::Packed(_) => None,
        }
    }

    /// Decodes every entry in before-id order, regardless of tier.
    ///
    /// Intended for diagnostics and tests; lookups never need this.
    pub fn entries(&self) -> Vec<(RecordId, RecordId)> {
        match &self.tier {
            Tier::Live { entries, .. } => entries.iter().map(|(k, v)| (*k, *v)).collect(),
            Tier::Packed(table) => table.entries().collect(),
        }
    }
}

fn segment_range(segment: SegmentId) -> std::ops::RangeInclusive<RecordId> {
    RecordId::new(segment, 0)..=RecordId::new(segment, u32::MAX)
}

fn live_contains_segment(entries: &BTreeMap<RecordId, RecordId>, segment: SegmentId) -> bool {
    entries.range(segment_range(segment)).next().is_some()
}
