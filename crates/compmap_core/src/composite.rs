//! Generational composite of compaction maps.
//!
//! A [`CompactionMap`] is a newest-first stack of [`PartialCompactionMap`]
//! layers that answers relocation queries as one logical map.
//!
//! ## Snapshot isolation
//!
//! The layer stack is an immutable singly-linked list of `Arc` nodes, and
//! layers themselves are shared immutably. [`CompactionMap::extend`] returns a
//! new composite that shares the whole old stack as its tail.
//! [`CompactionMap::prune`] rewrites only the handle it is called on: every
//! affected layer is replaced by a pruned copy and the list is rebuilt up to
//! the deepest affected layer. Any other handle (a clone, a snapshot held by a
//! reader) keeps answering exactly as before.
//!
//! ## Resolution
//!
//! Lookups stop at the newest layer that knows the record. Resolution is
//! one hop: if generation 1 maps `r1 → r2` and generation 2 maps `r2 → r3`,
//! `resolve(r1)` is `r2`. Chasing further is up to the caller.

use crate::id::{RecordId, SegmentId};
use crate::partial::PartialCompactionMap;
use crate::stats::{LayerTelemetry, MapTelemetry};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

struct Node {
    layer: Arc<PartialCompactionMap>,
    next: Option<Arc<Node>>,
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneSummary {
    /// Records removed across all layers.
    pub records_removed: u64,
    /// Layers replaced by a pruned copy and kept.
    pub layers_rewritten: u64,
    /// Layers dropped because they became empty.
    pub layers_dropped: u64,
}

/// A composite of compaction maps, newest generation first.
///
/// Cloning is O(1) and yields an independent handle over the same layers.
#[derive(Clone, Default)]
pub struct CompactionMap {
    head: Option<Arc<Node>>,
    depth: usize,
}

impl CompactionMap {
    /// The empty composite: zero layers, no relocations.
    pub const EMPTY: CompactionMap = CompactionMap {
        head: None,
        depth: 0,
    };

    /// Creates an empty composite.
    #[must_use]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Whether `before` was relocated to `after` by any generation.
    #[must_use]
    pub fn was_compacted_to(&self, before: RecordId, after: RecordId) -> bool {
        self.layers().any(|l| l.was_compacted_to(before, after))
    }

    /// Whether records of `segment` were relocated by any generation.
    #[must_use]
    pub fn was_compacted(&self, segment: SegmentId) -> bool {
        self.layers().any(|l| l.contains_segment(segment))
    }

    /// Returns the newest relocation of `before`, one hop only.
    #[must_use]
    pub fn resolve(&self, before: RecordId) -> Option<RecordId> {
        self.layers().find_map(|l| l.resolve(before))
    }

    /// Returns a new composite with `layer` as its newest generation.
    ///
    /// `self` is not modified; the new composite shares all existing layers.
    #[must_use]
    pub fn extend(&self, layer: impl Into<Arc<PartialCompactionMap>>) -> CompactionMap {
        let layer = layer.into();
        debug!(
            generation = layer.generation(),
            records = layer.record_count(),
            depth = self.depth + 1,
            "extended compaction map"
        );
        CompactionMap {
            head: Some(Arc::new(Node {
                layer,
                next: self.head.clone(),
            })),
            depth: self.depth + 1,
        }
    }

    /// Removes all relocations out of `ids` from this handle.
    ///
    /// Layers that become empty are dropped. Layers without any of `ids`
    /// are kept as-is, so a pass with no matching segment is a no-op.
    pub fn prune(&mut self, ids: &HashSet<SegmentId>) -> PruneSummary {
        let mut summary = PruneSummary::default();
        if ids.is_empty() {
            return summary;
        }

        let nodes: Vec<(&Arc<Node>, bool)> = self
            .nodes()
            .map(|n| (n, n.layer.contains_any(ids)))
            .collect();
        let Some(deepest) = nodes.iter().rposition(|&(_, hit)| hit) else {
            return summary;
        };

        let mut prefix: Vec<Arc<PartialCompactionMap>> = Vec::with_capacity(deepest + 1);
        for &(node, hit) in &nodes[..=deepest] {
            if !hit {
                prefix.push(Arc::clone(&node.layer));
                continue;
            }
            let mut layer = PartialCompactionMap::clone(&node.layer);
            summary.records_removed += layer.remove(ids);
            if layer.segment_count() == 0 {
                summary.layers_dropped += 1;
            } else {
                summary.layers_rewritten += 1;
                prefix.push(Arc::new(layer));
            }
        }

        let mut head = nodes[deepest].0.next.clone();
        let tail_depth = self.depth - deepest - 1;
        let depth = tail_depth + prefix.len();
        for layer in prefix.into_iter().rev() {
            head = Some(Arc::new(Node { layer, next: head }));
        }
        unlink(std::mem::replace(&mut self.head, head));
        self.depth = depth;

        debug!(
            records = summary.records_removed,
            rewritten = summary.layers_rewritten,
            dropped = summary.layers_dropped,
            depth,
            "pruned compaction map"
        );
        summary
    }

    /// Returns a pruned copy, leaving `self` untouched.
    #[must_use]
    pub fn pruned(&self, ids: &HashSet<SegmentId>) -> (CompactionMap, PruneSummary) {
        let mut map = self.clone();
        let summary = map.prune(ids);
        (map, summary)
    }

    /// Number of layers.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether there are no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Iterates the layers, newest first.
    pub fn layers(&self) -> Layers<'_> {
        Layers {
            next: self.head.as_deref(),
        }
    }

    fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        std::iter::successors(self.head.as_ref(), |n| n.next.as_ref())
    }

    /// Generation number of each layer, newest first.
    #[must_use]
    pub fn generations(&self) -> Vec<u32> {
        self.layers().map(|l| l.generation()).collect()
    }

    /// Estimated weight of each layer in bytes, newest first.
    #[must_use]
    pub fn estimated_weights(&self) -> Vec<u64> {
        self.layers().map(|l| l.estimated_weight()).collect()
    }

    /// Before-segment count of each layer, newest first.
    #[must_use]
    pub fn segment_counts(&self) -> Vec<u64> {
        self.layers().map(|l| l.segment_count()).collect()
    }

    /// Record count of each layer, newest first.
    #[must_use]
    pub fn record_counts(&self) -> Vec<u64> {
        self.layers().map(|l| l.record_count()).collect()
    }

    /// Sum of all layer weights.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.layers().map(|l| l.estimated_weight()).sum()
    }

    /// Sum of all layer record counts.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.layers().map(|l| l.record_count()).sum()
    }

    /// Per-layer diagnostics.
    #[must_use]
    pub fn telemetry(&self) -> MapTelemetry {
        let layers: Vec<LayerTelemetry> = self
            .layers()
            .map(|l| LayerTelemetry {
                generation: l.generation(),
                estimated_weight: l.estimated_weight(),
                segment_count: l.segment_count(),
                record_count: l.record_count(),
                packed: l.is_packed(),
            })
            .collect();
        MapTelemetry {
            depth: self.depth,
            total_weight: layers.iter().map(|l| l.estimated_weight).sum(),
            total_records: layers.iter().map(|l| l.record_count).sum(),
            layers,
        }
    }
}

/// Drops the uniquely owned prefix of a list one node at a time, stopping at
/// the first node another handle still shares. Plain drop glue would recurse
/// once per node.
fn unlink(mut next: Option<Arc<Node>>) {
    while let Some(node) = next {
        match Arc::try_unwrap(node) {
            Ok(mut node) => next = node.next.take(),
            Err(_) => break,
        }
    }
}

impl Drop for CompactionMap {
    fn drop(&mut self) {
        unlink(self.head.take());
    }
}

impl fmt::Debug for CompactionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactionMap")
            .field("depth", &self.depth)
            .field("generations", &self.generations())
            .finish()
    }
}

/// Iterator over the layers of a [`CompactionMap`], newest first.
pub struct Layers<'a> {
    next: Option<&'a Node>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a PartialCompactionMap;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(node.layer.as_ref())
    }
}
