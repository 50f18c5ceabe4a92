//! Property-based test generators using proptest.
//!
//! Identifiers are drawn from small pools so that generated layers overlap
//! and queries actually hit. Layer `g` relocates records out of segments
//! written by generations `0..=g` into segments written by `g + 1`, which
//! keeps the before/after separation a single pass requires.

use crate::fixtures::written_segment;
use compmap_core::{RecordId, SegmentId};
use proptest::prelude::*;
use std::collections::HashSet;

/// Segments per generation in the identifier pool.
pub const POOL_SEGMENTS: u32 = 4;

/// Distinct offsets per segment in the identifier pool.
pub const POOL_OFFSETS: u32 = 8;

/// Strategy for a segment written by some generation in `0..=max_generation`.
pub fn segment_id_strategy(max_generation: u32) -> impl Strategy<Value = SegmentId> {
    (0..=max_generation, 0..POOL_SEGMENTS).prop_map(|(g, i)| written_segment(g, i))
}

/// Strategy for a record in a segment from `segment_id_strategy`.
pub fn record_id_strategy(max_generation: u32) -> impl Strategy<Value = RecordId> {
    (segment_id_strategy(max_generation), 0..POOL_OFFSETS)
        .prop_map(|(segment, slot)| RecordId::new(segment, slot * 4))
}

/// Strategy for the entries of generation `generation`.
pub fn layer_entries_strategy(
    generation: u32,
) -> impl Strategy<Value = Vec<(RecordId, RecordId)>> {
    let after = (0..POOL_SEGMENTS, 0..POOL_OFFSETS * 4)
        .prop_map(move |(i, slot)| RecordId::new(written_segment(generation + 1, i), slot * 4));
    prop::collection::vec((record_id_strategy(generation), after), 1..24)
}

/// Strategy for a stack of layers, oldest first.
///
/// Element `g` holds the entries of generation `g`.
pub fn layers_strategy(max_layers: u32) -> impl Strategy<Value = Vec<Vec<(RecordId, RecordId)>>> {
    (1..=max_layers).prop_flat_map(|n| {
        (0..n)
            .map(layer_entries_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for a set of segments to prune.
pub fn segment_set_strategy(max_generation: u32) -> impl Strategy<Value = HashSet<SegmentId>> {
    prop::collection::hash_set(segment_id_strategy(max_generation), 0..6)
}

/// Writer-side operation on a composite.
#[derive(Debug, Clone)]
pub enum MapOperation {
    /// Prepend a generation built from these entries.
    Extend(Vec<(RecordId, RecordId)>),
    /// Prune these segments.
    Prune(HashSet<SegmentId>),
}

/// Strategy for a sequence of writer operations.
///
/// Extends are numbered by position, so generation `g` of the sequence is
/// the `g`-th operation.
pub fn operation_sequence_strategy(max_ops: u32) -> impl Strategy<Value = Vec<MapOperation>> {
    (1..=max_ops).prop_flat_map(move |n| {
        (0..n)
            .map(|g| {
                prop_oneof![
                    3 => layer_entries_strategy(g).prop_map(MapOperation::Extend),
                    1 => segment_set_strategy(max_ops).prop_map(MapOperation::Prune),
                ]
            })
            .collect::<Vec<_>>()
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn layer_entries_keep_segments_apart(entries in layer_entries_strategy(2)) {
            for (before, after) in entries {
                prop_assert!(before.segment().msb() <= 2);
                prop_assert_eq!(after.segment().msb(), 3);
            }
        }

        #[test]
        fn layers_are_numbered_oldest_first(layers in layers_strategy(4)) {
            prop_assert!(!layers.is_empty());
            for (g, entries) in layers.iter().enumerate() {
                for (_, after) in entries {
                    prop_assert_eq!(after.segment().msb(), g as u64 + 1);
                }
            }
        }
    }
}
