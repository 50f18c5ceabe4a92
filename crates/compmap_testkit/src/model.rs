//! Reference model for composite compaction maps.
//!
//! [`ReferenceModel`] is a deliberately naive newest-first list of ordered
//! maps. Property tests drive a [`CompactionMap`] and the model with the same
//! operations and compare their answers with [`check_against_model`].

use crate::generators::MapOperation;
use compmap_core::{CompactionMap, PartialCompactionMap, RecordId, SegmentId};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Naive composite: one ordered map per generation, newest first.
#[derive(Debug, Clone, Default)]
pub struct ReferenceModel {
    layers: Vec<(u32, BTreeMap<RecordId, RecordId>)>,
}

impl ReferenceModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a generation.
    pub fn extend(&mut self, generation: u32, entries: &[(RecordId, RecordId)]) {
        let layer = entries.iter().copied().collect();
        self.layers.insert(0, (generation, layer));
    }

    /// Removes entries of `ids` and drops layers that became empty.
    pub fn prune(&mut self, ids: &HashSet<SegmentId>) {
        self.layers.retain_mut(|(_, layer)| {
            let before = layer.len();
            layer.retain(|k, _| !ids.contains(&k.segment()));
            layer.len() == before || !layer.is_empty()
        });
    }

    /// First answer scanning newest to oldest.
    pub fn resolve(&self, before: RecordId) -> Option<RecordId> {
        self.layers
            .iter()
            .find_map(|(_, layer)| layer.get(&before).copied())
    }

    /// Whether any layer maps `before` to `after`.
    pub fn was_compacted_to(&self, before: RecordId, after: RecordId) -> bool {
        self.layers
            .iter()
            .any(|(_, layer)| layer.get(&before) == Some(&after))
    }

    /// Whether any layer has a key in `segment`.
    pub fn was_compacted(&self, segment: SegmentId) -> bool {
        self.layers
            .iter()
            .any(|(_, layer)| layer.keys().any(|k| k.segment() == segment))
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Generation numbers, newest first.
    pub fn generations(&self) -> Vec<u32> {
        self.layers.iter().map(|(g, _)| *g).collect()
    }

    /// Record counts, newest first.
    pub fn record_counts(&self) -> Vec<u64> {
        self.layers.iter().map(|(_, l)| l.len() as u64).collect()
    }

    /// Segment counts, newest first.
    pub fn segment_counts(&self) -> Vec<u64> {
        self.layers
            .iter()
            .map(|(_, l)| l.keys().map(|k| k.segment()).collect::<BTreeSet<_>>().len() as u64)
            .collect()
    }
}

/// Applies one writer operation to both a composite and the model.
///
/// `generation` numbers the layer if the operation is an extend.
pub fn apply_operation(
    map: &mut CompactionMap,
    model: &mut ReferenceModel,
    generation: u32,
    operation: &MapOperation,
) {
    match operation {
        MapOperation::Extend(entries) => {
            let layer = PartialCompactionMap::from_entries(generation, entries.iter().copied())
                .expect("generated entries are well formed");
            *map = map.extend(layer);
            model.extend(generation, entries);
        }
        MapOperation::Prune(ids) => {
            map.prune(ids);
            model.prune(ids);
        }
    }
}

/// Compares every query and diagnostic of `map` with `model`.
///
/// Returns a description of the first difference found.
pub fn check_against_model(
    map: &CompactionMap,
    model: &ReferenceModel,
    records: &[RecordId],
    segments: &[SegmentId],
) -> Result<(), String> {
    if map.depth() != model.depth() {
        return Err(format!("depth {} != model {}", map.depth(), model.depth()));
    }
    if map.generations() != model.generations() {
        return Err(format!(
            "generations {:?} != model {:?}",
            map.generations(),
            model.generations()
        ));
    }
    if map.record_counts() != model.record_counts() {
        return Err(format!(
            "record counts {:?} != model {:?}",
            map.record_counts(),
            model.record_counts()
        ));
    }
    if map.segment_counts() != model.segment_counts() {
        return Err(format!(
            "segment counts {:?} != model {:?}",
            map.segment_counts(),
            model.segment_counts()
        ));
    }
    for &record in records {
        let (actual, expected) = (map.resolve(record), model.resolve(record));
        if actual != expected {
            return Err(format!("resolve({record}) = {actual:?}, model {expected:?}"));
        }
        if let Some(after) = expected {
            if !map.was_compacted_to(record, after) {
                return Err(format!("was_compacted_to({record}, {after}) is false"));
            }
        }
    }
    for &segment in segments {
        if map.was_compacted(segment) != model.was_compacted(segment) {
            return Err(format!("was_compacted({segment}) differs from model"));
        }
    }
    Ok(())
}

/// Captures the answers a composite gives for `records`.
pub fn answers(map: &CompactionMap, records: &[RecordId]) -> Vec<Option<RecordId>> {
    records.iter().map(|&r| map.resolve(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::written_segment;
    use crate::generators::*;
    use proptest::prelude::*;

    const MAX_OPS: u32 = 8;

    fn probe_records() -> Vec<RecordId> {
        (0..=MAX_OPS + 1)
            .flat_map(|g| {
                (0..POOL_SEGMENTS).flat_map(move |i| {
                    (0..POOL_OFFSETS * 4)
                        .map(move |slot| RecordId::new(written_segment(g, i), slot * 4))
                })
            })
            .collect()
    }

    fn probe_segments() -> Vec<SegmentId> {
        (0..=MAX_OPS + 1)
            .flat_map(|g| (0..POOL_SEGMENTS).map(move |i| written_segment(g, i)))
            .collect()
    }

    #[test]
    fn model_prune_keeps_untouched_empty_layers() {
        let mut model = ReferenceModel::new();
        model.extend(1, &[]);
        model.prune(&HashSet::from([written_segment(0, 0)]));
        assert_eq!(model.depth(), 1);
    }

    proptest! {
        #![proptest_config(PropTestConfig::default().to_proptest_config())]

        #[test]
        fn composite_matches_model(ops in operation_sequence_strategy(MAX_OPS)) {
            let mut map = CompactionMap::EMPTY;
            let mut model = ReferenceModel::new();
            let (records, segments) = (probe_records(), probe_segments());

            for (g, op) in ops.iter().enumerate() {
                apply_operation(&mut map, &mut model, g as u32, op);
                let checked = check_against_model(&map, &model, &records, &segments);
                prop_assert!(checked.is_ok(), "{:?}", checked);
            }
        }

        #[test]
        fn newest_layer_wins(
            layers in layers_strategy(4),
            extra in layer_entries_strategy(4),
        ) {
            let base = layers
                .iter()
                .enumerate()
                .fold(CompactionMap::EMPTY, |map, (g, entries)| {
                    map.extend(
                        PartialCompactionMap::from_entries(g as u32, entries.iter().copied())
                            .unwrap(),
                    )
                });
            let layer = PartialCompactionMap::from_entries(4, extra.iter().copied()).unwrap();
            let extended = base.extend(layer);

            prop_assert_eq!(extended.depth(), base.depth() + 1);
            let newest: BTreeMap<_, _> = extra.iter().copied().collect();
            for (before, after) in newest {
                prop_assert_eq!(extended.resolve(before), Some(after));
            }
        }

        #[test]
        fn snapshots_never_change(ops in operation_sequence_strategy(MAX_OPS)) {
            let records = probe_records();
            let mut map = CompactionMap::EMPTY;
            let mut model = ReferenceModel::new();
            let mut snapshots = Vec::new();

            for (g, op) in ops.iter().enumerate() {
                let snapshot = map.clone();
                snapshots.push((answers(&snapshot, &records), snapshot.telemetry(), snapshot));
                apply_operation(&mut map, &mut model, g as u32, op);
            }

            for (expected, telemetry, snapshot) in &snapshots {
                prop_assert_eq!(&answers(snapshot, &records), expected);
                prop_assert_eq!(&snapshot.telemetry(), telemetry);
            }
        }

        #[test]
        fn prune_is_idempotent(
            layers in layers_strategy(4),
            ids in segment_set_strategy(4),
        ) {
            let records = probe_records();
            let map = layers
                .iter()
                .enumerate()
                .fold(CompactionMap::EMPTY, |map, (g, entries)| {
                    map.extend(
                        PartialCompactionMap::from_entries(g as u32, entries.iter().copied())
                            .unwrap(),
                    )
                });

            let (once, _) = map.pruned(&ids);
            let (twice, second) = once.pruned(&ids);

            prop_assert_eq!(second.records_removed, 0);
            prop_assert_eq!(once.telemetry(), twice.telemetry());
            prop_assert_eq!(answers(&once, &records), answers(&twice, &records));
            for id in &ids {
                prop_assert!(!once.was_compacted(*id));
            }
        }

        #[test]
        fn packed_and_live_tiers_agree(entries in layer_entries_strategy(3)) {
            let mut live = PartialCompactionMap::new(3);
            for &(before, after) in &entries {
                live.put(before, after).unwrap();
            }
            let mut packed = live.clone();
            packed.finalize().unwrap();

            prop_assert_eq!(packed.record_count(), live.record_count());
            prop_assert_eq!(packed.segment_count(), live.segment_count());
            prop_assert_eq!(packed.entries(), live.entries());
            for record in probe_records() {
                prop_assert_eq!(packed.resolve(record), live.resolve(record));
            }
            for segment in probe_segments() {
                prop_assert_eq!(packed.contains_segment(segment), live.contains_segment(segment));
            }
        }
    }
}
