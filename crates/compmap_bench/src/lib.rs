//! Benchmark utilities.
//!
//! Workloads are random: each generation relocates `records` records drawn
//! from random offsets of `segments` fresh input segments into
//! `segments / 2` output segments.

use compmap_core::{CompactionMap, MapConfig, PartialCompactionMap, RecordId, SegmentId};
use rand::Rng;

/// A generated pass and the records it relocated.
pub struct Workload {
    /// The finalized generation.
    pub layer: PartialCompactionMap,
    /// Relocated records, in insertion order.
    pub befores: Vec<RecordId>,
    /// Input segments of the pass.
    pub segments: Vec<SegmentId>,
}

/// Generate a batch of random segment ids.
pub fn random_segments(count: usize) -> Vec<SegmentId> {
    (0..count).map(|_| SegmentId::new_random()).collect()
}

/// Generate one random pass.
pub fn random_pass(generation: u32, segments: usize, records: usize, config: &MapConfig) -> Workload {
    let mut rng = rand::thread_rng();
    let inputs = random_segments(segments.max(1));
    let outputs = random_segments((segments / 2).max(1));

    let mut layer = PartialCompactionMap::with_config(generation, config);
    let mut befores = Vec::with_capacity(records);
    let mut cursor = 0u32;
    for _ in 0..records {
        let before = RecordId::new(inputs[rng.gen_range(0..inputs.len())], rng.gen::<u32>() & !3);
        let after = RecordId::new(outputs[rng.gen_range(0..outputs.len())], cursor);
        cursor = cursor.wrapping_add(rng.gen_range(1..64) * 4);
        if layer.put(before, after).is_ok() {
            befores.push(before);
        }
    }
    layer.finalize().expect("fresh layer finalizes once");

    Workload {
        layer,
        befores,
        segments: inputs,
    }
}

/// Build a composite of `depth` random passes.
///
/// Returns the composite and the workloads' probes and input segments,
/// oldest generation first.
pub fn random_stack(
    depth: u32,
    segments: usize,
    records: usize,
    config: &MapConfig,
) -> (CompactionMap, Vec<RecordId>, Vec<Vec<SegmentId>>) {
    let mut map = CompactionMap::EMPTY;
    let mut befores = Vec::new();
    let mut inputs = Vec::new();
    for generation in 1..=depth {
        let workload = random_pass(generation, segments, records, config);
        map = map.extend(workload.layer);
        befores.extend(workload.befores);
        inputs.push(workload.segments);
    }
    (map, befores, inputs)
}
