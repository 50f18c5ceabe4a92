//! Identifier and generation fixtures.
//!
//! Segment ids built here follow one scheme: the segment written by
//! generation `g` with index `i` is `SegmentId::from_parts(g, i)`. Generation
//! 0 stands for the data that existed before any compaction ran.

use compmap_core::{CompactionMap, PartialCompactionMap, RecordId, SegmentId};

/// Offset stride between consecutive records in fixture segments.
pub const RECORD_STRIDE: u32 = 16;

/// Shorthand for a segment id from a small integer.
pub fn seg(n: u128) -> SegmentId {
    SegmentId::from_u128(n)
}

/// Shorthand for a record id from a small segment number and an offset.
pub fn rec(segment: u128, offset: u32) -> RecordId {
    RecordId::new(seg(segment), offset)
}

/// The `index`-th segment written by `generation`.
pub fn written_segment(generation: u32, index: u32) -> SegmentId {
    SegmentId::from_parts(u64::from(generation), u64::from(index))
}

/// Records that generation `generation` relocates, before compaction.
///
/// These live in the segments written by the previous generation.
pub fn before_records(generation: u32, segments: u32, records: u32) -> Vec<RecordId> {
    (0..segments)
        .flat_map(|i| {
            (0..records).map(move |j| {
                RecordId::new(written_segment(generation - 1, i), j * RECORD_STRIDE)
            })
        })
        .collect()
}

/// Builds an unfinalized pass for `generation`.
///
/// Every pair of input segments is merged into one output segment, the
/// usual shape of a compaction that drops garbage between live records.
pub fn pass_entries(generation: u32, segments: u32, records: u32) -> Vec<(RecordId, RecordId)> {
    before_records(generation, segments, records)
        .into_iter()
        .map(|before| {
            let index = before.segment().lsb() as u32;
            let slot = (index % 2) * records + before.offset() / RECORD_STRIDE;
            let after = RecordId::new(written_segment(generation, index / 2), slot * RECORD_STRIDE);
            (before, after)
        })
        .collect()
}

/// Builds a finalized pass for `generation`.
pub fn pass(generation: u32, segments: u32, records: u32) -> PartialCompactionMap {
    PartialCompactionMap::from_entries(generation, pass_entries(generation, segments, records))
        .expect("fixture entries are well formed")
}

/// Builds a composite of `generations` chained passes, generation 1 oldest.
///
/// Each pass relocates records out of the segments the previous one wrote,
/// so `resolve` hops exactly one generation at a time.
pub fn chain(generations: u32, segments: u32, records: u32) -> CompactionMap {
    (1..=generations).fold(CompactionMap::EMPTY, |map, g| {
        // later passes only see the segments their predecessor produced
        let input = (1..g).fold(segments, |n, _| n.div_ceil(2)).max(1);
        map.extend(pass(g, input, records))
    })
}

/// Single generation mapping `r1 (s1, 0) → r2 (s2, 0)`.
pub fn single_relocation() -> (CompactionMap, RecordId, RecordId) {
    let (r1, r2) = (rec(1, 0), rec(2, 0));
    let layer = PartialCompactionMap::from_entries(1, [(r1, r2)])
        .expect("fixture entries are well formed");
    (CompactionMap::EMPTY.extend(layer), r1, r2)
}

/// Two generations mapping `r1 → r2` and then `r2 → r3`.
pub fn two_hop_chain() -> (CompactionMap, [RecordId; 3]) {
    let (r1, r2, r3) = (rec(1, 0), rec(2, 0), rec(3, 0));
    let first = PartialCompactionMap::from_entries(1, [(r1, r2)])
        .expect("fixture entries are well formed");
    let second = PartialCompactionMap::from_entries(2, [(r2, r3)])
        .expect("fixture entries are well formed");
    (CompactionMap::EMPTY.extend(first).extend(second), [r1, r2, r3])
}
