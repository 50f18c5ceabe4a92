//! Packed tier of a generation map.
//!
//! Entries are grouped by before-segment. Each group is a run of varint
//! triples in ascending before-offset order:
//!
//! ```text
//! | before_offset_delta (uvarint) | after_segment_index (uvarint) | after_offset_delta (zigzag varint) |
//! ```
//!
//! `after_segment_index` points into a deduplicated table of the segments the
//! pass wrote. Group headers stay uncompressed and sorted so that segment
//! membership is a binary search and a point lookup only decodes one group.
//! Deltas restart at every group, so dropping groups copies the surviving
//! bytes as they are.

use crate::id::{RecordId, SegmentId};
use crate::varint;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::mem::size_of;

#[derive(Debug, Clone)]
struct SegmentGroup {
    segment: SegmentId,
    start: usize,
    end: usize,
    entries: u64,
    /// Sorted, distinct indices into the after-segment table.
    afters: Vec<u32>,
}

impl SegmentGroup {
    fn seal(&mut self) {
        self.afters.sort_unstable();
        self.afters.dedup();
        self.afters.shrink_to_fit();
    }
}

/// Immutable, compact encoding of one generation's forwarding entries.
#[derive(Debug, Clone, Default)]
pub(crate) struct PackedTable {
    groups: Vec<SegmentGroup>,
    after_segments: Vec<SegmentId>,
    data: Bytes,
}

impl PackedTable {
    /// Packs entries that are sorted by before id with unique keys.
    pub(crate) fn from_sorted<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (RecordId, RecordId)>,
    {
        let mut data: Vec<u8> = Vec::new();
        let mut groups: Vec<SegmentGroup> = Vec::new();
        let mut after_segments = Vec::new();
        let mut after_index: HashMap<SegmentId, u32> = HashMap::new();
        let mut prev_before = 0u32;
        let mut prev_after = 0u32;

        for (before, after) in entries {
            let segment = before.segment();
            if groups.last().map_or(true, |g| g.segment != segment) {
                if let Some(group) = groups.last_mut() {
                    group.seal();
                }
                groups.push(SegmentGroup {
                    segment,
                    start: data.len(),
                    end: data.len(),
                    entries: 0,
                    afters: Vec::new(),
                });
                prev_before = 0;
                prev_after = 0;
            }
            debug_assert!(before.offset() >= prev_before, "entries must be sorted");

            let index = *after_index.entry(after.segment()).or_insert_with(|| {
                after_segments.push(after.segment());
                after_segments.len() as u32 - 1
            });

            varint::put_u64(&mut data, u64::from(before.offset() - prev_before));
            varint::put_u64(&mut data, u64::from(index));
            varint::put_i64(
                &mut data,
                i64::from(after.offset()) - i64::from(prev_after),
            );
            prev_before = before.offset();
            prev_after = after.offset();

            if let Some(group) = groups.last_mut() {
                group.end = data.len();
                group.entries += 1;
                if group.afters.last() != Some(&index) {
                    group.afters.push(index);
                }
            }
        }
        if let Some(group) = groups.last_mut() {
            group.seal();
        }

        data.shrink_to_fit();
        groups.shrink_to_fit();
        after_segments.shrink_to_fit();

        Self {
            groups,
            after_segments,
            data: Bytes::from(data),
        }
    }

    fn group(&self, segment: SegmentId) -> Option<&SegmentGroup> {
        self.groups
            .binary_search_by(|g| g.segment.cmp(&segment))
            .ok()
            .map(|i| &self.groups[i])
    }

    fn group_entries<'a>(&'a self, group: &SegmentGroup) -> GroupEntries<'a> {
        GroupEntries {
            after_segments: &self.after_segments,
            segment: group.segment,
            cursor: &self.data[group.start..group.end],
            before: 0,
            after: 0,
        }
    }

    /// Returns true if some entry's before id lies in `segment`.
    pub(crate) fn contains_segment(&self, segment: SegmentId) -> bool {
        self.group(segment).is_some()
    }

    /// Looks up the after id for `before`, decoding at most one group.
    pub(crate) fn get(&self, before: RecordId) -> Option<RecordId> {
        let group = self.group(before.segment())?;
        let target = before.offset();
        self.group_entries(group)
            .take_while(|(b, _)| b.offset() <= target)
            .find(|(b, _)| b.offset() == target)
            .map(|(_, after)| after)
    }

    /// Decodes every entry in before-id order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (RecordId, RecordId)> + '_ {
        self.groups.iter().flat_map(|g| self.group_entries(g))
    }

    /// Before-segments in ascending order.
    pub(crate) fn segments(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.groups.iter().map(|g| g.segment)
    }

    /// Builds a new table without the groups whose segment is in `ids`.
    ///
    /// Surviving groups are copied byte for byte and keep their indices into
    /// the after-segment table. Returns the new table together with the
    /// number of records and segments that were dropped.
    pub(crate) fn without(&self, ids: &HashSet<SegmentId>) -> (Self, u64, u64) {
        let mut data: Vec<u8> = Vec::with_capacity(self.data.len());
        let mut groups = Vec::with_capacity(self.groups.len());
        let mut records = 0;
        let mut segments = 0;

        for group in &self.groups {
            if ids.contains(&group.segment) {
                records += group.entries;
                segments += 1;
                continue;
            }
            let start = data.len();
            data.extend_from_slice(&self.data[group.start..group.end]);
            groups.push(SegmentGroup {
                start,
                end: data.len(),
                ..group.clone()
            });
        }

        let table = Self {
            groups,
            after_segments: self.after_segments.clone(),
            data: Bytes::from(data),
        };
        (table, records, segments)
    }

    /// Number of distinct before-segments.
    #[cfg(test)]
    pub(crate) fn segment_count(&self) -> u64 {
        self.groups.len() as u64
    }

    /// Number of encoded entries.
    #[cfg(test)]
    pub(crate) fn record_count(&self) -> u64 {
        self.groups.iter().map(|g| g.entries).sum()
    }

    /// Number of distinct after-segments still referenced by some entry.
    pub(crate) fn after_segment_count(&self) -> u64 {
        self.groups
            .iter()
            .flat_map(|g| g.afters.iter())
            .collect::<BTreeSet<_>>()
            .len() as u64
    }

    /// Estimated heap plus inline footprint in bytes.
    pub(crate) fn estimated_weight(&self) -> u64 {
        let afters: usize = self.groups.iter().map(|g| g.afters.len()).sum();
        (size_of::<Self>()
            + self.data.len()
            + self.groups.len() * size_of::<SegmentGroup>()
            + afters * size_of::<u32>()
            + self.after_segments.len() * size_of::<SegmentId>()) as u64
    }
}

struct GroupEntries<'a> {
    after_segments: &'a [SegmentId],
    segment: SegmentId,
    cursor: &'a [u8],
    before: u32,
    after: u32,
}

impl Iterator for GroupEntries<'_> {
    type Item = (RecordId, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_empty() {
            return None;
        }
        let before_delta = varint::get_u64(&mut self.cursor)?;
        let index = varint::get_u64(&mut self.cursor)?;
        let after_delta = varint::get_i64(&mut self.cursor)?;

        self.before = self.before.wrapping_add(before_delta as u32);
        self.after = (i64::from(self.after) + after_delta) as u32;
        let after_segment = *self.after_segments.get(index as usize)?;

        Some((
            RecordId::new(self.segment, self.before),
            RecordId::new(after_segment, self.after),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn rec(segment: u128, offset: u32) -> RecordId {
        RecordId::new(SegmentId::from_u128(segment), offset)
    }

    fn sample() -> Vec<(RecordId, RecordId)> {
        vec![
            (rec(1, 0), rec(100, 0)),
            (rec(1, 16), rec(100, 32)),
            (rec(1, 4096), rec(101, 8)),
            (rec(2, 8), rec(100, 64)),
            (rec(5, 0), rec(101, 0)),
        ]
    }

    #[test]
    fn lookup_hits_and_misses() {
        let table = PackedTable::from_sorted(sample());

        assert_eq!(table.get(rec(1, 16)), Some(rec(100, 32)));
        assert_eq!(table.get(rec(1, 4096)), Some(rec(101, 8)));
        assert_eq!(table.get(rec(5, 0)), Some(rec(101, 0)));
        assert_eq!(table.get(rec(1, 8)), None);
        assert_eq!(table.get(rec(1, 5000)), None);
        assert_eq!(table.get(rec(3, 0)), None);
    }

    #[test]
    fn counts_and_segments() {
        let table = PackedTable::from_sorted(sample());

        assert_eq!(table.segment_count(), 3);
        assert_eq!(table.record_count(), 5);
        assert_eq!(table.after_segment_count(), 2);
        assert!(table.contains_segment(SegmentId::from_u128(2)));
        assert!(!table.contains_segment(SegmentId::from_u128(100)));

        let segments: Vec<_> = table.segments().collect();
        assert_eq!(
            segments,
            vec![
                SegmentId::from_u128(1),
                SegmentId::from_u128(2),
                SegmentId::from_u128(5)
            ]
        );
    }

    #[test]
    fn entries_decode_in_order() {
        let table = PackedTable::from_sorted(sample());
        assert_eq!(table.entries().collect::<Vec<_>>(), sample());
    }

    #[test]
    fn after_offsets_may_decrease() {
        let entries = vec![(rec(1, 0), rec(9, 1_000_000)), (rec(1, 4), rec(9, 0))];
        let table = PackedTable::from_sorted(entries.clone());
        assert_eq!(table.entries().collect::<Vec<_>>(), entries);
    }

    #[test]
    fn without_drops_whole_groups() {
        let table = PackedTable::from_sorted(sample());
        let ids: HashSet<_> = [SegmentId::from_u128(1), SegmentId::from_u128(42)]
            .into_iter()
            .collect();

        let (pruned, records, segments) = table.without(&ids);
        assert_eq!(records, 3);
        assert_eq!(segments, 1);
        assert_eq!(pruned.record_count(), 2);
        assert_eq!(pruned.get(rec(1, 0)), None);
        assert_eq!(pruned.get(rec(2, 8)), Some(rec(100, 64)));

        // the source table is untouched
        assert_eq!(table.get(rec(1, 0)), Some(rec(100, 0)));
    }

    #[test]
    fn without_copies_kept_groups_verbatim() {
        let table = PackedTable::from_sorted(sample());
        let dropped = table.group(SegmentId::from_u128(1)).unwrap();
        let dropped_len = dropped.end - dropped.start;

        let ids: HashSet<_> = [SegmentId::from_u128(1)].into_iter().collect();
        let (pruned, _, _) = table.without(&ids);
        assert_eq!(pruned.data.len(), table.data.len() - dropped_len);
        assert_eq!(pruned.groups.len(), 2);
        for kept in &pruned.groups {
            let source = table.group(kept.segment).unwrap();
            assert_eq!(
                &pruned.data[kept.start..kept.end],
                &table.data[source.start..source.end]
            );
            assert_eq!(kept.entries, source.entries);
        }
        assert_eq!(pruned.after_segments, table.after_segments);
        assert_eq!(pruned.get(rec(5, 0)), Some(rec(101, 0)));
    }

    #[test]
    fn after_segment_count_tracks_surviving_entries() {
        let table = PackedTable::from_sorted(sample());
        assert_eq!(table.after_segment_count(), 2);

        // only (2, 8) -> (100, 64) survives
        let ids: HashSet<_> = [SegmentId::from_u128(1), SegmentId::from_u128(5)]
            .into_iter()
            .collect();
        let (pruned, records, _) = table.without(&ids);
        assert_eq!(records, 4);
        assert_eq!(pruned.after_segment_count(), 1);

        let everything: HashSet<_> = table.segments().collect();
        let (empty, _, _) = table.without(&everything);
        assert_eq!(empty.after_segment_count(), 0);
        assert!(empty.data.is_empty());
    }

    #[test]
    fn packing_is_smaller_than_raw_ids() {
        let entries: Vec<_> = (0..1000u32)
            .map(|i| (rec(u128::from(i / 100), i * 4), rec(500, i * 8)))
            .collect();
        let table = PackedTable::from_sorted(entries);

        let raw = 1000 * 2 * size_of::<RecordId>() as u64;
        assert!(table.estimated_weight() < raw / 4);
    }

    proptest! {
        #[test]
        fn lookups_match_btree(
            pairs in prop::collection::vec(
                ((0u128..6, 0u32..64), (100u128..103, any::<u32>())),
                0..200,
            ),
            ids in prop::collection::hash_set(0u128..8, 0..4),
        ) {
            let model: BTreeMap<RecordId, RecordId> = pairs
                .iter()
                .map(|&((s, o), (t, p))| (rec(s, o * 4), rec(t, p)))
                .collect();
            let table = PackedTable::from_sorted(model.clone());

            prop_assert_eq!(table.record_count(), model.len() as u64);
            for s in 0..8u128 {
                for o in 0..64u32 {
                    let key = rec(s, o * 4);
                    prop_assert_eq!(table.get(key), model.get(&key).copied());
                }
            }

            let ids: HashSet<SegmentId> = ids.into_iter().map(SegmentId::from_u128).collect();
            let (pruned, records, _) = table.without(&ids);
            let kept: Vec<_> = model
                .iter()
                .filter(|(k, _)| !ids.contains(&k.segment()))
                .map(|(k, v)| (*k, *v))
                .collect();
            prop_assert_eq!(records as usize, model.len() - kept.len());
            let afters: HashSet<SegmentId> = kept.iter().map(|(_, v)| v.segment()).collect();
            prop_assert_eq!(pruned.after_segment_count(), afters.len() as u64);
            prop_assert_eq!(pruned.entries().collect::<Vec<_>>(), kept);
        }
    }

    #[test]
    fn empty_table() {
        let table = PackedTable::from_sorted(Vec::new());
        assert_eq!(table.segment_count(), 0);
        assert_eq!(table.record_count(), 0);
        assert_eq!(table.get(rec(1, 0)), None);
        assert_eq!(table.entries().count(), 0);
    }
}
