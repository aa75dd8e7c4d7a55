//! Fragment lookup bridge (spec §4.5, C5): maps cumulative media time to
//! virtual byte offset, standing in for the `mfra` box an HLS fMP4 stream
//! assembled from separate segment files never has. Wired to
//! `SegmentSource`'s `on_segments_added`/`on_segments_removed` callbacks.

use std::sync::Mutex;

use crate::source::SegmentInfo;

/// One row: a fragment's start time and where its `moof`/`mdat` begin in
/// the virtual byte stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentEntry {
    pub media_sequence: u64,
    pub time_seconds: f64,
    pub moof_offset: u64,
}

#[derive(Default)]
struct Table {
    entries: Vec<FragmentEntry>,
    normalized: bool,
}

/// Owns the fragment lookup table.
pub struct FragmentLookupBridge {
    table: Mutex<Table>,
}

impl Default for FragmentLookupBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentLookupBridge {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
        }
    }

    /// `populate_fragment_lookup_table_from_segments` (spec §4.5): initial
    /// seed, called from the first `on_segments_added` notification.
    pub fn populate_from_segments(&self, entries: &[SegmentInfo], start_time_seconds: f64) {
        let mut table = self.table.lock().unwrap();
        table.entries.clear();
        append_locked(&mut table.entries, entries, start_time_seconds);
    }

    /// `append_fragments_to_lookup_table` (spec §4.5): extend after a refresh.
    pub fn append(&self, entries: &[SegmentInfo], start_time_seconds: f64) {
        let mut table = self.table.lock().unwrap();
        append_locked(&mut table.entries, entries, start_time_seconds);
    }

    /// `remove_old_fragments_from_lookup_table` (spec §4.5): drop entries
    /// whose `moof` offset lies in now-gap territory.
    pub fn remove(&self, segment_ids: &[u64]) {
        let mut table = self.table.lock().unwrap();
        table.entries.retain(|e| !segment_ids.contains(&e.media_sequence));
    }

    /// Re-apply the demuxer's start-timestamp normalization offset to every
    /// recorded time value. Idempotent: only the first call has any effect
    /// (spec §4.5, "happens once, after normalization and before any seek
    /// queries").
    pub fn apply_edit_list_offset(&self, edit_list_offset: f64) {
        let mut table = self.table.lock().unwrap();
        if table.normalized {
            return;
        }
        for entry in table.entries.iter_mut() {
            entry.time_seconds += edit_list_offset;
        }
        table.normalized = true;
    }

    /// The fragment covering `t`: the last entry at or before `t`.
    pub fn find_offset_for_time(&self, t: f64) -> Option<FragmentEntry> {
        let table = self.table.lock().unwrap();
        table.entries.iter().rev().find(|e| e.time_seconds <= t).copied()
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn append_locked(entries: &mut Vec<FragmentEntry>, new_segments: &[SegmentInfo], _start_time_seconds: f64) {
    for info in new_segments {
        entries.push(FragmentEntry {
            media_sequence: info.media_sequence,
            time_seconds: info.expected_start_time,
            moof_offset: info.start,
        });
    }
    entries.sort_by(|a, b| a.time_seconds.partial_cmp(&b.time_seconds).unwrap());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::Segment;

    fn segment_info(ms: u64, start: u64, len: u64, expected_start_time: f64, duration: f64) -> SegmentInfo {
        SegmentInfo {
            segment: Segment {
                duration,
                title: None,
                uri: format!("seg{ms}.m4s"),
                byte_range: None,
                discontinuity: false,
                program_date_time: None,
                key: None,
                map: None,
                gap: false,
                bitrate: None,
            },
            media_sequence: ms,
            start,
            end: start + len,
            end_known: true,
            expected_start_time,
        }
    }

    #[test]
    fn populate_then_find_offset_for_time() {
        let bridge = FragmentLookupBridge::new();
        let entries = vec![
            segment_info(100, 0, 1000, 0.0, 6.0),
            segment_info(101, 1000, 1000, 6.0, 6.0),
        ];
        bridge.populate_from_segments(&entries, 0.0);

        let found = bridge.find_offset_for_time(7.0).unwrap();
        assert_eq!(found.media_sequence, 101);
        assert_eq!(found.moof_offset, 1000);

        let found = bridge.find_offset_for_time(3.0).unwrap();
        assert_eq!(found.media_sequence, 100);
    }

    #[test]
    fn append_extends_and_keeps_sorted_order() {
        let bridge = FragmentLookupBridge::new();
        bridge.populate_from_segments(&[segment_info(100, 0, 1000, 0.0, 6.0)], 0.0);
        bridge.append(&[segment_info(101, 1000, 1000, 6.0, 6.0)], 6.0);
        assert_eq!(bridge.len(), 2);
        assert_eq!(bridge.find_offset_for_time(7.0).unwrap().media_sequence, 101);
    }

    #[test]
    fn remove_drops_expired_entries() {
        let bridge = FragmentLookupBridge::new();
        bridge.populate_from_segments(
            &[segment_info(100, 0, 1000, 0.0, 6.0), segment_info(101, 1000, 1000, 6.0, 6.0)],
            0.0,
        );
        bridge.remove(&[100]);
        assert_eq!(bridge.len(), 1);
        assert!(bridge.find_offset_for_time(3.0).is_none());
    }

    #[test]
    fn edit_list_offset_applies_once() {
        let bridge = FragmentLookupBridge::new();
        bridge.populate_from_segments(&[segment_info(100, 0, 1000, 0.0, 6.0)], 0.0);
        bridge.apply_edit_list_offset(1.5);
        bridge.apply_edit_list_offset(3.0); // no-op, already normalized
        assert_eq!(bridge.find_offset_for_time(1.5).unwrap().media_sequence, 100);
        assert!(bridge.find_offset_for_time(0.0).is_none());
    }
}
