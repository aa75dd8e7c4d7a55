//! `SegmentInfo` (spec §3 "SegmentInfo (internal, per-segment runtime state)"):
//! the immutable `Segment` value plus its virtual byte range in the unified
//! stream and its media sequence.

use crate::playlist::Segment;

#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub segment: Segment,
    pub media_sequence: u64,
    /// Virtual offset in the unified stream; immutable once assigned (spec §3).
    pub start: u64,
    /// Known upfront when the segment carries an explicit byte-range;
    /// otherwise provisional (equals `start`) until fetched.
    pub end: u64,
    pub end_known: bool,
    /// Cumulative HLS time up to (not including) this segment, fixed at
    /// ingest time and stable across later expiry (spec §4.4
    /// `get_segment_expected_start_time`).
    pub expected_start_time: f64,
}

impl SegmentInfo {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }
}
