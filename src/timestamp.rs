//! Per-segment decode-timestamp normalization (spec §4.7, C7).
//!
//! Each segment's demuxed packets carry timestamps relative to whatever the
//! encoder happened to start counting from, not the segment's position in
//! the overall playlist. This computes, per segment, the scalar offset that
//! maps the segment's first decoded packet onto its expected playlist start
//! time, and applies it to every packet.

/// Timestamp-based lookups tolerate this much float jitter (spec §4.7).
pub const TIMESTAMP_EPSILON: f64 = 1e-4;

/// A single decoded packet, ordered by **decode sequence number** (never
/// presentation timestamp: B-frames reorder presentation relative to decode,
/// spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packet {
    pub decode_sequence: u64,
    pub timestamp: f64,
}

/// Normalize `packets` (already sorted by `decode_sequence`) so the segment's
/// first packet lands at `expected_start`, the cumulative playlist duration
/// up to this segment (spec §4.7 "let O be the expected playlist start time
/// ... let T0 be the first decoded packet's timestamp. offset = T0 - O").
///
/// Returns the new packets plus the computed `offset`, so callers (e.g. the
/// fragment lookup bridge) can apply the same scalar elsewhere.
pub fn normalize_segment(packets: &[Packet], expected_start: f64) -> (Vec<Packet>, f64) {
    let Some(first) = packets.iter().min_by_key(|p| p.decode_sequence) else {
        return (Vec::new(), 0.0);
    };
    let offset = first.timestamp - expected_start;
    let normalized = packets
        .iter()
        .map(|p| Packet {
            decode_sequence: p.decode_sequence,
            timestamp: p.timestamp - offset,
        })
        .collect();
    (normalized, offset)
}

/// Compare two timestamps for equality within [`TIMESTAMP_EPSILON`].
pub fn timestamps_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIMESTAMP_EPSILON
}

/// Find the packet covering playback time `t` within a decode-sequence
/// ordered, normalized packet list: the last packet at or before `t`.
pub fn packet_at(packets: &[Packet], t: f64) -> Option<&Packet> {
    packets
        .iter()
        .rev()
        .find(|p| p.timestamp <= t + TIMESTAMP_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_packets_to_expected_start() {
        let packets = vec![
            Packet { decode_sequence: 0, timestamp: 100.5 },
            Packet { decode_sequence: 1, timestamp: 100.55 },
            Packet { decode_sequence: 2, timestamp: 100.6 },
        ];
        let (normalized, offset) = normalize_segment(&packets, 12.0);
        assert!(timestamps_close(offset, 88.5));
        assert!(timestamps_close(normalized[0].timestamp, 12.0));
        assert!(timestamps_close(normalized[1].timestamp, 12.05));
    }

    #[test]
    fn orders_by_decode_sequence_not_timestamp() {
        // B-frame reordering: packet 1 (decode order) has a *smaller*
        // presentation timestamp than packet 0.
        let packets = vec![
            Packet { decode_sequence: 0, timestamp: 10.0 },
            Packet { decode_sequence: 1, timestamp: 9.5 },
        ];
        let (normalized, offset) = normalize_segment(&packets, 0.0);
        // The decode-sequence-0 packet (ts=10.0), not the smaller
        // timestamp, anchors the offset.
        assert!(timestamps_close(offset, 10.0));
        assert!(timestamps_close(normalized[0].timestamp, 0.0));
        assert!(timestamps_close(normalized[1].timestamp, -0.5));
    }

    #[test]
    fn empty_packet_list_normalizes_to_nothing() {
        let (normalized, offset) = normalize_segment(&[], 5.0);
        assert!(normalized.is_empty());
        assert_eq!(offset, 0.0);
    }

    #[test]
    fn timestamps_close_tolerates_epsilon_jitter() {
        assert!(timestamps_close(1.00005, 1.0));
        assert!(!timestamps_close(1.001, 1.0));
    }

    #[test]
    fn packet_at_finds_last_packet_before_time() {
        let packets = vec![
            Packet { decode_sequence: 0, timestamp: 0.0 },
            Packet { decode_sequence: 1, timestamp: 1.0 },
            Packet { decode_sequence: 2, timestamp: 2.0 },
        ];
        assert_eq!(packet_at(&packets, 1.5).unwrap().decode_sequence, 1);
        assert_eq!(packet_at(&packets, 2.0).unwrap().decode_sequence, 2);
    }
}
