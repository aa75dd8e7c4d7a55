//! Sliding-window expiry math for the live refresh loop (spec §4.4 `refresh`).

/// Segments outside `[media_sequence - buffer_behind, media_sequence + len - 1]`
/// are expired. Returns the expired sequence numbers in ascending order.
pub(crate) fn expired_sequences(
    known_sequences: &[u64],
    media_sequence: u64,
    playlist_len: usize,
    buffer_behind: u64,
) -> Vec<u64> {
    let window_start = media_sequence.saturating_sub(buffer_behind);
    let window_end = media_sequence + playlist_len as u64; // exclusive upper bound
    known_sequences
        .iter()
        .copied()
        .filter(|&ms| ms < window_start || ms >= window_end)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_segments_below_buffer_window() {
        let known: Vec<u64> = (0..=110).collect();
        let expired = expired_sequences(&known, 100, 10, 72);
        // window_start = 100-72=28, window_end=110 (exclusive) -> expire <28 or >=110
        assert!(expired.contains(&0));
        assert!(expired.contains(&27));
        assert!(!expired.contains(&28));
        assert!(expired.contains(&110));
        assert!(!expired.contains(&109));
    }

    #[test]
    fn saturates_at_zero_when_buffer_exceeds_sequence() {
        let known: Vec<u64> = (0..5).collect();
        let expired = expired_sequences(&known, 2, 3, 72);
        assert!(expired.is_empty());
    }
}
