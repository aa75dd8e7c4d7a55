//! Segment accumulation and playlist rendering for the output mirror
//! (SPEC_FULL §12, C9). Grounded directly on the teacher's
//! `mux/hls.rs::HlsVariant`: a rolling window of recent segments, a
//! monotonic segment index, and a playlist rewritten after every append.
//! Unlike the teacher (MPEG-TS segments via `m3u8-rs`), this targets fMP4
//! segments and renders through this crate's own playlist writer (§13: the
//! teacher's `m3u8-rs` dependency was dropped in favor of the tolerant
//! parser/writer this crate already owns).

use bytes::Bytes;

use crate::playlist::{MediaPlaylist, Segment};

/// One segment retained in the mirror's rolling window.
#[derive(Debug, Clone)]
pub struct MirrorSegment {
    pub media_sequence: u64,
    pub duration: f64,
    pub data: Bytes,
}

impl MirrorSegment {
    pub fn file_name(&self) -> String {
        segment_file_name(self.media_sequence)
    }
}

/// Matches the teacher's `HlsVariant::segment_name` naming scheme, adapted
/// to the fMP4 extension this crate's segments use.
pub fn segment_file_name(media_sequence: u64) -> String {
    format!("{media_sequence}.m4s")
}

pub const INIT_SEGMENT_FILE_NAME: &str = "init.mp4";
pub const PLAYLIST_FILE_NAME: &str = "live.m3u8";

/// Build the current playlist snapshot from the retained window, the way
/// `HlsVariant::write_playlist` derives an `m3u8_rs::MediaPlaylist` from its
/// `segments` field on every append.
pub fn build_playlist(
    segments: &[MirrorSegment],
    target_duration: u64,
    end_list: bool,
) -> MediaPlaylist {
    let media_sequence = segments.first().map(|s| s.media_sequence).unwrap_or(0);
    let mut playlist = MediaPlaylist {
        target_duration,
        media_sequence,
        end_list,
        ..Default::default()
    };
    for (i, seg) in segments.iter().enumerate() {
        playlist.segments.push(Segment {
            duration: seg.duration,
            title: None,
            uri: seg.file_name(),
            byte_range: None,
            discontinuity: false,
            program_date_time: None,
            key: None,
            // The init segment applies to the whole window; emitted once,
            // on the first listed segment, the way the parser/writer
            // already expect "persists until overridden" (spec §4.1).
            map: if i == 0 {
                Some(crate::playlist::MapTag {
                    uri: INIT_SEGMENT_FILE_NAME.to_string(),
                    byte_range: None,
                })
            } else {
                None
            },
            gap: false,
            bitrate: None,
        });
    }
    playlist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(ms: u64, duration: f64) -> MirrorSegment {
        MirrorSegment {
            media_sequence: ms,
            duration,
            data: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn builds_playlist_with_media_sequence_from_first_retained_segment() {
        let segments = vec![seg(5, 6.0), seg(6, 6.0)];
        let playlist = build_playlist(&segments, 6, false);
        assert_eq!(playlist.media_sequence, 5);
        assert_eq!(playlist.segments.len(), 2);
        assert_eq!(playlist.segments[0].uri, "5.m4s");
        assert!(!playlist.end_list);
    }

    #[test]
    fn map_tag_emitted_once_on_first_segment() {
        let segments = vec![seg(0, 6.0), seg(1, 6.0)];
        let playlist = build_playlist(&segments, 6, true);
        assert!(playlist.segments[0].map.is_some());
        assert!(playlist.segments[1].map.is_none());
        assert!(playlist.end_list);
    }

    #[test]
    fn empty_window_has_zero_media_sequence() {
        let playlist = build_playlist(&[], 6, false);
        assert_eq!(playlist.media_sequence, 0);
        assert!(playlist.segments.is_empty());
    }
}
