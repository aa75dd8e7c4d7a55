//! Round-trip and parse-error integration tests for the playlist model
//! (spec §8 "Round-trip and idempotence"), exercising tag combinations the
//! unit tests beside the parser/writer don't already cover: date ranges,
//! gaps, bitrate, discontinuity sequences, session data/key, and multiple
//! rendition groups in a master playlist.

use hls_ingest_core::error::HlsIngestError;
use hls_ingest_core::playlist::{parse_playlist, write_playlist, DateRangeValue, Playlist};

fn media_fixture_with_daterange_and_gap() -> &'static str {
    "#EXTM3U\n\
     #EXT-X-VERSION:7\n\
     #EXT-X-TARGETDURATION:6\n\
     #EXT-X-MEDIA-SEQUENCE:42\n\
     #EXT-X-DISCONTINUITY-SEQUENCE:3\n\
     #EXT-X-PLAYLIST-TYPE:EVENT\n\
     #EXT-X-START:TIME-OFFSET=-12.5,PRECISE=YES\n\
     #EXT-X-DATERANGE:ID=\"ad-1\",CLASS=\"com.example.ad\",START-DATE=\"2026-01-02T03:04:05.000Z\",DURATION=30,X-AD-ID=\"abc\",X-PRIORITY=3\n\
     #EXT-X-MAP:URI=\"init.mp4\"\n\
     #EXTINF:6.006,\n\
     #EXT-X-BITRATE:2500\n\
     seg0.m4s\n\
     #EXT-X-DISCONTINUITY\n\
     #EXT-X-GAP\n\
     #EXTINF:6,\n\
     seg1.m4s\n"
}

#[test]
fn media_playlist_with_daterange_bitrate_gap_round_trips() {
    let text = media_fixture_with_daterange_and_gap();
    let once = parse_playlist(text).unwrap();
    let media = once.as_media().unwrap();

    assert_eq!(media.discontinuity_sequence, Some(3));
    assert!(media.start.unwrap().precise);
    assert_eq!(media.date_ranges.len(), 1);
    match media.date_ranges[0].client_attributes.get("AD-ID").unwrap() {
        DateRangeValue::String(s) => assert_eq!(s, "abc"),
        other => panic!("expected string, got {other:?}"),
    }
    match media.date_ranges[0].client_attributes.get("PRIORITY").unwrap() {
        DateRangeValue::Number(n) => assert_eq!(*n, 3.0),
        other => panic!("expected number, got {other:?}"),
    }
    assert!(media.segments[1].gap);
    assert!(media.segments[1].discontinuity);
    assert_eq!(media.segments[0].bitrate, Some(2_500_000));

    let written_once = write_playlist(&once);
    let twice = parse_playlist(&written_once).unwrap();
    let written_twice = write_playlist(&twice);
    assert_eq!(written_once, written_twice);
    assert_eq!(once, twice);
}

#[test]
fn master_playlist_with_audio_and_subtitle_renditions_round_trips() {
    let text = "#EXTM3U\n\
        #EXT-X-INDEPENDENT-SEGMENTS\n\
        #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aac\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=YES,AUTOSELECT=YES,URI=\"audio/en.m3u8\"\n\
        #EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"English\",LANGUAGE=\"en\",URI=\"subs/en.m3u8\"\n\
        #EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=\"English\",INSTREAM-ID=\"CC1\"\n\
        #EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1920x1080,CODECS=\"avc1.640028,mp4a.40.2\",AUDIO=\"aac\",SUBTITLES=\"subs\"\n\
        hi.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,AUDIO=\"aac\"\n\
        lo.m3u8\n";
    let once = parse_playlist(text).unwrap();
    let master = once.as_master().unwrap();
    assert_eq!(master.renditions.len(), 3);
    assert!(master.independent_segments);
    assert_eq!(master.variants[0].audio_group.as_deref(), Some("aac"));

    let written_once = write_playlist(&once);
    let twice = parse_playlist(&written_once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn missing_extm3u_header_is_parse_error_with_no_line() {
    let err = parse_playlist("#EXT-X-TARGETDURATION:6\nseg0.m4s\n").unwrap_err();
    match err {
        HlsIngestError::Parse { line, .. } => assert_eq!(line, Some(1)),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn media_missing_type_group_or_name_is_parse_error() {
    let text = "#EXTM3U\n#EXT-X-MEDIA:GROUP-ID=\"aac\",NAME=\"English\"\n";
    let err = parse_playlist(text).unwrap_err();
    assert!(matches!(err, HlsIngestError::Parse { .. }));
}

#[test]
fn classification_dispatches_on_stream_inf_presence() {
    let master_text = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nlow.m3u8\n";
    let media_text = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\nseg.m4s\n#EXT-X-ENDLIST\n";
    assert!(matches!(parse_playlist(master_text).unwrap(), Playlist::Master(_)));
    assert!(matches!(parse_playlist(media_text).unwrap(), Playlist::Media(_)));
}
