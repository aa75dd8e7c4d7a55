//! `parse_playlist(text) -> Playlist` (spec §4.1).
//!
//! Dispatches master vs media based on the presence of any of
//! `EXT-X-STREAM-INF`, `EXT-X-MEDIA`, `EXT-X-I-FRAME-STREAM-INF`. Fails with
//! a `ParseError` carrying a line number for a missing `#EXTM3U` header, a
//! missing mandatory attribute, or an invalid enum value.

use chrono::{DateTime, Utc};

use super::attributes::{parse_attribute_list, AttributeListExt};
use super::tags::{tokenize, Line};
use super::{
    ByteRange, DateRange, DateRangeValue, EncryptionKey, MapTag, MasterPlaylist, MediaPlaylist,
    MediaRendition, Playlist, PlaylistType, RenditionType, Resolution, Segment, SessionData,
    StartOffset, Variant,
};
use crate::error::HlsIngestError;

const MASTER_MARKERS: &[&str] = &[
    "EXT-X-STREAM-INF",
    "EXT-X-MEDIA",
    "EXT-X-I-FRAME-STREAM-INF",
];

pub fn parse_playlist(text: &str) -> Result<Playlist, HlsIngestError> {
    let lines = tokenize(text);

    let first_tag = lines
        .iter()
        .find(|(_, l)| !matches!(l, Line::Blank))
        .ok_or_else(|| HlsIngestError::parse(None, "empty playlist"))?;
    match first_tag {
        (_, Line::Tag { name, .. }) if *name == "EXTM3U" => {}
        (line, _) => {
            return Err(HlsIngestError::parse(
                Some(*line),
                "playlist must begin with #EXTM3U",
            ))
        }
    }

    let is_master = lines.iter().any(|(_, l)| {
        matches!(l, Line::Tag { name, .. } if MASTER_MARKERS.contains(name))
    });

    if is_master {
        parse_master(&lines).map(Playlist::Master)
    } else {
        parse_media(&lines).map(Playlist::Media)
    }
}

fn parse_master(lines: &[(usize, Line)]) -> Result<MasterPlaylist, HlsIngestError> {
    let mut playlist = MasterPlaylist::default();
    let mut pending_variant_attrs: Option<(usize, super::attributes::AttributeList)> = None;

    let mut i = 0;
    while i < lines.len() {
        let (line_no, line) = &lines[i];
        match line {
            Line::Tag { name, value } => match *name {
                "EXTM3U" => {}
                "EXT-X-VERSION" => {
                    playlist.version = parse_version(*line_no, value)?;
                }
                "EXT-X-INDEPENDENT-SEGMENTS" => {
                    playlist.independent_segments = true;
                }
                "EXT-X-STREAM-INF" => {
                    pending_variant_attrs = Some((*line_no, parse_attribute_list(value)));
                }
                "EXT-X-I-FRAME-STREAM-INF" => {
                    let attrs = parse_attribute_list(value);
                    playlist
                        .variants
                        .push(build_variant(*line_no, &attrs, Some(require_uri(&attrs, *line_no)?))?);
                }
                "EXT-X-MEDIA" => {
                    playlist.renditions.push(build_rendition(*line_no, value)?);
                }
                "EXT-X-SESSION-DATA" => {
                    playlist.session_data.push(build_session_data(*line_no, value)?);
                }
                "EXT-X-SESSION-KEY" => {
                    playlist.session_key = Some(build_key(*line_no, value)?);
                }
                _ => { /* unknown tags ignored, §4.1 */ }
            },
            Line::Uri(uri) => {
                if let Some((attr_line, attrs)) = pending_variant_attrs.take() {
                    playlist
                        .variants
                        .push(build_variant(attr_line, &attrs, Some(uri.to_string()))?);
                }
            }
            Line::Comment | Line::Blank => {}
        }
        i += 1;
    }

    if playlist.variants.is_empty() && playlist.renditions.is_empty() {
        return Err(HlsIngestError::parse(
            None,
            "master playlist has no variants or renditions",
        ));
    }

    Ok(playlist)
}

fn require_uri(
    attrs: &super::attributes::AttributeList,
    line: usize,
) -> Result<String, HlsIngestError> {
    attrs
        .get_str("URI")
        .map(|s| s.to_string())
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-I-FRAME-STREAM-INF missing URI"))
}

fn build_variant(
    line: usize,
    attrs: &super::attributes::AttributeList,
    uri: Option<String>,
) -> Result<Variant, HlsIngestError> {
    let bandwidth = attrs
        .get_u64("BANDWIDTH")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-STREAM-INF missing BANDWIDTH"))?;
    let resolution = attrs.get_str("RESOLUTION").and_then(parse_resolution);
    Ok(Variant {
        bandwidth,
        average_bandwidth: attrs.get_u64("AVERAGE-BANDWIDTH"),
        resolution,
        frame_rate: attrs.get_f64("FRAME-RATE"),
        codecs: attrs.get_str("CODECS").map(str::to_string),
        uri: uri.unwrap_or_default(),
        audio_group: attrs.get_str("AUDIO").map(str::to_string),
        video_group: attrs.get_str("VIDEO").map(str::to_string),
        subtitles_group: attrs.get_str("SUBTITLES").map(str::to_string),
        closed_captions_group: attrs.get_str("CLOSED-CAPTIONS").map(str::to_string),
        hdcp_level: attrs.get_str("HDCP-LEVEL").map(str::to_string),
    })
}

fn parse_resolution(s: &str) -> Option<Resolution> {
    let (w, h) = s.split_once('x')?;
    Some(Resolution {
        width: w.parse().ok()?,
        height: h.parse().ok()?,
    })
}

fn build_rendition(line: usize, value: &str) -> Result<MediaRendition, HlsIngestError> {
    let attrs = parse_attribute_list(value);
    let kind_str = attrs
        .get_str("TYPE")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-MEDIA missing TYPE"))?;
    let kind = RenditionType::parse(kind_str)
        .ok_or_else(|| HlsIngestError::parse(Some(line), format!("invalid TYPE: {kind_str}")))?;
    let group_id = attrs
        .get_str("GROUP-ID")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-MEDIA missing GROUP-ID"))?
        .to_string();
    let name = attrs
        .get_str("NAME")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-MEDIA missing NAME"))?
        .to_string();
    let uri = attrs.get_str("URI").map(str::to_string);
    if kind != RenditionType::ClosedCaptions && uri.is_none() {
        return Err(HlsIngestError::parse(
            Some(line),
            "EXT-X-MEDIA missing URI (required except for CLOSED-CAPTIONS)",
        ));
    }
    let characteristics = attrs
        .get_str("CHARACTERISTICS")
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    Ok(MediaRendition {
        kind,
        group_id,
        name,
        uri,
        language: attrs.get_str("LANGUAGE").map(str::to_string),
        assoc_language: attrs.get_str("ASSOC-LANGUAGE").map(str::to_string),
        default: attrs.get_bool("DEFAULT"),
        autoselect: attrs.get_bool("AUTOSELECT"),
        forced: attrs.get_bool("FORCED"),
        instream_id: attrs.get_str("INSTREAM-ID").map(str::to_string),
        characteristics,
        channels: attrs.get_str("CHANNELS").map(str::to_string),
    })
}

fn build_session_data(line: usize, value: &str) -> Result<SessionData, HlsIngestError> {
    let attrs = parse_attribute_list(value);
    let data_id = attrs
        .get_str("DATA-ID")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-SESSION-DATA missing DATA-ID"))?
        .to_string();
    Ok(SessionData {
        data_id,
        value: attrs.get_str("VALUE").map(str::to_string),
        uri: attrs.get_str("URI").map(str::to_string),
        language: attrs.get_str("LANGUAGE").map(str::to_string),
    })
}

fn build_key(line: usize, value: &str) -> Result<EncryptionKey, HlsIngestError> {
    let attrs = parse_attribute_list(value);
    let method = attrs
        .get_str("METHOD")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-KEY missing METHOD"))?
        .to_string();
    Ok(EncryptionKey {
        method,
        uri: attrs.get_str("URI").map(str::to_string),
        iv: attrs.get_str("IV").map(str::to_string),
        key_format: attrs.get_str("KEYFORMAT").map(str::to_string),
        key_format_versions: attrs.get_str("KEYFORMATVERSIONS").map(str::to_string),
    })
}

fn parse_version(line: usize, value: &str) -> Result<u32, HlsIngestError> {
    value
        .trim()
        .parse()
        .map_err(|_| HlsIngestError::parse(Some(line), format!("invalid EXT-X-VERSION: {value}")))
}

struct MediaParseState {
    playlist: MediaPlaylist,
    byte_range_cursor: u64,
    current_map: Option<MapTag>,
    current_key: Option<EncryptionKey>,
    pending_duration: Option<(f64, Option<String>)>,
    pending_byte_range: Option<ByteRange>,
    pending_discontinuity: bool,
    pending_program_date_time: Option<DateTime<Utc>>,
    pending_gap: bool,
    pending_bitrate: Option<u64>,
}

impl MediaParseState {
    fn new() -> Self {
        Self {
            playlist: MediaPlaylist::default(),
            byte_range_cursor: 0,
            current_map: None,
            current_key: None,
            pending_duration: None,
            pending_byte_range: None,
            pending_discontinuity: false,
            pending_program_date_time: None,
            pending_gap: false,
            pending_bitrate: None,
        }
    }

    fn take_segment(&mut self, uri: &str) -> Segment {
        let (duration, title) = self.pending_duration.take().unwrap_or((0.0, None));
        Segment {
            duration,
            title,
            uri: uri.to_string(),
            byte_range: self.pending_byte_range.take(),
            discontinuity: std::mem::take(&mut self.pending_discontinuity),
            program_date_time: self.pending_program_date_time.take(),
            key: self.current_key.clone(),
            map: self.current_map.clone(),
            gap: std::mem::take(&mut self.pending_gap),
            bitrate: self.pending_bitrate.take(),
        }
    }
}

fn parse_media(lines: &[(usize, Line)]) -> Result<MediaPlaylist, HlsIngestError> {
    let mut st = MediaParseState::new();

    for (line_no, line) in lines {
        let line_no = *line_no;
        match line {
            Line::Tag { name, value } => match *name {
                "EXTM3U" => {}
                "EXT-X-VERSION" => st.playlist.version = parse_version(line_no, value)?,
                "EXT-X-INDEPENDENT-SEGMENTS" => st.playlist.independent_segments = true,
                "EXT-X-TARGETDURATION" => {
                    st.playlist.target_duration = value.trim().parse().map_err(|_| {
                        HlsIngestError::parse(Some(line_no), "invalid EXT-X-TARGETDURATION")
                    })?;
                }
                "EXT-X-MEDIA-SEQUENCE" => {
                    st.playlist.media_sequence = value.trim().parse().map_err(|_| {
                        HlsIngestError::parse(Some(line_no), "invalid EXT-X-MEDIA-SEQUENCE")
                    })?;
                }
                "EXT-X-DISCONTINUITY-SEQUENCE" => {
                    st.playlist.discontinuity_sequence = Some(value.trim().parse().map_err(
                        |_| HlsIngestError::parse(Some(line_no), "invalid EXT-X-DISCONTINUITY-SEQUENCE"),
                    )?);
                }
                "EXT-X-PLAYLIST-TYPE" => {
                    st.playlist.playlist_type = Some(PlaylistType::parse(value.trim()).ok_or_else(
                        || HlsIngestError::parse(Some(line_no), format!("invalid EXT-X-PLAYLIST-TYPE: {value}")),
                    )?);
                }
                "EXT-X-I-FRAMES-ONLY" => st.playlist.i_frames_only = true,
                "EXT-X-ENDLIST" => st.playlist.end_list = true,
                "EXT-X-START" => {
                    let attrs = parse_attribute_list(value);
                    let time_offset = attrs.get_f64("TIME-OFFSET").ok_or_else(|| {
                        HlsIngestError::parse(Some(line_no), "EXT-X-START missing TIME-OFFSET")
                    })?;
                    st.playlist.start = Some(StartOffset {
                        time_offset,
                        precise: attrs.get_bool("PRECISE"),
                    });
                }
                "EXTINF" => {
                    let (dur, title) = value
                        .split_once(',')
                        .map(|(d, t)| (d, Some(t).filter(|s| !s.is_empty())))
                        .unwrap_or((value, None));
                    let duration: f64 = dur.trim().parse().map_err(|_| {
                        HlsIngestError::parse(Some(line_no), format!("invalid EXTINF duration: {dur}"))
                    })?;
                    st.pending_duration = Some((duration, title.map(str::to_string)));
                }
                "EXT-X-BYTERANGE" => {
                    let (len_str, off_str) = value.split_once('@').unzip();
                    let length: u64 = len_str
                        .unwrap_or(value)
                        .trim()
                        .parse()
                        .map_err(|_| HlsIngestError::parse(Some(line_no), "invalid EXT-X-BYTERANGE"))?;
                    let (offset, offset_explicit) = match off_str {
                        Some(s) => (
                            s.trim().parse::<u64>().map_err(|_| {
                                HlsIngestError::parse(Some(line_no), "invalid EXT-X-BYTERANGE offset")
                            })?,
                            true,
                        ),
                        None => (st.byte_range_cursor, false),
                    };
                    st.byte_range_cursor = offset + length;
                    st.pending_byte_range = Some(ByteRange {
                        length,
                        offset,
                        offset_explicit,
                    });
                }
                "EXT-X-DISCONTINUITY" => st.pending_discontinuity = true,
                "EXT-X-PROGRAM-DATE-TIME" => {
                    let dt = DateTime::parse_from_rfc3339(value.trim())
                        .map_err(|e| {
                            HlsIngestError::parse(
                                Some(line_no),
                                format!("invalid EXT-X-PROGRAM-DATE-TIME: {e}"),
                            )
                        })?
                        .with_timezone(&Utc);
                    st.pending_program_date_time = Some(dt);
                }
                "EXT-X-KEY" => {
                    let key = build_key(line_no, value)?;
                    if key.method == "NONE" {
                        st.current_key = None;
                    } else {
                        st.current_key = Some(key);
                    }
                }
                "EXT-X-MAP" => {
                    let attrs = parse_attribute_list(value);
                    let uri = attrs
                        .get_str("URI")
                        .ok_or_else(|| HlsIngestError::parse(Some(line_no), "EXT-X-MAP missing URI"))?
                        .to_string();
                    let byte_range = match attrs.get_str("BYTERANGE") {
                        Some(s) => Some(parse_map_byterange(line_no, s)?),
                        None => None,
                    };
                    st.current_map = Some(MapTag { uri, byte_range });
                }
                "EXT-X-GAP" => st.pending_gap = true,
                "EXT-X-BITRATE" => {
                    let kbps: u64 = value.trim().parse().map_err(|_| {
                        HlsIngestError::parse(Some(line_no), "invalid EXT-X-BITRATE")
                    })?;
                    st.pending_bitrate = Some(kbps * 1000);
                }
                "EXT-X-DATERANGE" => {
                    st.playlist.date_ranges.push(build_date_range(line_no, value)?);
                }
                _ => { /* unknown tags ignored, §4.1 */ }
            },
            Line::Uri(uri) => {
                let segment = st.take_segment(uri);
                st.playlist.segments.push(segment);
            }
            Line::Comment | Line::Blank => {}
        }
    }

    Ok(st.playlist)
}

fn parse_map_byterange(line: usize, s: &str) -> Result<ByteRange, HlsIngestError> {
    let (len_str, off_str) = s
        .split_once('@')
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-MAP BYTERANGE missing @OFFSET"))?;
    let length = len_str
        .trim()
        .parse()
        .map_err(|_| HlsIngestError::parse(Some(line), "invalid EXT-X-MAP BYTERANGE length"))?;
    let offset = off_str
        .trim()
        .parse()
        .map_err(|_| HlsIngestError::parse(Some(line), "invalid EXT-X-MAP BYTERANGE offset"))?;
    Ok(ByteRange {
        length,
        offset,
        offset_explicit: true,
    })
}

fn build_date_range(line: usize, value: &str) -> Result<DateRange, HlsIngestError> {
    let attrs = parse_attribute_list(value);
    let id = attrs
        .get_str("ID")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-DATERANGE missing ID"))?
        .to_string();
    let start_date_str = attrs
        .get_str("START-DATE")
        .ok_or_else(|| HlsIngestError::parse(Some(line), "EXT-X-DATERANGE missing START-DATE"))?;
    let start_date = DateTime::parse_from_rfc3339(start_date_str)
        .map_err(|e| HlsIngestError::parse(Some(line), format!("invalid START-DATE: {e}")))?
        .with_timezone(&Utc);
    let end_date = attrs
        .get_str("END-DATE")
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| HlsIngestError::parse(Some(line), format!("invalid END-DATE: {e}")))
        })
        .transpose()?;

    let mut client_attributes = std::collections::BTreeMap::new();
    for (k, v) in attrs.iter() {
        if let Some(stripped) = k.strip_prefix("X-") {
            let value = match v.parse::<f64>() {
                Ok(n) => DateRangeValue::Number(n),
                Err(_) => DateRangeValue::String(v.clone()),
            };
            client_attributes.insert(stripped.to_string(), value);
        }
    }

    Ok(DateRange {
        id,
        class: attrs.get_str("CLASS").map(str::to_string),
        start_date,
        end_date,
        duration: attrs.get_f64("DURATION"),
        planned_duration: attrs.get_f64("PLANNED-DURATION"),
        end_on_next: attrs.get_bool("END-ON-NEXT"),
        client_attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_extm3u() {
        let err = parse_playlist("#EXT-X-VERSION:3\n").unwrap_err();
        assert!(matches!(err, HlsIngestError::Parse { .. }));
    }

    #[test]
    fn parses_simple_media_playlist() {
        let text = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:5\n#EXTINF:9.009,\nseg0.ts\n#EXTINF:9.009,\nseg1.ts\n#EXT-X-ENDLIST\n";
        let playlist = parse_playlist(text).unwrap();
        let media = playlist.as_media().unwrap();
        assert_eq!(media.target_duration, 10);
        assert_eq!(media.media_sequence, 5);
        assert_eq!(media.segments.len(), 2);
        assert!(media.end_list);
        assert_eq!(media.segments[0].uri, "seg0.ts");
        assert!((media.segments[0].duration - 9.009).abs() < 1e-9);
    }

    #[test]
    fn classifies_master_by_stream_inf() {
        let text = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2560000\nhigh.m3u8\n";
        let playlist = parse_playlist(text).unwrap();
        let master = playlist.as_master().unwrap();
        assert_eq!(master.variants.len(), 2);
        assert_eq!(master.variants[0].bandwidth, 1280000);
        assert_eq!(master.variants[1].uri, "high.m3u8");
    }

    #[test]
    fn missing_bandwidth_is_parse_error() {
        let text = "#EXTM3U\n#EXT-X-STREAM-INF:CODECS=\"avc1\"\nlow.m3u8\n";
        let err = parse_playlist(text).unwrap_err();
        match err {
            HlsIngestError::Parse { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn byte_range_elided_offset_continues_cursor() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\n#EXT-X-BYTERANGE:1000@0\nseg.mp4\n#EXTINF:10,\n#EXT-X-BYTERANGE:500\nseg.mp4\n";
        let playlist = parse_playlist(text).unwrap();
        let media = playlist.as_media().unwrap();
        let br0 = media.segments[0].byte_range.unwrap();
        let br1 = media.segments[1].byte_range.unwrap();
        assert_eq!(br0.offset, 0);
        assert_eq!(br1.offset, 1000);
        assert!(!br1.offset_explicit);
    }

    #[test]
    fn map_and_key_persist_until_changed() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXT-X-KEY:METHOD=AES-128,URI=\"key1\"\n#EXTINF:10,\nseg0.mp4\n#EXTINF:10,\nseg1.mp4\n#EXT-X-KEY:METHOD=NONE\n#EXTINF:10,\nseg2.mp4\n";
        let playlist = parse_playlist(text).unwrap();
        let media = playlist.as_media().unwrap();
        assert!(media.segments[0].map.is_some());
        assert!(media.segments[1].map.is_some());
        assert_eq!(media.segments[1].map.as_ref().unwrap().uri, "init.mp4");
        assert!(media.segments[0].key.is_some());
        assert!(media.segments[1].key.is_some());
        assert!(media.segments[2].key.is_none());
    }
}
