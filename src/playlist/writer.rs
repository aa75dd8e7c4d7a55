//! Round-trippable M3U8 writer (spec §4.1).
//!
//! Suppresses the version tag when version == 1, suppresses
//! `EXT-X-MEDIA-SEQUENCE` when zero, elides repeated `EXT-X-KEY`/
//! `EXT-X-MAP` when identical to the prior emitted value, emits
//! `#EXT-X-KEY:METHOD=NONE` when the key is cleared, and formats segment
//! durations with up to three trailing decimals, zeros trimmed.

use std::fmt::Write as _;

use super::{
    ByteRange, DateRangeValue, EncryptionKey, MapTag, MasterPlaylist, MediaPlaylist, Playlist,
    Segment,
};

pub fn write_playlist(playlist: &Playlist) -> String {
    match playlist {
        Playlist::Master(m) => write_master_playlist(m),
        Playlist::Media(m) => write_media_playlist(m),
    }
}

pub fn write_master_playlist(p: &MasterPlaylist) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    if p.version != 1 {
        let _ = writeln!(out, "#EXT-X-VERSION:{}", p.version);
    }
    if p.independent_segments {
        out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
    }
    for sd in &p.session_data {
        let mut attrs = format!("DATA-ID=\"{}\"", sd.data_id);
        if let Some(v) = &sd.value {
            let _ = write!(attrs, ",VALUE=\"{v}\"");
        }
        if let Some(u) = &sd.uri {
            let _ = write!(attrs, ",URI=\"{u}\"");
        }
        if let Some(l) = &sd.language {
            let _ = write!(attrs, ",LANGUAGE=\"{l}\"");
        }
        let _ = writeln!(out, "#EXT-X-SESSION-DATA:{attrs}");
    }
    if let Some(k) = &p.session_key {
        let _ = writeln!(out, "#EXT-X-SESSION-KEY:{}", format_key_attrs(k));
    }
    for r in &p.renditions {
        let mut attrs = format!(
            "TYPE={},GROUP-ID=\"{}\",NAME=\"{}\"",
            r.kind.as_str(),
            r.group_id,
            r.name
        );
        if let Some(u) = &r.uri {
            let _ = write!(attrs, ",URI=\"{u}\"");
        }
        if let Some(l) = &r.language {
            let _ = write!(attrs, ",LANGUAGE=\"{l}\"");
        }
        if let Some(l) = &r.assoc_language {
            let _ = write!(attrs, ",ASSOC-LANGUAGE=\"{l}\"");
        }
        if r.default {
            attrs.push_str(",DEFAULT=YES");
        }
        if r.autoselect {
            attrs.push_str(",AUTOSELECT=YES");
        }
        if r.forced {
            attrs.push_str(",FORCED=YES");
        }
        if let Some(id) = &r.instream_id {
            let _ = write!(attrs, ",INSTREAM-ID=\"{id}\"");
        }
        if !r.characteristics.is_empty() {
            let _ = write!(attrs, ",CHARACTERISTICS=\"{}\"", r.characteristics.join(","));
        }
        if let Some(c) = &r.channels {
            let _ = write!(attrs, ",CHANNELS=\"{c}\"");
        }
        let _ = writeln!(out, "#EXT-X-MEDIA:{attrs}");
    }
    for v in &p.variants {
        let mut attrs = format!("BANDWIDTH={}", v.bandwidth);
        if let Some(a) = v.average_bandwidth {
            let _ = write!(attrs, ",AVERAGE-BANDWIDTH={a}");
        }
        if let Some(res) = v.resolution {
            let _ = write!(attrs, ",RESOLUTION={}x{}", res.width, res.height);
        }
        if let Some(fr) = v.frame_rate {
            let _ = write!(attrs, ",FRAME-RATE={}", format_trimmed(fr, 3));
        }
        if let Some(c) = &v.codecs {
            let _ = write!(attrs, ",CODECS=\"{c}\"");
        }
        if let Some(g) = &v.audio_group {
            let _ = write!(attrs, ",AUDIO=\"{g}\"");
        }
        if let Some(g) = &v.video_group {
            let _ = write!(attrs, ",VIDEO=\"{g}\"");
        }
        if let Some(g) = &v.subtitles_group {
            let _ = write!(attrs, ",SUBTITLES=\"{g}\"");
        }
        if let Some(g) = &v.closed_captions_group {
            let _ = write!(attrs, ",CLOSED-CAPTIONS=\"{g}\"");
        }
        if let Some(h) = &v.hdcp_level {
            let _ = write!(attrs, ",HDCP-LEVEL=\"{h}\"");
        }
        let _ = writeln!(out, "#EXT-X-STREAM-INF:{attrs}");
        let _ = writeln!(out, "{}", v.uri);
    }
    out
}

pub fn write_media_playlist(p: &MediaPlaylist) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    if p.version != 1 {
        let _ = writeln!(out, "#EXT-X-VERSION:{}", p.version);
    }
    if p.independent_segments {
        out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
    }
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", p.target_duration);
    if p.media_sequence != 0 {
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", p.media_sequence);
    }
    if let Some(ds) = p.discontinuity_sequence {
        let _ = writeln!(out, "#EXT-X-DISCONTINUITY-SEQUENCE:{ds}");
    }
    if let Some(pt) = p.playlist_type {
        let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:{}", pt.as_str());
    }
    if p.i_frames_only {
        out.push_str("#EXT-X-I-FRAMES-ONLY\n");
    }
    if let Some(start) = p.start {
        let mut attrs = format!("TIME-OFFSET={}", format_trimmed(start.time_offset, 3));
        if start.precise {
            attrs.push_str(",PRECISE=YES");
        }
        let _ = writeln!(out, "#EXT-X-START:{attrs}");
    }
    for dr in &p.date_ranges {
        let _ = writeln!(out, "#EXT-X-DATERANGE:{}", format_date_range_attrs(dr));
    }

    let mut last_map: Option<&MapTag> = None;
    let mut last_key: Option<&EncryptionKey> = None;
    let mut emitted_any_key = false;

    for seg in &p.segments {
        if seg.discontinuity {
            out.push_str("#EXT-X-DISCONTINUITY\n");
        }
        if seg.key.as_ref() != last_key {
            match &seg.key {
                Some(k) => {
                    let _ = writeln!(out, "#EXT-X-KEY:{}", format_key_attrs(k));
                }
                None if emitted_any_key => {
                    out.push_str("#EXT-X-KEY:METHOD=NONE\n");
                }
                None => {}
            }
            last_key = seg.key.as_ref();
            emitted_any_key = true;
        }
        if seg.map.as_ref() != last_map {
            if let Some(m) = &seg.map {
                let mut attrs = format!("URI=\"{}\"", m.uri);
                if let Some(br) = &m.byte_range {
                    let _ = write!(attrs, ",BYTERANGE=\"{}@{}\"", br.length, br.offset);
                }
                let _ = writeln!(out, "#EXT-X-MAP:{attrs}");
            }
            last_map = seg.map.as_ref();
        }
        if let Some(pdt) = seg.program_date_time {
            let _ = writeln!(
                out,
                "#EXT-X-PROGRAM-DATE-TIME:{}",
                pdt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            );
        }
        if let Some(bitrate) = seg.bitrate {
            let _ = writeln!(out, "#EXT-X-BITRATE:{}", bitrate / 1000);
        }
        if let Some(br) = &seg.byte_range {
            let _ = writeln!(out, "#EXT-X-BYTERANGE:{}", format_byte_range(br));
        }
        if seg.gap {
            out.push_str("#EXT-X-GAP\n");
        }
        write_extinf(&mut out, seg);
        let _ = writeln!(out, "{}", seg.uri);
    }

    if p.end_list {
        out.push_str("#EXT-X-ENDLIST\n");
    }
    out
}

fn write_extinf(out: &mut String, seg: &Segment) {
    let duration = format_trimmed(seg.duration, 3);
    match &seg.title {
        Some(t) => {
            let _ = writeln!(out, "#EXTINF:{duration},{t}");
        }
        None => {
            let _ = writeln!(out, "#EXTINF:{duration},");
        }
    }
}

fn format_byte_range(br: &ByteRange) -> String {
    if br.offset_explicit {
        format!("{}@{}", br.length, br.offset)
    } else {
        br.length.to_string()
    }
}

fn format_key_attrs(k: &EncryptionKey) -> String {
    let mut attrs = format!("METHOD={}", k.method);
    if let Some(u) = &k.uri {
        let _ = write!(attrs, ",URI=\"{u}\"");
    }
    if let Some(iv) = &k.iv {
        let _ = write!(attrs, ",IV={iv}");
    }
    if let Some(kf) = &k.key_format {
        let _ = write!(attrs, ",KEYFORMAT=\"{kf}\"");
    }
    if let Some(kfv) = &k.key_format_versions {
        let _ = write!(attrs, ",KEYFORMATVERSIONS=\"{kfv}\"");
    }
    attrs
}

fn format_date_range_attrs(dr: &super::DateRange) -> String {
    let mut attrs = format!(
        "ID=\"{}\",START-DATE=\"{}\"",
        dr.id,
        dr.start_date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    );
    if let Some(c) = &dr.class {
        let _ = write!(attrs, ",CLASS=\"{c}\"");
    }
    if let Some(e) = dr.end_date {
        let _ = write!(
            attrs,
            ",END-DATE=\"{}\"",
            e.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        );
    }
    if let Some(d) = dr.duration {
        let _ = write!(attrs, ",DURATION={}", format_trimmed(d, 3));
    }
    if let Some(d) = dr.planned_duration {
        let _ = write!(attrs, ",PLANNED-DURATION={}", format_trimmed(d, 3));
    }
    if dr.end_on_next {
        attrs.push_str(",END-ON-NEXT=YES");
    }
    for (k, v) in &dr.client_attributes {
        match v {
            DateRangeValue::Number(n) => {
                let _ = write!(attrs, ",X-{k}={}", format_trimmed(*n, 6));
            }
            DateRangeValue::String(s) => {
                let _ = write!(attrs, ",X-{k}=\"{s}\"");
            }
        }
    }
    attrs
}

/// Format a float with up to `max_decimals` trailing digits, trimming
/// trailing zeros (and a trailing `.` if nothing remains), per spec §4.1.
fn format_trimmed(value: f64, max_decimals: usize) -> String {
    let s = format!("{value:.max_decimals$}");
    let s = s.trim_end_matches('0');
    let s = s.trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
