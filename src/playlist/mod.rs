//! Immutable value types for master/media HLS playlists (spec §3, C1).

mod attributes;
mod parser;
mod tags;
mod writer;

pub use parser::parse_playlist;
pub use writer::{write_master_playlist, write_media_playlist, write_playlist};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// A parsed playlist: either a master (multivariant) playlist or a leaf
/// media playlist (spec §3 "Playlist (sum type)").
#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

impl Playlist {
    pub fn is_master(&self) -> bool {
        matches!(self, Playlist::Master(_))
    }

    pub fn as_master(&self) -> Option<&MasterPlaylist> {
        match self {
            Playlist::Master(m) => Some(m),
            Playlist::Media(_) => None,
        }
    }

    pub fn as_media(&self) -> Option<&MediaPlaylist> {
        match self {
            Playlist::Media(m) => Some(m),
            Playlist::Master(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlaylist {
    pub version: u32,
    pub independent_segments: bool,
    pub variants: Vec<Variant>,
    pub renditions: Vec<MediaRendition>,
    pub session_data: Vec<SessionData>,
    pub session_key: Option<EncryptionKey>,
}

impl Default for MasterPlaylist {
    fn default() -> Self {
        Self {
            version: 1,
            independent_segments: false,
            variants: Vec::new(),
            renditions: Vec::new(),
            session_data: Vec::new(),
            session_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub bandwidth: u64,
    pub average_bandwidth: Option<u64>,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f64>,
    pub codecs: Option<String>,
    pub uri: String,
    pub audio_group: Option<String>,
    pub video_group: Option<String>,
    pub subtitles_group: Option<String>,
    pub closed_captions_group: Option<String>,
    pub hdcp_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenditionType {
    Audio,
    Video,
    Subtitles,
    ClosedCaptions,
}

impl RenditionType {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "AUDIO" => Some(Self::Audio),
            "VIDEO" => Some(Self::Video),
            "SUBTITLES" => Some(Self::Subtitles),
            "CLOSED-CAPTIONS" => Some(Self::ClosedCaptions),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "AUDIO",
            Self::Video => "VIDEO",
            Self::Subtitles => "SUBTITLES",
            Self::ClosedCaptions => "CLOSED-CAPTIONS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRendition {
    pub kind: RenditionType,
    pub group_id: String,
    pub name: String,
    /// Required except for CLOSED-CAPTIONS (spec §3 MediaRendition).
    pub uri: Option<String>,
    pub language: Option<String>,
    pub assoc_language: Option<String>,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    pub instream_id: Option<String>,
    pub characteristics: Vec<String>,
    pub channels: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub data_id: String,
    pub value: Option<String>,
    pub uri: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
}

impl PlaylistType {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "VOD" => Some(Self::Vod),
            "EVENT" => Some(Self::Event),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Vod => "VOD",
            Self::Event => "EVENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartOffset {
    pub time_offset: f64,
    pub precise: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub version: u32,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub discontinuity_sequence: Option<u64>,
    pub playlist_type: Option<PlaylistType>,
    pub end_list: bool,
    pub i_frames_only: bool,
    pub independent_segments: bool,
    pub start: Option<StartOffset>,
    pub segments: Vec<Segment>,
    pub date_ranges: Vec<DateRange>,
}

impl Default for MediaPlaylist {
    fn default() -> Self {
        Self {
            version: 1,
            target_duration: 0,
            media_sequence: 0,
            discontinuity_sequence: None,
            playlist_type: None,
            end_list: false,
            i_frames_only: false,
            independent_segments: false,
            start: None,
            segments: Vec::new(),
            date_ranges: Vec::new(),
        }
    }
}

impl MediaPlaylist {
    /// Whether this playlist is live (will keep changing, spec §3 "absent ⇒ live").
    pub fn is_live(&self) -> bool {
        !self.end_list
    }

    /// The sequence number of the first segment in this playlist snapshot
    /// plus its position (spec §3 "the Nth listed segment has sequence
    /// media_sequence + N").
    pub fn sequence_of(&self, index: usize) -> u64 {
        self.media_sequence + index as u64
    }
}

/// Resolved byte range: `offset` is always known once parsed (the running
/// cursor from spec §4.1 is resolved at parse time); `offset_explicit`
/// records whether the source line carried `@OFFSET` so the writer can
/// reproduce elision on round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub length: u64,
    pub offset: u64,
    pub offset_explicit: bool,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionKey {
    pub method: String,
    pub uri: Option<String>,
    pub iv: Option<String>,
    pub key_format: Option<String>,
    pub key_format_versions: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapTag {
    pub uri: String,
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DateRangeValue {
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub id: String,
    pub class: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration: Option<f64>,
    pub planned_duration: Option<f64>,
    pub end_on_next: bool,
    /// Collected `X-*` client attributes (spec §4.1).
    pub client_attributes: BTreeMap<String, DateRangeValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration: f64,
    pub title: Option<String>,
    pub uri: String,
    pub byte_range: Option<ByteRange>,
    pub discontinuity: bool,
    pub program_date_time: Option<DateTime<Utc>>,
    pub key: Option<EncryptionKey>,
    pub map: Option<MapTag>,
    pub gap: bool,
    /// Bitrate in bits per second (spec §6: `EXT-X-BITRATE` is kbps, converted to bps).
    pub bitrate: Option<u64>,
}
