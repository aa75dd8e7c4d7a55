//! Collaborator contracts consumed by this crate (spec §6): the fMP4
//! demuxer and the generic byte-source interface it reads through. Actual
//! box parsing and decoding live outside this crate; these traits are the
//! seam a concrete demuxer implementation plugs into.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::fragment_lookup::FragmentEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Track metadata as reported by `read_metadata()` (spec §4.6
/// `video_tracks()`/`audio_tracks()`).
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub kind: TrackKind,
    pub codec: Option<String>,
    pub language: Option<String>,
    pub channels: Option<u32>,
    pub bitrate: Option<u64>,
    /// True for an audio track carried in a separate `EXT-X-MEDIA` rendition
    /// rather than muxed into the selected variant (spec §4.6 "aggregate
    /// muxed audio with any matching separate audio-rendition input").
    pub from_separate_rendition: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemuxerMetadata {
    pub video_tracks: Vec<Track>,
    pub audio_tracks: Vec<Track>,
}

/// The byte source contract (spec §6): `retrieve_size` is best-effort
/// (`None` for an open-ended live stream); `read` may return fewer bytes
/// than requested on truncation, never more.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn retrieve_size(&self) -> Option<u64>;
    async fn read(&self, start: u64, end: u64) -> Result<Option<(Bytes, u64)>>;
}

/// The fMP4 demuxer contract this crate drives but does not implement
/// (spec §6 "fMP4 demuxer exposing..."). A concrete implementation is
/// bound to a `ByteSource` via a format-detection probe before use.
#[async_trait]
pub trait Demuxer: Send + Sync {
    async fn read_metadata(&mut self) -> Result<DemuxerMetadata>;

    /// Subtract the first decoded packet's timestamp from every packet in
    /// the stream so playback starts at zero (spec §4.7).
    async fn normalize_start_timestamp(&mut self) -> Result<()>;

    fn populate_fragment_lookup_table_from_segments(&mut self, entries: &[FragmentEntry]);
    fn adjust_fragment_lookup_table_for_edit_list_offset(&mut self, edit_list_offset: f64);
    fn append_fragments_to_lookup_table(&mut self, entries: &[FragmentEntry], start_time_seconds: f64);
    fn remove_old_fragments_from_lookup_table(&mut self, segment_ids: &[u64]);

    /// Bind this demuxer to the live fragmented byte source once format
    /// detection has probed and matched it (spec §6 "bound to the source
    /// via a format-detection probe").
    fn set_fragmented_source(&mut self, source: std::sync::Arc<dyn ByteSource>);
}
