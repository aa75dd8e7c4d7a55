//! Output mirror (spec §2 C9, SPEC_FULL §12): the same playlist model,
//! mirrored outward — a segment writer plus a playlist emitter targeting
//! memory, a callback, or the filesystem, instead of feeding a demuxer
//! forward. Optional; exists for symmetry with the ingest side. Grounded
//! on the teacher's `mux/hls.rs::HlsVariant`/`HlsMuxer` (rolling segment
//! window, re-rendered playlist on every append) and `egress/hls.rs`
//! (the egress-side counterpart that drives it), adapted to fMP4 segments
//! and to the three in-process targets this crate's Non-goals allow
//! (spec §1: "writing HLS output is mentioned only as the mirror
//! interface").

mod writer;

pub use writer::{build_playlist, segment_file_name, MirrorSegment, INIT_SEGMENT_FILE_NAME, PLAYLIST_FILE_NAME};

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::playlist::write_media_playlist;

/// In-memory store backing [`MirrorTarget::Memory`]: file name to bytes,
/// read back out by whatever owns the `Arc`.
#[derive(Default)]
pub struct MemoryMirrorStore {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryMirrorStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    fn put(&self, name: String, data: Bytes) {
        self.files.lock().unwrap().insert(name, data);
    }

    fn remove(&self, name: &str) {
        self.files.lock().unwrap().remove(name);
    }
}

/// Where mirrored output (init segment, media segments, playlist text)
/// lands (spec §2 C9 "targeting memory, callbacks, or filesystem").
pub enum MirrorTarget {
    Memory(Arc<MemoryMirrorStore>),
    Callback(Arc<dyn Fn(&str, Bytes) + Send + Sync>),
    Filesystem(PathBuf),
}

impl MirrorTarget {
    fn write(&self, name: &str, data: Bytes) -> anyhow::Result<()> {
        match self {
            MirrorTarget::Memory(store) => {
                store.put(name.to_string(), data);
                Ok(())
            }
            MirrorTarget::Callback(cb) => {
                cb(name, data);
                Ok(())
            }
            MirrorTarget::Filesystem(dir) => {
                std::fs::create_dir_all(dir)?;
                std::fs::write(dir.join(name), &data)?;
                Ok(())
            }
        }
    }

    fn remove(&self, name: &str) {
        match self {
            MirrorTarget::Memory(store) => store.remove(name),
            MirrorTarget::Callback(_) => {}
            MirrorTarget::Filesystem(dir) => {
                let _ = std::fs::remove_file(dir.join(name));
            }
        }
    }
}

/// Default rolling-window size, matching the teacher's `HlsVariant::MAX_SEGMENTS`.
pub const DEFAULT_MAX_MIRRORED_SEGMENTS: usize = 10;

/// Mirrors a sequence of fMP4 segments back out through a [`MirrorTarget`],
/// maintaining a rolling window and rewriting the playlist on every append
/// (spec §2 C9, grounded on `HlsVariant::add_segment`/`write_playlist`).
pub struct HlsMirror {
    target: MirrorTarget,
    target_duration: u64,
    max_segments: usize,
    segments: VecDeque<MirrorSegment>,
    init_written: bool,
    end_list: bool,
}

impl HlsMirror {
    pub fn new(target: MirrorTarget, target_duration: u64) -> Self {
        Self {
            target,
            target_duration,
            max_segments: DEFAULT_MAX_MIRRORED_SEGMENTS,
            segments: VecDeque::new(),
            init_written: false,
            end_list: false,
        }
    }

    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments.max(1);
        self
    }

    /// Write the init segment once; idempotent, matching the demuxer-side
    /// lazy-init-segment contract (spec §4.4 `init`).
    pub fn write_init_segment(&mut self, data: Bytes) -> anyhow::Result<()> {
        if self.init_written {
            return Ok(());
        }
        self.target.write(INIT_SEGMENT_FILE_NAME, data)?;
        self.init_written = true;
        Ok(())
    }

    /// Append one fMP4 segment, evicting the oldest if the rolling window
    /// is full (spec §2 C9; grounded on `HlsVariant::add_segment`'s
    /// `MAX_SEGMENTS` drain), then rewrite the playlist.
    pub fn append_segment(&mut self, media_sequence: u64, duration: f64, data: Bytes) -> anyhow::Result<()> {
        self.target.write(&segment_file_name(media_sequence), data.clone())?;
        self.segments.push_back(MirrorSegment {
            media_sequence,
            duration,
            data,
        });
        while self.segments.len() > self.max_segments {
            if let Some(evicted) = self.segments.pop_front() {
                self.target.remove(&evicted.file_name());
            }
        }
        self.write_playlist()
    }

    /// Mark the mirrored stream complete (spec §3 `end_list=true`), then
    /// rewrite the playlist a final time with `#EXT-X-ENDLIST`.
    pub fn mark_ended(&mut self) -> anyhow::Result<()> {
        self.end_list = true;
        self.write_playlist()
    }

    fn write_playlist(&self) -> anyhow::Result<()> {
        let segments: Vec<MirrorSegment> = self.segments.iter().cloned().collect();
        let playlist = build_playlist(&segments, self.target_duration, self.end_list);
        let text = write_media_playlist(&playlist);
        self.target.write(PLAYLIST_FILE_NAME, Bytes::from(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_target_round_trips_init_segments_and_playlist() {
        let store = MemoryMirrorStore::new();
        let mut mirror = HlsMirror::new(MirrorTarget::Memory(store.clone()), 6).with_max_segments(2);
        mirror.write_init_segment(Bytes::from_static(b"ftyp moov")).unwrap();
        mirror.append_segment(0, 6.0, Bytes::from_static(b"seg0")).unwrap();
        mirror.append_segment(1, 6.0, Bytes::from_static(b"seg1")).unwrap();

        assert_eq!(store.get(INIT_SEGMENT_FILE_NAME).unwrap(), Bytes::from_static(b"ftyp moov"));
        let playlist_text = String::from_utf8(store.get(PLAYLIST_FILE_NAME).unwrap().to_vec()).unwrap();
        assert!(playlist_text.contains("0.m4s"));
        assert!(playlist_text.contains("1.m4s"));
    }

    #[test]
    fn rolling_window_evicts_oldest_segment_and_its_file() {
        let store = MemoryMirrorStore::new();
        let mut mirror = HlsMirror::new(MirrorTarget::Memory(store.clone()), 6).with_max_segments(2);
        mirror.append_segment(0, 6.0, Bytes::from_static(b"seg0")).unwrap();
        mirror.append_segment(1, 6.0, Bytes::from_static(b"seg1")).unwrap();
        mirror.append_segment(2, 6.0, Bytes::from_static(b"seg2")).unwrap();

        assert!(store.get("0.m4s").is_none());
        assert!(store.get("1.m4s").is_some());
        assert!(store.get("2.m4s").is_some());
        let playlist_text = String::from_utf8(store.get(PLAYLIST_FILE_NAME).unwrap().to_vec()).unwrap();
        assert!(!playlist_text.contains("0.m4s"));
    }

    #[test]
    fn mark_ended_emits_endlist_tag() {
        let store = MemoryMirrorStore::new();
        let mut mirror = HlsMirror::new(MirrorTarget::Memory(store.clone()), 6);
        mirror.append_segment(0, 6.0, Bytes::from_static(b"seg0")).unwrap();
        mirror.mark_ended().unwrap();
        let playlist_text = String::from_utf8(store.get(PLAYLIST_FILE_NAME).unwrap().to_vec()).unwrap();
        assert!(playlist_text.contains("EXT-X-ENDLIST"));
    }

    #[test]
    fn callback_target_invoked_for_each_write() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let target = MirrorTarget::Callback(Arc::new(move |name: &str, _data: Bytes| {
            seen_cb.lock().unwrap().push(name.to_string());
        }));
        let mut mirror = HlsMirror::new(target, 6);
        mirror.write_init_segment(Bytes::from_static(b"init")).unwrap();
        mirror.append_segment(0, 6.0, Bytes::from_static(b"seg0")).unwrap();

        let names = seen.lock().unwrap().clone();
        assert!(names.contains(&INIT_SEGMENT_FILE_NAME.to_string()));
        assert!(names.contains(&"0.m4s".to_string()));
        assert!(names.contains(&PLAYLIST_FILE_NAME.to_string()));
    }
}
