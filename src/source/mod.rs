//! The virtual byte-stream segment source (spec §4.4, C4): the heart of the
//! crate. Presents one linear, read-random-access byte stream stitched
//! together from a lazily-fetched init segment followed by fMP4 media
//! segments, with a live refresh loop that slides the tracking window
//! forward and expires old segments.

mod cache;
mod refresh;
mod segment_info;

pub use segment_info::SegmentInfo;

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::concurrency::LiveEdgeDebouncer;
use crate::error::{HlsIngestError, LiveEdgeKind, Result};
use crate::playlist::{parse_playlist, MediaPlaylist, Playlist};
use crate::resolver::FetchClient;
use crate::settings::Settings;
use crate::url_util::{create_range_header, resolve_url};
use cache::SegmentDataCache;

/// Called with the newly-tracked entries and their common starting time
/// whenever `ingest` appends segments (spec §4.4, set by the fragment-lookup
/// bridge, C4/C5).
pub type SegmentsAddedCallback = dyn Fn(&[SegmentInfo], f64) + Send + Sync;
/// Called with the expired sequence numbers whenever `refresh` drops them.
pub type SegmentsRemovedCallback = dyn Fn(&[u64]) + Send + Sync;

struct Inner {
    playlist_url: Url,
    initial_playlist: MediaPlaylist,
    initialized: bool,

    init_segment_data: Option<Bytes>,
    segment_info: std::collections::BTreeMap<u64, SegmentInfo>,
    known_sequences: VecDeque<u64>,
    data_cache: SegmentDataCache,

    next_segment_offset: u64,
    total_duration_seconds: f64,
    removed_duration_seconds: f64,
    segment_change_counter: u64,

    target_duration: u64,
    end_list: bool,
}

/// The spec's "SegmentSource": one instance per selected variant.
pub struct SegmentSource {
    client: Arc<dyn FetchClient>,
    settings: Settings,
    inner: Mutex<Inner>,
    on_segments_added: Mutex<Option<Arc<SegmentsAddedCallback>>>,
    on_segments_removed: Mutex<Option<Arc<SegmentsRemovedCallback>>>,
    refresh_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    cancel: CancellationToken,
    disposed: AtomicBool,
    /// Shared by every reader (video, audio) of this source so only one of
    /// them performs the live-edge recovery seek at a time (spec §5.2).
    live_edge_debouncer: Arc<LiveEdgeDebouncer>,
    /// Lets `&self` methods obtain an owned `Arc<Self>` to hand to
    /// `tokio::spawn` for the self-rearming refresh timer.
    self_ref: std::sync::Mutex<Option<std::sync::Weak<SegmentSource>>>,
}

impl SegmentSource {
    pub fn new(
        client: Arc<dyn FetchClient>,
        playlist_url: Url,
        initial_playlist: MediaPlaylist,
        settings: Settings,
    ) -> Arc<Self> {
        let cache = SegmentDataCache::new(settings.max_cached_segments);
        let live_edge_debouncer = Arc::new(LiveEdgeDebouncer::new(Duration::from_millis(
            settings.live_edge_debounce_ms,
        )));
        // Seed target_duration/end_list from the snapshot handed to us at
        // construction so callers that ask before the first `read` (e.g.
        // `HlsInput::is_live`/`target_duration`) see the real playlist state
        // rather than the zero-value default (ensure_init only overwrites
        // these again once lazy init actually runs).
        let target_duration = initial_playlist.target_duration;
        let end_list = initial_playlist.end_list;
        let inner = Inner {
            playlist_url,
            initial_playlist,
            initialized: false,
            init_segment_data: None,
            segment_info: std::collections::BTreeMap::new(),
            known_sequences: VecDeque::new(),
            data_cache: cache,
            next_segment_offset: 0,
            total_duration_seconds: 0.0,
            removed_duration_seconds: 0.0,
            segment_change_counter: 0,
            target_duration,
            end_list,
        };
        let arc = Arc::new(Self {
            client,
            settings,
            inner: Mutex::new(inner),
            on_segments_added: Mutex::new(None),
            on_segments_removed: Mutex::new(None),
            refresh_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            live_edge_debouncer,
            self_ref: std::sync::Mutex::new(None),
        });
        *arc.self_ref.lock().unwrap() = Some(Arc::downgrade(&arc));
        arc
    }

    /// The shared live-edge recovery gate (spec §5.2): the consumer's
    /// video and audio readers both call `try_begin_recovery()` on the same
    /// instance when they observe a `LiveEdgeError`, so only one of them
    /// performs the `3 × target_duration` seek-back while the rest stand
    /// down until the debounce window clears.
    pub fn live_edge_debouncer(&self) -> Arc<LiveEdgeDebouncer> {
        self.live_edge_debouncer.clone()
    }

    fn arc_self(&self) -> Arc<Self> {
        self.self_ref
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|w| w.upgrade())
            .expect("self_ref is initialized in SegmentSource::new")
    }

    pub async fn set_on_segments_added<F>(&self, f: F)
    where
        F: Fn(&[SegmentInfo], f64) + Send + Sync + 'static,
    {
        *self.on_segments_added.lock().await = Some(Arc::new(f));
    }

    pub async fn set_on_segments_removed<F>(&self, f: F)
    where
        F: Fn(&[u64]) + Send + Sync + 'static,
    {
        *self.on_segments_removed.lock().await = Some(Arc::new(f));
    }

    async fn notify_added(&self, entries: &[SegmentInfo], start_time: f64) {
        if entries.is_empty() {
            return;
        }
        let cb = self.on_segments_added.lock().await.clone();
        if let Some(cb) = cb {
            cb(entries, start_time);
        }
    }

    async fn notify_removed(&self, ids: &[u64]) {
        if ids.is_empty() {
            return;
        }
        let cb = self.on_segments_removed.lock().await.clone();
        if let Some(cb) = cb {
            cb(ids);
        }
    }

    /// *init (lazy)* (spec §4.4): fetch the init segment on first use, seed
    /// the tracking maps from the playlist snapshot given at construction,
    /// and arm the refresh timer for live streams.
    async fn ensure_init(&self) -> Result<()> {
        {
            let inner = self.inner.lock().await;
            if inner.initialized {
                return Ok(());
            }
        }

        let (playlist_url, initial) = {
            let inner = self.inner.lock().await;
            (inner.playlist_url.clone(), inner.initial_playlist.clone())
        };

        let map = initial
            .segments
            .iter()
            .find_map(|s| s.map.clone())
            .ok_or_else(|| HlsIngestError::UnsupportedMedia {
                message: "fMP4 required".to_string(),
            })?;

        let init_url = resolve_url(&map.uri, &playlist_url)?;
        let range_header = map.byte_range.as_ref().map(create_range_header);
        let (status, bytes) = tokio::time::timeout(
            Duration::from_millis(self.settings.init_fetch_deadline_ms),
            self.client.get(&init_url, range_header.as_deref()),
        )
        .await
        .map_err(|_| HlsIngestError::fetch(None, "init segment fetch timed out"))??;
        if status != 200 && status != 206 {
            return Err(HlsIngestError::fetch(
                Some(status),
                format!("init segment fetch failed for {init_url}"),
            ));
        }

        let (new_entries, start_time, is_live) = {
            let mut inner = self.inner.lock().await;
            if inner.initialized {
                return Ok(());
            }
            inner.next_segment_offset = bytes.len() as u64;
            inner.init_segment_data = Some(bytes);
            inner.target_duration = initial.target_duration;
            inner.end_list = initial.end_list;
            let (new_entries, start_time) = ingest_locked(&mut inner, &initial);
            inner.initialized = true;
            (new_entries, start_time, initial.is_live())
        };

        debug!("ingested {} segment(s) on init", new_entries.len());
        self.notify_added(&new_entries, start_time).await;

        if is_live {
            info!("live playlist at {playlist_url}, arming refresh timer");
            self.arm_refresh_timer();
        }
        Ok(())
    }

    /// *fetch_segment(ms)* (spec §4.4).
    async fn fetch_segment(&self, ms: u64) -> Result<Bytes> {
        {
            let mut inner = self.inner.lock().await;
            if let Some(data) = inner.data_cache.get(ms) {
                return Ok(data);
            }
        }

        let (uri, byte_range, playlist_url) = {
            let inner = self.inner.lock().await;
            let info = inner
                .segment_info
                .get(&ms)
                .ok_or_else(|| HlsIngestError::fetch(None, format!("unknown segment {ms}")))?;
            (
                info.segment.uri.clone(),
                info.segment.byte_range,
                inner.playlist_url.clone(),
            )
        };

        let url = resolve_url(&uri, &playlist_url)?;
        debug!("fetching segment {ms} from {url}");
        let range_header = byte_range.as_ref().map(create_range_header);
        let (status, data) = tokio::time::timeout(
            Duration::from_millis(self.settings.segment_fetch_deadline_ms),
            self.client.get(&url, range_header.as_deref()),
        )
        .await
        .map_err(|_| HlsIngestError::fetch(None, "segment fetch timed out"))??;
        if status != 200 && status != 206 {
            return Err(HlsIngestError::fetch(
                Some(status),
                format!("segment fetch failed for {url}"),
            ));
        }

        let mut inner = self.inner.lock().await;
        let needs_sizing = inner
            .segment_info
            .get(&ms)
            .map(|i| !i.end_known)
            .unwrap_or(false);
        if needs_sizing {
            let new_end = inner.segment_info.get(&ms).unwrap().start + data.len() as u64;
            propagate_sizes(&mut inner, ms, new_end);
        }
        let known: BTreeSet<u64> = inner.known_sequences.iter().copied().collect();
        inner.data_cache.insert(ms, data.clone(), &known);
        Ok(data)
    }

    /// *read(start, end)* (spec §4.4): serve bytes from
    /// `[init_segment_data][known segments]`, fetching and waiting as needed.
    pub async fn read(&self, start: u64, end: u64) -> Result<Option<(Bytes, u64)>> {
        self.ensure_init().await?;
        if end <= start {
            return Ok(Some((Bytes::new(), start)));
        }

        let mut out = Vec::new();
        let (init_len, is_live) = {
            let inner = self.inner.lock().await;
            (
                inner.init_segment_data.as_ref().map(|b| b.len() as u64).unwrap_or(0),
                !inner.end_list,
            )
        };

        if start < init_len {
            let inner = self.inner.lock().await;
            if let Some(init) = &inner.init_segment_data {
                let from = start as usize;
                let to = end.min(init_len) as usize;
                out.extend_from_slice(&init[from..to]);
            }
        }

        if start + out.len() as u64 >= end {
            return Ok(Some((Bytes::from(out), start)));
        }

        loop {
            let (first_start, last_end) = {
                let inner = self.inner.lock().await;
                let first_start = inner
                    .known_sequences
                    .front()
                    .and_then(|ms| inner.segment_info.get(ms))
                    .map(|i| i.start);
                // A provisional (not-yet-fetched, no byte-range) last segment
                // has `end == start`, which must NOT be mistaken for "nothing
                // beyond here" — it still needs to be fetched to learn its
                // size (spec §4.4 read).
                let last_end = inner
                    .known_sequences
                    .back()
                    .and_then(|ms| inner.segment_info.get(ms))
                    .filter(|i| i.end_known)
                    .map(|i| i.end);
                (first_start, last_end)
            };

            if let Some(first_start) = first_start {
                if start >= init_len && start < first_start {
                    if is_live {
                        return Err(HlsIngestError::LiveEdge(LiveEdgeKind::BehindWindow));
                    }
                    return Ok(empty_or(&out, start));
                }
            }

            let nothing_beyond = match last_end {
                Some(last_end) => start >= last_end,
                None => first_start.is_none() && start >= init_len,
            };

            if nothing_beyond {
                if is_live {
                    if self.wait_for_new_segments().await? {
                        continue;
                    }
                    return Err(HlsIngestError::LiveEdge(LiveEdgeKind::Timeout));
                }
                return Ok(empty_or(&out, start));
            }

            break;
        }

        let candidate_ms: Vec<u64> = {
            let inner = self.inner.lock().await;
            inner
                .known_sequences
                .iter()
                .copied()
                .filter(|ms| {
                    inner
                        .segment_info
                        .get(ms)
                        .map(|i| i.start < end && (i.end > start || !i.end_known))
                        .unwrap_or(false)
                })
                .collect()
        };

        for ms in candidate_ms {
            let already_cached = {
                let inner = self.inner.lock().await;
                inner.data_cache.contains(ms)
            };
            if !already_cached {
                self.fetch_segment(ms).await?;
            }
        }

        let final_segments: Vec<SegmentInfo> = {
            let inner = self.inner.lock().await;
            inner
                .known_sequences
                .iter()
                .filter_map(|ms| inner.segment_info.get(ms).cloned())
                .collect()
        };

        for info in &final_segments {
            if info.end <= start {
                continue;
            }
            if info.start >= end {
                break;
            }
            let data = {
                let mut inner = self.inner.lock().await;
                inner.data_cache.get(info.media_sequence)
            };
            if let Some(data) = data {
                let lo = start.max(info.start);
                let hi = end.min(info.end);
                if hi > lo && (lo - info.start) < data.len() as u64 {
                    let from = (lo - info.start) as usize;
                    let to = ((hi - info.start) as usize).min(data.len());
                    out.extend_from_slice(&data[from..to]);
                }
            }
        }

        Ok(empty_or(&out, start))
    }

    async fn wait_for_new_segments(&self) -> Result<bool> {
        let start_counter = self.inner.lock().await.segment_change_counter;
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.settings.live_edge_poll_timeout_ms);
        let interval = Duration::from_millis(self.settings.live_edge_poll_interval_ms);
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(interval).await;
            let now_counter = self.inner.lock().await.segment_change_counter;
            if now_counter != start_counter {
                return Ok(true);
            }
        }
    }

    /// *refresh (live only)* (spec §4.4).
    async fn refresh(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let playlist_url = self.inner.lock().await.playlist_url.clone();
        let fetched = tokio::time::timeout(
            Duration::from_millis(self.settings.refresh_deadline_ms),
            self.fetch_and_parse_playlist(&playlist_url),
        )
        .await;

        let media = match fetched {
            Ok(Ok(Playlist::Media(m))) => m,
            Ok(Ok(Playlist::Master(_))) => {
                warn!("playlist refresh at {playlist_url} fetched a master playlist, ignoring");
                self.rearm_if_live().await;
                return;
            }
            Ok(Err(e)) => {
                warn!("playlist refresh at {playlist_url} failed: {e}");
                self.rearm_if_live().await;
                return;
            }
            Err(_) => {
                warn!("playlist refresh at {playlist_url} timed out");
                self.rearm_if_live().await;
                return;
            }
        };

        let (new_entries, start_time, expired, end_list) = {
            let mut inner = self.inner.lock().await;
            inner.target_duration = media.target_duration;
            inner.end_list = media.end_list;
            let (new_entries, start_time) = ingest_locked(&mut inner, &media);

            let known: Vec<u64> = inner.known_sequences.iter().copied().collect();
            let expired = refresh::expired_sequences(
                &known,
                media.media_sequence,
                media.segments.len(),
                self.settings.buffer_behind_segments,
            );
            for ms in &expired {
                if let Some(info) = inner.segment_info.remove(ms) {
                    inner.removed_duration_seconds += info.segment.duration;
                }
                inner.known_sequences.retain(|k| k != ms);
                inner.data_cache.remove(*ms);
                inner.segment_change_counter += 1;
            }
            (new_entries, start_time, expired, media.end_list)
        };

        debug!(
            "refresh: {} new segment(s), {} expired",
            new_entries.len(),
            expired.len()
        );
        self.notify_removed(&expired).await;
        self.notify_added(&new_entries, start_time).await;
        self.prefetch_recent().await;

        if !end_list {
            self.rearm_refresh_timer();
        } else {
            info!("playlist at {playlist_url} reached EXT-X-ENDLIST, refresh disarmed");
        }
    }

    async fn fetch_and_parse_playlist(&self, url: &Url) -> Result<Playlist> {
        let (status, body) = self.client.get(url, None).await?;
        if status != 200 && status != 206 {
            return Err(HlsIngestError::fetch(Some(status), format!("playlist fetch failed for {url}")));
        }
        let text = String::from_utf8_lossy(&body);
        parse_playlist(&text)
    }

    async fn prefetch_recent(&self) {
        let candidates: Vec<u64> = {
            let inner = self.inner.lock().await;
            inner
                .known_sequences
                .iter()
                .rev()
                .take(self.settings.max_parallel_prefetch)
                .filter(|ms| !inner.data_cache.contains(**ms))
                .copied()
                .collect()
        };
        let futs = candidates.into_iter().map(|ms| async move {
            if let Err(e) = self.fetch_segment(ms).await {
                warn!("prefetch of segment {ms} failed: {e}");
            }
        });
        futures_util::future::join_all(futs).await;
    }

    async fn rearm_if_live(&self) {
        let end_list = self.inner.lock().await.end_list;
        if !end_list {
            self.rearm_refresh_timer();
        }
    }

    fn rearm_refresh_timer(&self) {
        self.arm_refresh_timer();
    }

    /// Arm (or re-arm) the refresh timer at `target_duration / 2` seconds
    /// (spec §4.4 `init`/`refresh`). Must be called with at least one
    /// `refresh` having set `target_duration`, or with the initial value
    /// from `init`.
    pub fn arm_refresh_timer(&self) {
        let this = self.arc_self();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let delay_secs = {
                let target = this.inner.lock().await.target_duration.max(1);
                (target as f64 / 2.0).max(0.5)
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(delay_secs)) => {
                    this.refresh().await;
                }
                _ = cancel.cancelled() => {}
            }
        });
        // This is a single-shot rearm-on-completion timer: abort any
        // previous handle (there should be at most one live at a time).
        if let Ok(mut guard) = self.refresh_handle.try_lock() {
            if let Some(old) = guard.replace(handle) {
                old.abort();
            }
        }
    }

    /// Tear down the refresh timer. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Some(handle) = self.refresh_handle.lock().await.take() {
            handle.abort();
        }
        debug!("segment source disposed, refresh timer cancelled");
    }

    // -- FragmentedMediaSource capability set (spec §4.4) --

    pub async fn is_live(&self) -> bool {
        !self.inner.lock().await.end_list
    }

    pub async fn get_available_time_range(&self) -> (f64, f64) {
        let inner = self.inner.lock().await;
        (inner.removed_duration_seconds, inner.total_duration_seconds)
    }

    pub async fn find_segment_at_time(&self, t: f64) -> Option<SegmentInfo> {
        let inner = self.inner.lock().await;
        let mut candidate = None;
        for ms in &inner.known_sequences {
            if let Some(info) = inner.segment_info.get(ms) {
                if info.expected_start_time <= t {
                    candidate = Some(info.clone());
                } else {
                    break;
                }
            }
        }
        candidate
    }

    pub async fn read_segment_data(&self, ms: u64) -> Result<Bytes> {
        self.fetch_segment(ms).await
    }

    pub async fn get_available_segments(&self) -> Vec<SegmentInfo> {
        let inner = self.inner.lock().await;
        inner
            .known_sequences
            .iter()
            .filter_map(|ms| inner.segment_info.get(ms).cloned())
            .collect()
    }

    pub async fn get_segment_byte_offset(&self, ms: u64) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.segment_info.get(&ms).and_then(|info| {
            if info.end_known || info.segment.byte_range.is_some() {
                Some(info.start)
            } else {
                None
            }
        })
    }

    pub async fn get_segment_expected_start_time(&self, ms: u64) -> Option<f64> {
        let inner = self.inner.lock().await;
        inner.segment_info.get(&ms).map(|i| i.expected_start_time)
    }

    pub async fn target_duration(&self) -> u64 {
        self.inner.lock().await.target_duration
    }
}

#[async_trait::async_trait]
impl crate::demuxer::ByteSource for SegmentSource {
    async fn retrieve_size(&self) -> Option<u64> {
        let inner = self.inner.lock().await;
        if inner.end_list {
            Some(inner.next_segment_offset)
        } else {
            None
        }
    }

    async fn read(&self, start: u64, end: u64) -> Result<Option<(Bytes, u64)>> {
        SegmentSource::read(self, start, end).await
    }
}

fn empty_or(out: &[u8], start: u64) -> Option<(Bytes, u64)> {
    if out.is_empty() {
        None
    } else {
        Some((Bytes::copy_from_slice(out), start))
    }
}

/// *ingest(playlist snapshot)* (spec §4.4): append not-yet-tracked segments,
/// returning the new entries plus their common starting time.
fn ingest_locked(inner: &mut Inner, playlist: &MediaPlaylist) -> (Vec<SegmentInfo>, f64) {
    let start_time = inner.total_duration_seconds;
    let mut new_entries = Vec::new();
    for (i, seg) in playlist.segments.iter().enumerate() {
        let ms = playlist.sequence_of(i);
        if inner.segment_info.contains_key(&ms) {
            continue;
        }
        let prev_end = ms
            .checked_sub(1)
            .and_then(|prev| inner.segment_info.get(&prev))
            .map(|p| p.end);
        let start = prev_end.unwrap_or(inner.next_segment_offset);
        let (end, end_known) = match &seg.byte_range {
            Some(br) => (start + br.length, true),
            None => (start, false),
        };
        let info = SegmentInfo {
            segment: seg.clone(),
            media_sequence: ms,
            start,
            end,
            end_known,
            expected_start_time: inner.total_duration_seconds,
        };
        inner.next_segment_offset = inner.next_segment_offset.max(end);
        inner.total_duration_seconds += seg.duration;
        inner.known_sequences.push_back(ms);
        inner.segment_info.insert(ms, info.clone());
        inner.segment_change_counter += 1;
        new_entries.push(info);
    }
    (new_entries, start_time)
}

/// Forward-propagation after a provisional segment's real size becomes known
/// (spec §4.4 `fetch_segment`): stop at the first byte-range-having segment
/// (its position is independently authoritative) or the first not-yet-fetched
/// neighbour (beyond it the chain's length is unknown until it too is fetched).
fn propagate_sizes(inner: &mut Inner, fetched_ms: u64, new_end: u64) {
    if let Some(info) = inner.segment_info.get_mut(&fetched_ms) {
        info.end = new_end;
        info.end_known = true;
    }
    let mut expected_start = new_end;
    let following: Vec<u64> = inner
        .known_sequences
        .iter()
        .copied()
        .filter(|&ms| ms > fetched_ms)
        .collect();
    for ms in following {
        let Some(info) = inner.segment_info.get(&ms) else {
            continue;
        };
        if info.segment.byte_range.is_some() {
            break;
        }
        let was_fetched = info.end_known;
        let len = if was_fetched { info.end - info.start } else { 0 };
        if let Some(info) = inner.segment_info.get_mut(&ms) {
            info.start = expected_start;
            info.end = expected_start + len;
        }
        if !was_fetched {
            break;
        }
        expected_start += len;
    }
    inner.next_segment_offset = inner.next_segment_offset.max(expected_start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{ByteRange, MapTag, Segment};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct StubClient {
        init_len: u64,
        segment_len: u64,
        calls: AtomicU32,
    }

    #[async_trait]
    impl FetchClient for StubClient {
        async fn get(&self, url: &Url, _range: Option<&str>) -> Result<(u16, Bytes)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.path().ends_with("init.mp4") {
                Ok((200, Bytes::from(vec![0u8; self.init_len as usize])))
            } else {
                Ok((200, Bytes::from(vec![1u8; self.segment_len as usize])))
            }
        }
    }

    fn make_segment(uri: &str, duration: f64, map: Option<MapTag>, byte_range: Option<ByteRange>) -> Segment {
        Segment {
            duration,
            title: None,
            uri: uri.to_string(),
            byte_range,
            discontinuity: false,
            program_date_time: None,
            key: None,
            map,
            gap: false,
            bitrate: None,
        }
    }

    fn vod_playlist() -> MediaPlaylist {
        let map = MapTag {
            uri: "init.mp4".to_string(),
            byte_range: None,
        };
        let mut playlist = MediaPlaylist {
            end_list: true,
            target_duration: 6,
            ..Default::default()
        };
        playlist.segments.push(make_segment("seg0.m4s", 6.0, Some(map), None));
        playlist.segments.push(make_segment("seg1.m4s", 6.0, None, None));
        playlist
    }

    #[tokio::test]
    async fn reads_init_then_first_segment() {
        let client = Arc::new(StubClient {
            init_len: 100,
            segment_len: 50,
            calls: AtomicU32::new(0),
        });
        let settings = Settings::default();
        let url = Url::parse("https://example.com/media.m3u8").unwrap();
        let source = SegmentSource::new(client, url, vod_playlist(), settings);

        let (data, offset) = source.read(0, 100).await.unwrap().unwrap();
        assert_eq!(offset, 0);
        assert_eq!(data.len(), 100);

        let (data, offset) = source.read(100, 150).await.unwrap().unwrap();
        assert_eq!(offset, 100);
        assert_eq!(data.len(), 50);
    }

    #[tokio::test]
    async fn cross_boundary_read_spans_init_and_segment() {
        let client = Arc::new(StubClient {
            init_len: 100,
            segment_len: 50,
            calls: AtomicU32::new(0),
        });
        let settings = Settings::default();
        let url = Url::parse("https://example.com/media.m3u8").unwrap();
        let source = SegmentSource::new(client, url, vod_playlist(), settings);

        let (data, offset) = source.read(90, 120).await.unwrap().unwrap();
        assert_eq!(offset, 90);
        assert_eq!(data.len(), 30);
    }

    #[tokio::test]
    async fn vod_read_past_end_returns_none() {
        let client = Arc::new(StubClient {
            init_len: 100,
            segment_len: 50,
            calls: AtomicU32::new(0),
        });
        let settings = Settings::default();
        let url = Url::parse("https://example.com/media.m3u8").unwrap();
        let source = SegmentSource::new(client, url, vod_playlist(), settings);

        // Total length is 100 (init) + 50 + 50 (two provisional segments,
        // each learned as 50 bytes on first fetch).
        source.read(0, 200).await.unwrap();
        let result = source.read(1_000, 1_100).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn ingest_skips_already_tracked_segments() {
        let mut inner = Inner {
            playlist_url: Url::parse("https://example.com/media.m3u8").unwrap(),
            initial_playlist: MediaPlaylist::default(),
            initialized: false,
            init_segment_data: None,
            segment_info: std::collections::BTreeMap::new(),
            known_sequences: VecDeque::new(),
            data_cache: SegmentDataCache::new(20),
            next_segment_offset: 0,
            total_duration_seconds: 0.0,
            removed_duration_seconds: 0.0,
            segment_change_counter: 0,
            target_duration: 6,
            end_list: false,
        };
        let mut playlist = MediaPlaylist {
            media_sequence: 100,
            ..Default::default()
        };
        playlist.segments.push(make_segment("seg100.m4s", 6.0, None, None));
        playlist.segments.push(make_segment("seg101.m4s", 6.0, None, None));
        let (new_entries, start_time) = ingest_locked(&mut inner, &playlist);
        assert_eq!(new_entries.len(), 2);
        assert_eq!(start_time, 0.0);

        // Re-ingesting the same snapshot plus one fresh segment: only #102 is new.
        let mut next = MediaPlaylist {
            media_sequence: 101,
            ..Default::default()
        };
        next.segments.push(make_segment("seg101.m4s", 6.0, None, None));
        next.segments.push(make_segment("seg102.m4s", 6.0, None, None));
        let (new_entries, start_time) = ingest_locked(&mut inner, &next);
        assert_eq!(new_entries.len(), 1);
        assert_eq!(new_entries[0].media_sequence, 102);
        assert_eq!(start_time, 12.0);
        assert_eq!(inner.total_duration_seconds, 18.0);
    }
}
