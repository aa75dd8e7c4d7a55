//! HLS Input Facade (spec §4.6, C6): the public entry point composing the
//! manifest resolver, segment source, and fragment lookup bridge behind one
//! variant-selection and track-aggregation surface.

use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;
use url::Url;

use crate::concurrency::{AsyncToken, AsyncTokenSource};
use crate::demuxer::{Demuxer, DemuxerMetadata, Track, TrackKind};
use crate::error::{HlsIngestError, Result};
use crate::fragment_lookup::FragmentLookupBridge;
use crate::playlist::Variant;
use crate::resolver::{FetchClient, ManifestResolver, QualitySelection, ResolvedStream};
use crate::settings::Settings;
use crate::source::SegmentSource;

struct State {
    resolved: Option<ResolvedStream>,
    segment_source: Option<Arc<SegmentSource>>,
}

/// The public facade: one instance per loaded manifest.
pub struct HlsInput {
    client: Arc<dyn FetchClient>,
    manifest_url: Url,
    settings: Settings,
    state: Mutex<State>,
    /// Serializes concurrent `ensure_resolved` callers so the manifest is
    /// fetched only once (spec §4.6 "single memoized promise").
    init_lock: Mutex<()>,
    demuxer: Mutex<Option<Box<dyn Demuxer>>>,
    pub fragment_lookup: Arc<FragmentLookupBridge>,
    /// Mints the `async_id` each user-initiated pipeline (play, seek, load)
    /// is cancelled against (spec §5.1).
    async_tokens: AsyncTokenSource,
}

impl HlsInput {
    pub fn new(client: Arc<dyn FetchClient>, manifest_url: Url, settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            client,
            manifest_url,
            settings,
            state: Mutex::new(State {
                resolved: None,
                segment_source: None,
            }),
            init_lock: Mutex::new(()),
            demuxer: Mutex::new(None),
            fragment_lookup: Arc::new(FragmentLookupBridge::new()),
            async_tokens: AsyncTokenSource::new(),
        })
    }

    /// Starts a new cancellable pipeline (spec §5.1): the consumer calls
    /// this at the start of a play/seek/load and threads the returned token
    /// through to [`Self::select_variant`]. Starting another pipeline
    /// (calling this again) immediately cancels any token issued earlier.
    pub fn begin_pipeline(&self) -> AsyncToken {
        self.async_tokens.begin()
    }

    pub async fn set_demuxer(&self, demuxer: Box<dyn Demuxer>) {
        *self.demuxer.lock().await = Some(demuxer);
    }

    /// Fetch and resolve the manifest exactly once, building the segment
    /// source and wiring its callbacks into the fragment lookup bridge.
    async fn ensure_resolved(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        {
            let state = self.state.lock().await;
            if state.resolved.is_some() {
                return Ok(());
            }
        }

        let resolver = ManifestResolver::new(self.client.clone());
        let resolved = resolver
            .resolve(&self.manifest_url, self.settings.default_quality_selection)
            .await?;

        let source = SegmentSource::new(
            self.client.clone(),
            resolved.base_url.clone(),
            resolved.media_playlist.clone(),
            self.settings.clone(),
        );
        let bridge_added = self.fragment_lookup.clone();
        let bridge_removed = self.fragment_lookup.clone();
        source
            .set_on_segments_added(move |entries, start_time| {
                if bridge_added.is_empty() {
                    bridge_added.populate_from_segments(entries, start_time);
                } else {
                    bridge_added.append(entries, start_time);
                }
            })
            .await;
        source
            .set_on_segments_removed(move |ids| {
                bridge_removed.remove(ids);
            })
            .await;

        let mut state = self.state.lock().await;
        if state.resolved.is_none() {
            info!("manifest resolved: {}", self.manifest_url);
            state.resolved = Some(resolved);
            state.segment_source = Some(source);
        }
        Ok(())
    }

    /// `list_variants()` (spec §4.6): empty for a media-only manifest.
    pub async fn list_variants(&self) -> Result<Vec<Variant>> {
        self.ensure_resolved().await?;
        let state = self.state.lock().await;
        Ok(state
            .resolved
            .as_ref()
            .and_then(|r| r.master_playlist.as_ref())
            .map(|m| m.variants.clone())
            .unwrap_or_default())
    }

    pub async fn current_variant(&self) -> Result<Option<Variant>> {
        self.ensure_resolved().await?;
        let state = self.state.lock().await;
        Ok(state.resolved.as_ref().and_then(|r| r.selected_variant.clone()))
    }

    /// `select_variant(v)` (spec §4.6): convenience wrapper for callers that
    /// don't need cancellation — equivalent to `select_variant_cancellable`
    /// with a token that can never be superseded.
    pub async fn select_variant(&self, variant: &Variant) -> Result<()> {
        let token = self.begin_pipeline();
        self.select_variant_cancellable(variant, &token).await
    }

    /// `select_variant(v)` (spec §4.6): `v` must be one of `list_variants()`'s
    /// entries; disposes the previous variant's pipeline if the URI changes;
    /// never fetches the new variant's media playlist itself (that happens
    /// lazily, the next time the segment source is needed).
    ///
    /// `token` is the `async_id` this pipeline was started with (spec §5.1):
    /// after every suspension point it is checked against the facade's
    /// current generation, and a superseded call (the consumer started a
    /// newer play/seek/load in the meantime) returns `Ok(())` without
    /// touching `state`.
    pub async fn select_variant_cancellable(&self, variant: &Variant, token: &AsyncToken) -> Result<()> {
        self.ensure_resolved().await?;
        if token.is_cancelled() {
            return Ok(());
        }

        let variant_known = {
            let state = self.state.lock().await;
            state
                .resolved
                .as_ref()
                .and_then(|r| r.master_playlist.as_ref())
                .map(|m| m.variants.iter().any(|v| v.uri == variant.uri))
                .unwrap_or(false)
        };
        if !variant_known {
            return Err(HlsIngestError::NoVariant);
        }

        let changed = {
            let state = self.state.lock().await;
            state
                .resolved
                .as_ref()
                .and_then(|r| r.selected_variant.as_ref())
                .map(|cur| cur.uri != variant.uri)
                .unwrap_or(true)
        };
        if !changed {
            return Ok(());
        }
        if token.is_cancelled() {
            return Ok(());
        }

        let old_source = {
            let mut state = self.state.lock().await;
            let old = state.segment_source.take();
            if let Some(resolved) = state.resolved.as_mut() {
                resolved.selected_variant = Some(variant.clone());
            }
            old
        };
        if let Some(old_source) = old_source {
            old_source.dispose().await;
        }
        info!("variant switched to {}", variant.uri);
        Ok(())
    }

    async fn metadata(&self) -> Result<DemuxerMetadata> {
        let mut guard = self.demuxer.lock().await;
        match guard.as_mut() {
            Some(demuxer) => demuxer.read_metadata().await,
            None => Ok(DemuxerMetadata::default()),
        }
    }

    pub async fn video_tracks(&self) -> Result<Vec<Track>> {
        Ok(self.metadata().await?.video_tracks)
    }

    /// `audio_tracks()` (spec §4.6): aggregates the muxed audio the demuxer
    /// reports with any matching separate `EXT-X-MEDIA` audio rendition.
    pub async fn audio_tracks(&self) -> Result<Vec<Track>> {
        let mut tracks = self.metadata().await?.audio_tracks;
        self.ensure_resolved().await?;
        let renditions = {
            let state = self.state.lock().await;
            state
                .resolved
                .as_ref()
                .map(|r| r.audio_renditions.clone())
                .unwrap_or_default()
        };
        for rendition in renditions {
            tracks.push(Track {
                kind: TrackKind::Audio,
                codec: None,
                language: rendition.language,
                channels: rendition.channels.as_deref().and_then(|c| c.parse().ok()),
                bitrate: None,
                from_separate_rendition: true,
            });
        }
        Ok(tracks)
    }

    pub async fn primary_video_track(&self) -> Result<Option<Track>> {
        Ok(self.video_tracks().await?.into_iter().next())
    }

    pub async fn primary_audio_track(&self) -> Result<Option<Track>> {
        let tracks = self.audio_tracks().await?;
        Ok(tracks
            .iter()
            .find(|t| !t.from_separate_rendition)
            .cloned()
            .or_else(|| tracks.first().cloned()))
    }

    /// `compute_duration()` (spec §4.6): VOD sums segment durations; live
    /// reads `total_duration_seconds` off the segment source, which only
    /// grows as refreshes append segments.
    pub async fn compute_duration(&self) -> Result<f64> {
        self.ensure_resolved().await?;
        let (is_live, source) = {
            let state = self.state.lock().await;
            (
                state.resolved.as_ref().map(|r| r.is_live).unwrap_or(false),
                state.segment_source.clone(),
            )
        };
        if is_live {
            if let Some(source) = source {
                let (_, total) = source.get_available_time_range().await;
                return Ok(total);
            }
        }
        let state = self.state.lock().await;
        let resolved = state.resolved.as_ref().ok_or(HlsIngestError::NoVariant)?;
        Ok(resolved.media_playlist.segments.iter().map(|s| s.duration).sum())
    }

    /// `is_live()` (spec §4.6): reflects the current media playlist's
    /// `end_list` flag, via the segment source once one exists so a live
    /// stream that later ends is reflected without re-resolving.
    pub async fn is_live(&self) -> Result<bool> {
        self.ensure_resolved().await?;
        let state = self.state.lock().await;
        if let Some(source) = &state.segment_source {
            return Ok(source.is_live().await);
        }
        Ok(state.resolved.as_ref().map(|r| r.is_live).unwrap_or(false))
    }

    pub async fn target_duration(&self) -> Result<u64> {
        self.ensure_resolved().await?;
        let state = self.state.lock().await;
        if let Some(source) = &state.segment_source {
            return Ok(source.target_duration().await);
        }
        Ok(state
            .resolved
            .as_ref()
            .map(|r| r.media_playlist.target_duration)
            .unwrap_or(0))
    }

    /// Access the live segment source, for the byte-source/demuxer pipeline
    /// to read against. `None` until the manifest has been resolved.
    pub async fn segment_source(&self) -> Result<Arc<SegmentSource>> {
        self.ensure_resolved().await?;
        let state = self.state.lock().await;
        state.segment_source.clone().ok_or(HlsIngestError::NoVariant)
    }

    /// `dispose()` (spec §4.6): idempotent, re-entrant-safe, releases the
    /// refresh timer and all buffers.
    pub async fn dispose(&self) {
        let source = {
            let mut state = self.state.lock().await;
            state.segment_source.take()
        };
        if let Some(source) = source {
            source.dispose().await;
            info!("disposed {}", self.manifest_url);
        }
    }
}
