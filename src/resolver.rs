//! Manifest Resolver (spec §4.3, C3): fetches a manifest, classifies
//! master vs media, selects one variant per a quality policy, locates the
//! audio rendition, and exposes a resolved view.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::HlsIngestError;
use crate::playlist::{parse_playlist, MasterPlaylist, MediaPlaylist, MediaRendition, Playlist,
    RenditionType, Variant};

/// Variant-selection policy (spec §4.3, §9 "tagged union dispatched in one match").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualitySelection {
    Highest,
    Auto,
    Lowest,
    ByBandwidth { target: u64 },
    ByResolution { width: u32, height: u32 },
}

/// Dolby-only codec identifiers that demote a variant behind widely-supported
/// ones unless every variant carries one (spec §4.3 "Filter step").
const DOLBY_ONLY_MARKERS: &[&str] = &["ec-3", "ac-3"];

fn is_dolby_only(variant: &Variant) -> bool {
    variant
        .codecs
        .as_deref()
        .map(|c| DOLBY_ONLY_MARKERS.iter().any(|m| c.contains(m)))
        .unwrap_or(false)
}

impl QualitySelection {
    /// Select one variant from `variants` per spec §4.3's filter step, then
    /// dispatch, then first-in-manifest-order tie-break.
    pub fn select<'a>(&self, variants: &'a [Variant]) -> Option<&'a Variant> {
        if variants.is_empty() {
            return None;
        }
        let non_dolby: Vec<&Variant> = variants.iter().filter(|v| !is_dolby_only(v)).collect();
        let pool: Vec<&Variant> = if non_dolby.is_empty() {
            variants.iter().collect()
        } else {
            non_dolby
        };

        match self {
            QualitySelection::Highest | QualitySelection::Auto => {
                pool.into_iter().max_by_key(|v| v.bandwidth)
            }
            QualitySelection::Lowest => pool.into_iter().min_by_key(|v| v.bandwidth),
            QualitySelection::ByBandwidth { target } => pool
                .into_iter()
                .min_by_key(|v| v.bandwidth.abs_diff(*target)),
            QualitySelection::ByResolution { width, height } => {
                let with_res: Vec<&Variant> = pool
                    .iter()
                    .copied()
                    .filter(|v| v.resolution.is_some())
                    .collect();
                if with_res.is_empty() {
                    return QualitySelection::Highest.select(variants);
                }
                with_res.into_iter().min_by_key(|v| {
                    let r = v.resolution.unwrap();
                    (r.width as i64 - *width as i64).unsigned_abs()
                        + (r.height as i64 - *height as i64).unsigned_abs()
                })
            }
        }
    }
}

/// Injectable fetch client (spec §4.3 "Fetch uses an injectable client so
/// tests can stub deterministically"). Also used by the segment source
/// (C4) for init/segment fetches.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// GET the full body at `url`, optionally with a `Range` header.
    /// Returns `(status, bytes)`; 200/206 are success, anything else is
    /// treated as a fetch failure by the caller.
    async fn get(&self, url: &Url, range: Option<&str>) -> Result<(u16, bytes::Bytes), HlsIngestError>;
}

/// `reqwest`-backed implementation used outside tests.
pub struct ReqwestFetchClient {
    client: reqwest::Client,
}

impl ReqwestFetchClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestFetchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchClient for ReqwestFetchClient {
    async fn get(&self, url: &Url, range: Option<&str>) -> Result<(u16, bytes::Bytes), HlsIngestError> {
        let mut req = self.client.get(url.clone());
        if let Some(r) = range {
            req = req.header(reqwest::header::RANGE, r);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        Ok((status, bytes))
    }
}

/// `(attempt_index, previous_error, url) -> Option<delay>` retry hook for
/// the manifest fetch (spec §4.3).
pub type RetryHook = Arc<dyn Fn(usize, &HlsIngestError, &Url) -> Option<Duration> + Send + Sync>;

#[derive(Clone)]
pub struct ResolvedStream {
    pub base_url: Url,
    pub media_playlist: MediaPlaylist,
    pub master_playlist: Option<MasterPlaylist>,
    pub selected_variant: Option<Variant>,
    pub audio_renditions: Vec<MediaRendition>,
    pub subtitle_renditions: Vec<MediaRendition>,
    pub is_live: bool,
}

pub struct ManifestResolver {
    client: Arc<dyn FetchClient>,
    retry_hook: Option<RetryHook>,
}

impl ManifestResolver {
    pub fn new(client: Arc<dyn FetchClient>) -> Self {
        Self {
            client,
            retry_hook: None,
        }
    }

    pub fn with_retry_hook(mut self, hook: RetryHook) -> Self {
        self.retry_hook = Some(hook);
        self
    }

    async fn fetch_text(&self, url: &Url) -> Result<String, HlsIngestError> {
        let mut attempt = 0usize;
        loop {
            match self.fetch_text_once(url).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    let delay = self
                        .retry_hook
                        .as_ref()
                        .and_then(|hook| hook(attempt, &e, url));
                    match delay {
                        Some(d) => {
                            tokio::time::sleep(d).await;
                            attempt += 1;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }

    async fn fetch_text_once(&self, url: &Url) -> Result<String, HlsIngestError> {
        let (status, bytes) = self.client.get(url, None).await?;
        if status != 200 && status != 206 {
            return Err(HlsIngestError::fetch(
                Some(status),
                format!("manifest fetch failed for {url}"),
            ));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|e| HlsIngestError::parse(None, format!("manifest is not valid utf-8: {e}")))
    }

    /// Fetch `manifest_url`, parse it, and resolve the variant hierarchy
    /// per `selection` (spec §4.3).
    pub async fn resolve(
        &self,
        manifest_url: &Url,
        selection: QualitySelection,
    ) -> Result<ResolvedStream, HlsIngestError> {
        let text = self.fetch_text(manifest_url).await?;
        let playlist = parse_playlist(&text)?;

        match playlist {
            Playlist::Media(media) => {
                info!("{manifest_url} is a media playlist, is_live={}", media.is_live());
                Ok(ResolvedStream {
                    base_url: manifest_url.clone(),
                    is_live: media.is_live(),
                    media_playlist: media,
                    master_playlist: None,
                    selected_variant: None,
                    audio_renditions: Vec::new(),
                    subtitle_renditions: Vec::new(),
                })
            }
            Playlist::Master(master) => {
                if master.variants.is_empty() {
                    return Err(HlsIngestError::NoVariant);
                }
                debug!("{manifest_url} is a master playlist with {} variant(s)", master.variants.len());
                let variant = selection
                    .select(&master.variants)
                    .ok_or(HlsIngestError::NoVariant)?
                    .clone();
                info!("selected variant bandwidth={} uri={}", variant.bandwidth, variant.uri);
                let variant_url = crate::url_util::resolve_url(&variant.uri, manifest_url)?;
                let variant_text = self.fetch_text(&variant_url).await?;
                let variant_playlist = parse_playlist(&variant_text)?;
                let media = variant_playlist.as_media().cloned().ok_or_else(|| {
                    HlsIngestError::parse(None, "variant URI did not resolve to a media playlist")
                })?;

                let audio_renditions = variant
                    .audio_group
                    .as_deref()
                    .map(|g| renditions_in_group(&master, g, RenditionType::Audio))
                    .unwrap_or_default();
                let subtitle_renditions = variant
                    .subtitles_group
                    .as_deref()
                    .map(|g| renditions_in_group(&master, g, RenditionType::Subtitles))
                    .unwrap_or_default();

                Ok(ResolvedStream {
                    base_url: variant_url,
                    is_live: media.is_live(),
                    media_playlist: media,
                    master_playlist: Some(master),
                    selected_variant: Some(variant),
                    audio_renditions,
                    subtitle_renditions,
                })
            }
        }
    }
}

fn renditions_in_group(
    master: &MasterPlaylist,
    group_id: &str,
    kind: RenditionType,
) -> Vec<MediaRendition> {
    master
        .renditions
        .iter()
        .filter(|r| r.kind == kind && r.group_id == group_id)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubClient {
        responses: HashMap<String, (u16, String)>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FetchClient for StubClient {
        async fn get(&self, url: &Url, _range: Option<&str>) -> Result<(u16, bytes::Bytes), HlsIngestError> {
            self.calls.lock().unwrap().push(url.to_string());
            let (status, body) = self
                .responses
                .get(url.as_str())
                .cloned()
                .unwrap_or((404, String::new()));
            Ok((status, bytes::Bytes::from(body)))
        }
    }

    fn variant(bandwidth: u64, uri: &str) -> Variant {
        Variant {
            bandwidth,
            average_bandwidth: None,
            resolution: None,
            frame_rate: None,
            codecs: None,
            uri: uri.to_string(),
            audio_group: None,
            video_group: None,
            subtitles_group: None,
            closed_captions_group: None,
            hdcp_level: None,
        }
    }

    #[test]
    fn highest_picks_max_bandwidth() {
        let variants = vec![variant(500_000, "a"), variant(2_000_000, "b"), variant(1_000_000, "c")];
        let picked = QualitySelection::Highest.select(&variants).unwrap();
        assert_eq!(picked.uri, "b");
    }

    #[test]
    fn lowest_picks_min_bandwidth() {
        let variants = vec![variant(500_000, "a"), variant(2_000_000, "b")];
        let picked = QualitySelection::Lowest.select(&variants).unwrap();
        assert_eq!(picked.uri, "a");
    }

    #[test]
    fn by_bandwidth_picks_closest() {
        let variants = vec![variant(500_000, "a"), variant(2_000_000, "b"), variant(1_000_000, "c")];
        let picked = QualitySelection::ByBandwidth { target: 1_100_000 }
            .select(&variants)
            .unwrap();
        assert_eq!(picked.uri, "c");
    }

    #[test]
    fn dolby_only_variants_are_demoted() {
        let mut dolby = variant(3_000_000, "dolby");
        dolby.codecs = Some("ec-3".to_string());
        let variants = vec![variant(1_000_000, "aac"), dolby];
        let picked = QualitySelection::Highest.select(&variants).unwrap();
        assert_eq!(picked.uri, "aac");
    }

    #[test]
    fn all_dolby_falls_back_to_full_set() {
        let mut dolby = variant(3_000_000, "dolby");
        dolby.codecs = Some("ec-3".to_string());
        let variants = vec![dolby];
        let picked = QualitySelection::Highest.select(&variants).unwrap();
        assert_eq!(picked.uri, "dolby");
    }

    #[tokio::test]
    async fn resolves_master_then_selected_media_playlist() {
        let master_text = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=500000\nlow.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2000000\nhigh.m3u8\n";
        let media_text = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:10,\nseg0.mp4\n#EXT-X-ENDLIST\n";

        let mut responses = HashMap::new();
        responses.insert(
            "https://example.com/master.m3u8".to_string(),
            (200, master_text.to_string()),
        );
        responses.insert(
            "https://example.com/high.m3u8".to_string(),
            (200, media_text.to_string()),
        );
        let client = Arc::new(StubClient {
            responses,
            calls: Mutex::new(Vec::new()),
        });

        let resolver = ManifestResolver::new(client);
        let url = Url::parse("https://example.com/master.m3u8").unwrap();
        let resolved = resolver.resolve(&url, QualitySelection::Highest).await.unwrap();
        assert_eq!(resolved.selected_variant.unwrap().uri, "high.m3u8");
        assert_eq!(resolved.media_playlist.segments.len(), 1);
        assert!(!resolved.is_live);
    }

    #[tokio::test]
    async fn empty_variant_list_is_no_variant_error() {
        let master_text = "#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aac\",NAME=\"en\",URI=\"a.m3u8\"\n";
        let mut responses = HashMap::new();
        responses.insert(
            "https://example.com/master.m3u8".to_string(),
            (200, master_text.to_string()),
        );
        let client = Arc::new(StubClient {
            responses,
            calls: Mutex::new(Vec::new()),
        });
        let resolver = ManifestResolver::new(client);
        let url = Url::parse("https://example.com/master.m3u8").unwrap();
        let err = resolver
            .resolve(&url, QualitySelection::Highest)
            .await
            .unwrap_err();
        assert!(matches!(err, HlsIngestError::NoVariant));
    }
}
