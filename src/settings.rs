//! Tunables that are implementation constants rather than protocol values
//! (spec §4.4/§9: LRU capacity, sliding-window buffer, refresh/fetch
//! deadlines, live-edge poll cadence). Loaded the way the teacher's
//! `settings.rs` is: a YAML file layered with `APP_`-prefixed environment
//! overrides.

use serde::{Deserialize, Serialize};

use crate::resolver::QualitySelection;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of segment data buffers kept in the LRU cache (§4.4).
    pub max_cached_segments: usize,

    /// Sliding-window expiry buffer, in segments behind `media_sequence`,
    /// chosen to represent at least ~15 minutes of behind-live content
    /// (spec §3/§4.4/§9, ~72 segments at 12.5s each).
    pub buffer_behind_segments: u64,

    /// Deadline for a live playlist refresh fetch (§4.4 `refresh`).
    pub refresh_deadline_ms: u64,

    /// Deadline for a segment data fetch (§4.4 `fetch_segment`).
    pub segment_fetch_deadline_ms: u64,

    /// Deadline for the lazily-fetched init segment (§4.4 `init`).
    pub init_fetch_deadline_ms: u64,

    /// Poll interval while waiting for new segments at the live edge (§4.4 `read`).
    pub live_edge_poll_interval_ms: u64,

    /// Total time budget for the live-edge poll before giving up with a
    /// `LiveEdgeError(timeout)` (§4.4 `read`).
    pub live_edge_poll_timeout_ms: u64,

    /// Maximum number of concurrent prefetch fetches kicked off by a refresh
    /// (§4.4 `refresh`, "bounded (≤ 3) parallel prefetch").
    pub max_parallel_prefetch: usize,

    /// How long the live-edge debounce flag stays set after a recovery seek
    /// completes (§5 "Live-edge debounce").
    pub live_edge_debounce_ms: u64,

    /// Default variant-selection policy when the facade is not told otherwise (§4.3).
    pub default_quality_selection: QualitySelection,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_cached_segments: 20,
            buffer_behind_segments: 72,
            refresh_deadline_ms: 5_000,
            segment_fetch_deadline_ms: 15_000,
            init_fetch_deadline_ms: 10_000,
            live_edge_poll_interval_ms: 100,
            live_edge_poll_timeout_ms: 10_000,
            max_parallel_prefetch: 3,
            live_edge_debounce_ms: 500,
            default_quality_selection: QualitySelection::Auto,
        }
    }
}

impl Settings {
    /// Load settings from an optional YAML file plus `APP_`-prefixed
    /// environment overrides, matching the teacher's `main.rs` builder.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?);
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(config::Environment::with_prefix("APP"));
        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let s = Settings::default();
        assert_eq!(s.max_cached_segments, 20);
        assert_eq!(s.buffer_behind_segments, 72);
        assert_eq!(s.max_parallel_prefetch, 3);
    }
}
