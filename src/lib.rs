//! `hls-ingest-core`: an HLS ingest engine for fMP4 streams (spec §1).
//!
//! Resolves an HLS manifest's variant hierarchy and exposes the backing
//! media as a virtual, randomly-addressable byte stream suitable for
//! feeding an ISO-BMFF (fMP4) demuxer that has no native knowledge of HLS.
//! Supports both VOD and live (sliding-window) manifests.
//!
//! Module map mirrors the spec's component table (§2):
//! - [`playlist`] — C1, the M3U8 value types, parser, and writer.
//! - [`url_util`] — C2, URI resolution and `Range` header formatting.
//! - [`resolver`] — C3, manifest fetch/classify/variant-selection.
//! - [`source`] — C4, the virtual byte stream (the heart of the crate).
//! - [`fragment_lookup`] — C5, the time-to-byte-offset lookup bridge.
//! - [`facade`] — C6, the public `HlsInput` composition object.
//! - [`timestamp`] — C7, per-segment decode-timestamp normalization.
//! - [`error`] — C8, the typed boundary error model.
//! - [`mirror`] — C9, the optional output mirror.
//! - [`demuxer`] — §6 collaborator contracts (trait definitions only).
//! - [`settings`] — ambient configuration (SPEC_FULL §10.3).
//! - [`concurrency`] — §5 cancellation token and live-edge debounce gate.

pub mod concurrency;
pub mod demuxer;
pub mod error;
pub mod facade;
pub mod fragment_lookup;
pub mod mirror;
pub mod playlist;
pub mod resolver;
pub mod settings;
pub mod source;
pub mod timestamp;
pub mod url_util;

pub use concurrency::{AsyncToken, AsyncTokenSource, LiveEdgeDebouncer};
pub use error::{HlsIngestError, LiveEdgeKind, Result};
pub use facade::HlsInput;
pub use resolver::{FetchClient, QualitySelection, ReqwestFetchClient};
pub use settings::Settings;
