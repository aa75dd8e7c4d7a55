//! URL resolution and HTTP range-header formatting (spec §4.2, C2).

use url::Url;

use crate::error::HlsIngestError;
use crate::playlist::ByteRange;

/// Resolve `uri` against `base` using standard RFC 3986 relative resolution.
pub fn resolve_url(uri: &str, base: &Url) -> Result<Url, HlsIngestError> {
    base.join(uri).map_err(HlsIngestError::from)
}

/// Format an HTTP `Range` header value: `bytes=START-END_INCLUSIVE` where
/// `START = offset` and `END = START + length - 1`.
pub fn create_range_header(byte_range: &ByteRange) -> String {
    let start = byte_range.offset;
    let end = start + byte_range.length.saturating_sub(1);
    format!("bytes={start}-{end}")
}

/// As `create_range_header` but for an ad-hoc (length, optional offset) pair
/// not tied to a parsed `ByteRange`, matching spec §4.2's generic signature.
pub fn create_range_header_from(length: u64, offset: Option<u64>) -> String {
    let start = offset.unwrap_or(0);
    let end = start + length.saturating_sub(1);
    format!("bytes={start}-{end}")
}
