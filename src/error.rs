//! Typed boundary errors (spec §4.8 / C8).
//!
//! Internal plumbing (playlist ingestion bookkeeping, refresh scheduling)
//! uses `anyhow::Error`; this enum is what crosses the public API boundary.

use thiserror::Error;

/// The two ways a read can fail at the live edge (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEdgeKind {
    /// The read cursor fell below the start of the current sliding window.
    BehindWindow,
    /// The source waited for fresh segments and none arrived before the deadline.
    Timeout,
}

impl std::fmt::Display for LiveEdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveEdgeKind::BehindWindow => write!(f, "behind_window"),
            LiveEdgeKind::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HlsIngestError {
    #[error("parse error{}: {message}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Parse {
        line: Option<usize>,
        message: String,
    },

    #[error("fetch error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Fetch {
        status: Option<u16>,
        message: String,
    },

    #[error("unsupported media: {message}")]
    UnsupportedMedia { message: String },

    #[error("no variant found in master playlist")]
    NoVariant,

    #[error("live edge error: {0}")]
    LiveEdge(LiveEdgeKind),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for HlsIngestError {
    fn from(e: reqwest::Error) -> Self {
        HlsIngestError::Fetch {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl HlsIngestError {
    pub fn parse(line: Option<usize>, message: impl Into<String>) -> Self {
        HlsIngestError::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn fetch(status: Option<u16>, message: impl Into<String>) -> Self {
        HlsIngestError::Fetch {
            status,
            message: message.into(),
        }
    }

    pub fn is_live_edge(&self) -> bool {
        matches!(self, HlsIngestError::LiveEdge(_))
    }
}

pub type Result<T> = std::result::Result<T, HlsIngestError>;
