//! Error taxonomy for the caching layer.
//!
//! Every variant here is recoverable from the worker's point of view:
//! network and storage failures fall back to cache or synthesized
//! responses, protocol failures become explicit `{success: false}` replies.

use std::time::Duration;

use thiserror::Error;

/// Maximum length of a detail string carried inside an error
const MAX_DETAIL_LENGTH: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl NetworkError {
    pub fn transport(detail: impl AsRef<str>) -> Self {
        NetworkError::Transport(truncate_detail(detail.as_ref()))
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the elapsed duration
            NetworkError::Timeout(Duration::ZERO)
        } else if err.is_builder() {
            NetworkError::InvalidUrl(truncate_detail(&err.to_string()))
        } else {
            NetworkError::transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded: {requested} bytes requested, {available} available")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed admin message: {0}")]
    Malformed(String),

    #[error("Unknown admin action: {0}")]
    UnknownAction(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedType(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(truncate_detail(&err.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Unknown book: {0}")]
    UnknownBook(String),

    #[error("{book} has no chapter {chapter} (1-{chapters})")]
    ChapterOutOfRange {
        book: String,
        chapter: u32,
        chapters: u32,
    },

    #[error(transparent)]
    Request(#[from] NetworkError),
}

/// Crate-level error for callers that do not care which layer failed.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Reader(#[from] ReaderError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

fn truncate_detail(detail: &str) -> String {
    if detail.len() <= MAX_DETAIL_LENGTH {
        return detail.to_string();
    }
    let mut end = MAX_DETAIL_LENGTH;
    while !detail.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &detail[..end], detail.len())
}
