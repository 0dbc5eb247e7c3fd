//! Error type shared by the codec and the dispatch queue.

use thiserror::Error;

/// Errors surfaced by the mirror.
///
/// Registry and reducer operations never fail: stale references and invalid
/// selections are absorbed as no-ops. Only decoding and queue plumbing report
/// errors.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized message type: {0}")]
    UnknownMessage(String),

    #[error("Required field '{field}' is missing")]
    MissingField { field: &'static str },

    #[error("Dispatch queue closed")]
    DispatchClosed,

    #[error("Dispatch queue full")]
    DispatchFull,
}

pub type MirrorResult<T> = Result<T, MirrorError>;
