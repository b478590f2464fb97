//! Crate-wide error type.
//!
//! Every fallible public entry point in `datamorph-core` returns
//! [`DataMorphResult`]. Cast/parse failures during cell *formatting* are
//! deliberately not represented here -- those surface as the literal string
//! `"<invalid>"` (see [`crate::transformer::format_cell`]), not as an `Err`.

use thiserror::Error;

/// The result alias used throughout this crate.
pub type DataMorphResult<T> = Result<T, DataMorphError>;

/// Every error kind the engine can surface.
#[derive(Debug, Error)]
pub enum DataMorphError {
    /// Null/empty/out-of-range input at a public boundary. Caller bug; fail fast.
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),

    /// Read/open failure. Propagates out of `build_index` / `read_records`;
    /// any already-checkpointed prefix remains valid.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON Lines record failed to parse. Raised by the row reader; caught
    /// and skipped by the schema scanner; treated as a non-match by the
    /// filter row indexer.
    #[error("malformed record at byte {position}: {reason}")]
    MalformedRecord { position: u64, reason: String },

    /// The per-file cancellation token was tripped. Bubbles out of async
    /// operations; callers should treat this as a graceful stop.
    #[error("operation cancelled")]
    Cancelled,

    /// Call made after the owning resource was disposed.
    #[error("resource already disposed")]
    Disposed,

    /// Index queried before any checkpoint exists, outside the sentinel path.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A row or column index fell outside the valid range.
    #[error("index out of range: {0}")]
    OutOfRange(String),
}
