//! Error types for the recognition engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error kinds
///
/// Per-chunk fingerprint failures are recovered locally (the chunk is
/// logged and dropped) and never surface through this enum.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The input file could not be decoded. Fatal for the call.
    #[error("failed to decode audio input: {0}")]
    Decode(String),

    /// The fingerprint store failed after retries were exhausted.
    #[error("fingerprint store unavailable: {0}")]
    StoreUnavailable(String),

    /// A malformed hash token was rejected at a boundary.
    #[error("malformed hash token: {0:?}")]
    BadHash(String),

    /// Cooperative cancellation was acknowledged. No partial results.
    #[error("recognition cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
