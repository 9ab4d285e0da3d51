//! Error types for subpick.

use thiserror::Error;

/// The main error type for subpick operations.
#[derive(Error, Debug)]
pub enum PickError {
    /// No cache entry exists for the given model key.
    #[error("model '{0}' is not cached")]
    ModelNotCached(String),

    /// A mesh with the given name was not found on a model.
    #[error("mesh '{mesh}' not found on model '{key}'")]
    MeshNotFound { key: String, mesh: String },

    /// Two draw ranges of the same mesh share index-buffer offsets.
    #[error("draw ranges '{first}' and '{second}' overlap on mesh '{mesh}'")]
    OverlappingRanges {
        mesh: String,
        first: String,
        second: String,
    },

    /// The draw range index worker is no longer running.
    #[error("draw range index worker disconnected")]
    WorkerDisconnected,

    /// A request to the draw range index did not complete in time.
    #[error("draw range index request timed out after {0} ms")]
    Timeout(u64),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for subpick operations.
pub type Result<T> = std::result::Result<T, PickError>;
