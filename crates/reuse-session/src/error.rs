//! Error types for session store lifecycle operations.
//!
//! `store` and `pull` never fail; these errors only come out of loading,
//! saving and snapshotting the raw store.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or writing the snapshot file failed.
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The persisted snapshot could not be parsed or produced.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Error from a custom persistence backend.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
