use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (creating directories, writing the queue file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The queue could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A captured photo could not be decoded or re-encoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The blocking image task was cancelled or panicked.
    #[error("Image task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
