use thiserror::Error;

use capture_net::NetError;

/// Why one attempt at a queued capture failed.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Upload failed: {0}")]
    Upload(#[source] NetError),

    #[error("Field update failed: {0}")]
    FieldUpdate(#[source] NetError),
}

impl SyncError {
    pub fn is_permanent(&self) -> bool {
        match self {
            SyncError::Upload(e) | SyncError::FieldUpdate(e) => e.is_permanent(),
        }
    }

    /// The remote refused our credentials; the operator has to fix the token.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            SyncError::Upload(e) | SyncError::FieldUpdate(e) => e.is_unauthorized(),
        }
    }
}
