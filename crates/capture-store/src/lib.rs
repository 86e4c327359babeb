//! # capture-store
//!
//! Device-local persistence for the capture queue.
//!
//! The upload queue is a single JSON array of
//! [`LocalImage`](capture_shared::LocalImage) records, replaced in full on
//! every save so that a crash never loses an item that was already queued.
//! Captured photos are compressed and kept as JPEG files next to it until
//! they have been synced.

pub mod images;
pub mod queue_store;

mod error;

pub use error::{Result, StoreError};
pub use images::{ImageConfig, ImageStore};
pub use queue_store::QueueStore;

use std::path::PathBuf;

use directories::ProjectDirs;

/// Platform data directory for the application.
///
/// - Linux:   `~/.local/share/haccp-capture`
/// - macOS:   `~/Library/Application Support/com.haccp.haccp-capture`
/// - Windows: `{FOLDERID_RoamingAppData}\haccp\haccp-capture\data`
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "haccp", capture_shared::constants::APP_NAME)
        .ok_or(StoreError::NoDataDir)?;
    Ok(dirs.data_dir().to_path_buf())
}
