//! Durable copy of the upload queue.
//!
//! The queue lives in one JSON file. Saves go through a sibling temp file
//! that is flushed and renamed over the target, so readers only ever see
//! the previous or the new queue.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use capture_shared::constants::QUEUE_FILE_NAME;
use capture_shared::LocalImage;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    /// Queue file inside the platform data directory.
    pub fn open_default() -> Result<Self> {
        let path = crate::default_data_dir()?.join(QUEUE_FILE_NAME);
        info!(path = %path.display(), "Using queue file");
        Ok(Self::open_at(path))
    }

    /// Queue file at an explicit path. Nothing is touched on disk until the
    /// first save.
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole queue.
    ///
    /// A missing file is an empty queue. Unreadable or corrupt data is
    /// logged, moved aside for inspection, and also treated as empty.
    pub async fn load(&self) -> Vec<LocalImage> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No queue file yet");
                return Vec::new();
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read queue file, starting with an empty queue"
                );
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<LocalImage>>(&raw) {
            Ok(queue) => {
                debug!(path = %self.path.display(), items = queue.len(), "Loaded queue");
                queue
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    bytes = raw.len(),
                    "Queue file is corrupt, queued captures are lost"
                );
                self.quarantine().await;
                Vec::new()
            }
        }
    }

    /// Replace the persisted queue with `queue`.
    pub async fn save(&self, queue: &[LocalImage]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec(queue)?;
        let tmp = self.tmp_path();

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), items = queue.len(), "Saved queue");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| QUEUE_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn quarantine(&self) {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| QUEUE_FILE_NAME.into());
        name.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
        let target = self.path.with_file_name(name);

        match fs::rename(&self.path, &target).await {
            Ok(()) => warn!(path = %target.display(), "Moved corrupt queue file aside"),
            Err(e) => warn!(error = %e, "Could not move corrupt queue file aside"),
        }
    }
}
