//! Compressed captures on local disk.
//!
//! Photos straight off the camera are far larger than a field illustration
//! needs. Before a capture is queued it is downsized and re-encoded as a
//! JPEG under the capture directory; the queue only keeps the path.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tokio::fs;
use tracing::{debug, info, warn};

use capture_shared::constants::{JPEG_QUALITY, MAX_IMAGE_EDGE};
use capture_shared::FieldType;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Longest edge, in pixels, of a stored capture.
    pub max_edge: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_edge: MAX_IMAGE_EDGE,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    base_path: PathBuf,
    config: ImageConfig,
}

impl ImageStore {
    pub async fn new(base_path: PathBuf, config: ImageConfig) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "Capture store initialized");
        Ok(Self { base_path, config })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Compress a captured photo and write it to the capture directory.
    ///
    /// Returns the path of the written JPEG.
    pub async fn store_capture(
        &self,
        data: Vec<u8>,
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
        captured_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let config = self.config.clone();
        let original_size = data.len();
        let jpeg = tokio::task::spawn_blocking(move || compress(&data, &config)).await??;

        let file_name = format!(
            "{}_{}_{}_{}.jpg",
            sanitize(document_id),
            field_type,
            field_index,
            captured_at.timestamp_millis()
        );
        let path = self.base_path.join(file_name);
        fs::write(&path, &jpeg).await?;

        debug!(
            path = %path.display(),
            original_size,
            stored_size = jpeg.len(),
            "Stored compressed capture"
        );
        Ok(path)
    }

    /// Delete a capture that is no longer referenced by the queue.
    ///
    /// Only files under the capture directory are removed; anything else
    /// (for example a photo picked from the gallery) is left alone.
    pub async fn remove(&self, local_uri: &str) {
        let path = Path::new(local_uri.strip_prefix("file://").unwrap_or(local_uri));
        let escapes = path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
        if escapes || !path.starts_with(&self.base_path) {
            debug!(path = %path.display(), "Not a stored capture, leaving it");
            return;
        }
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed capture"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove capture"),
        }
    }
}

/// Downsize to `max_edge` (keeping aspect ratio) and encode as JPEG.
fn compress(data: &[u8], config: &ImageConfig) -> Result<Vec<u8>> {
    let mut img = image::load_from_memory(data)?;

    if img.width() > config.max_edge || img.height() > config.max_edge {
        img = img.resize(config.max_edge, config.max_edge, FilterType::Triangle);
    }

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, config.jpeg_quality);
    encoder.encode_image(&rgb)?;
    Ok(out)
}

// document ids come from the remote store; keep them out of path syntax
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, _| Rgb([(x % 255) as u8, 80, 160]));
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        buf
    }

    async fn test_store(max_edge: u32) -> (ImageStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(
            dir.path().join("captures"),
            ImageConfig {
                max_edge,
                jpeg_quality: 70,
            },
        )
        .await
        .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_large_capture_is_downsized() {
        let (store, _dir) = test_store(64).await;
        let path = store
            .store_capture(png(256, 128), "doc1", FieldType::SanitationSteps, 0, Utc::now())
            .await
            .unwrap();

        let stored = image::open(&path).unwrap();
        assert_eq!((stored.width(), stored.height()), (64, 32));
        assert_eq!(path.extension().unwrap(), "jpg");
    }

    #[tokio::test]
    async fn test_small_capture_keeps_dimensions() {
        let (store, _dir) = test_store(64).await;
        let path = store
            .store_capture(png(40, 20), "doc1", FieldType::InspectionPoints, 3, Utc::now())
            .await
            .unwrap();

        let stored = image::open(&path).unwrap();
        assert_eq!((stored.width(), stored.height()), (40, 20));
    }

    #[tokio::test]
    async fn test_undecodable_capture_is_rejected() {
        let (store, _dir) = test_store(64).await;
        let result = store
            .store_capture(b"not an image".to_vec(), "doc1", FieldType::SanitationSteps, 0, Utc::now())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_remove_only_touches_capture_dir() {
        let (store, dir) = test_store(64).await;
        let path = store
            .store_capture(png(8, 8), "../doc1", FieldType::SanitationSteps, 0, Utc::now())
            .await
            .unwrap();
        assert!(path.starts_with(store.base_path()));

        let outside = dir.path().join("gallery.jpg");
        std::fs::write(&outside, b"keep").unwrap();

        store.remove(&format!("file://{}", path.display())).await;
        store.remove(outside.to_str().unwrap()).await;

        assert!(!path.exists());
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn test_remove_rejects_parent_components() {
        let (store, dir) = test_store(64).await;
        let outside = dir.path().join("gallery.jpg");
        std::fs::write(&outside, b"keep").unwrap();

        let sneaky = store.base_path().join("..").join("gallery.jpg");
        assert!(sneaky.starts_with(store.base_path()));

        store.remove(&format!("file://{}", sneaky.display())).await;
        store.remove(sneaky.to_str().unwrap()).await;

        assert!(outside.exists());
    }
}
