//! Staging: local, side-effect free preparation of an image
//!
//! Staging may be retried freely; nothing leaves the device until upload.

use async_trait::async_trait;
use kin_record::{ContentHash, CropCoordinates, MediaVariant};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A user-selected image awaiting commit
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMedia {
    pub path: PathBuf,
    pub variant: MediaVariant,
}

impl LocalMedia {
    #[inline]
    #[must_use]
    pub fn original(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            variant: MediaVariant::Original,
        }
    }

    /// Derived rendition of an original already on the record
    #[inline]
    #[must_use]
    pub fn cropped(path: impl Into<PathBuf>, crop: CropCoordinates) -> Self {
        Self {
            path: path.into(),
            variant: MediaVariant::Cropped { crop },
        }
    }
}

/// Bytes ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMedia {
    /// File to upload (may differ from the source when re-encoded)
    pub path: PathBuf,
    pub content_hash: ContentHash,
    pub content_type: String,
    pub extension: String,
    pub byte_len: u64,
}

/// Staging failure; nothing external happened
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("{0} is empty")]
    Empty(PathBuf),

    #[error("image is {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },
}

/// Prepares a local image for upload (resize, recompress, strip metadata)
#[async_trait]
pub trait MediaOptimizer: Send + Sync {
    async fn stage(&self, source: &Path) -> Result<StagedMedia, StageError>;
}

#[async_trait]
impl<T: MediaOptimizer + ?Sized> MediaOptimizer for Arc<T> {
    async fn stage(&self, source: &Path) -> Result<StagedMedia, StageError> {
        (**self).stage(source).await
    }
}

/// Content type for a known image extension
#[must_use]
pub fn content_type_for(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Default size limit (20 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// Stages the file as-is: hashes it and infers its content type
#[derive(Debug, Clone, Copy)]
pub struct PassthroughOptimizer {
    max_bytes: u64,
}

impl PassthroughOptimizer {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for PassthroughOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaOptimizer for PassthroughOptimizer {
    async fn stage(&self, source: &Path) -> Result<StagedMedia, StageError> {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let content_type = content_type_for(&extension)
            .ok_or_else(|| StageError::UnsupportedFormat(source.display().to_string()))?;

        let bytes = tokio::fs::read(source).await.map_err(|e| StageError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        let byte_len = bytes.len() as u64;
        if byte_len == 0 {
            return Err(StageError::Empty(source.to_path_buf()));
        }
        if byte_len > self.max_bytes {
            return Err(StageError::TooLarge {
                size: byte_len,
                max: self.max_bytes,
            });
        }

        let content_hash = ContentHash::compute(&bytes);
        tracing::debug!(
            "Staged {} ({} bytes, {})",
            source.display(),
            byte_len,
            content_hash.short()
        );

        Ok(StagedMedia {
            path: source.to_path_buf(),
            content_hash,
            content_type: content_type.to_string(),
            extension,
            byte_len,
        })
    }
}
