//! Object storage seam

use crate::key::DestinationKey;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Storage failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Call did not complete
    #[error("storage transport failure: {message}")]
    Transport { message: String, retryable: bool },

    /// An object already exists at the key; storage refused to overwrite
    #[error("object already exists at {0}")]
    AlreadyExists(String),

    /// Storage refused the request
    #[error("storage rejected request: {0}")]
    Rejected(String),
}

impl StorageError {
    #[inline]
    #[must_use]
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            message: message.into(),
            retryable,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }
}

/// Durable object storage
///
/// `upload` must never overwrite an existing object. `delete` must be
/// idempotent: deleting a missing object succeeds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `local_path` under `key`, returning the public URL
    async fn upload(
        &self,
        local_path: &Path,
        key: &DestinationKey,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Remove the object behind `remote_url`
    async fn delete(&self, remote_url: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: ObjectStorage + ?Sized> ObjectStorage for Arc<T> {
    async fn upload(
        &self,
        local_path: &Path,
        key: &DestinationKey,
        content_type: &str,
    ) -> Result<String, StorageError> {
        (**self).upload(local_path, key, content_type).await
    }

    async fn delete(&self, remote_url: &str) -> Result<(), StorageError> {
        (**self).delete(remote_url).await
    }
}
