//! In-memory object storage with fault switches

use async_trait::async_trait;
use dashmap::DashMap;
use kin_media::{DestinationKey, ObjectStorage, StorageError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// URL scheme of stored objects
pub const MEM_SCHEME: &str = "mem://";

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub source: PathBuf,
    pub content_type: String,
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    objects: DashMap<String, StoredObject>,
    delete_log: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    upload_calls: AtomicUsize,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.objects.contains_key(url)
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.objects.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn object(&self, url: &str) -> Option<StoredObject> {
        self.objects.get(url).map(|e| e.value().clone())
    }

    /// Every url passed to `delete`, in call order
    #[must_use]
    pub fn delete_log(&self) -> Vec<String> {
        self.delete_log.lock().clone()
    }

    #[must_use]
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(
        &self,
        local_path: &Path,
        key: &DestinationKey,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::transport("upload interrupted", true));
        }

        let url = format!("{MEM_SCHEME}{key}");
        match self.objects.entry(url.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StorageError::AlreadyExists(key.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(StoredObject {
                    key: key.to_string(),
                    source: local_path.to_path_buf(),
                    content_type: content_type.to_string(),
                });
                Ok(url)
            }
        }
    }

    async fn delete(&self, remote_url: &str) -> Result<(), StorageError> {
        self.delete_log.lock().push(remote_url.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::transport("delete timed out", true));
        }
        self.objects.remove(remote_url);
        Ok(())
    }
}
