//! Read-through record cache using moka
//!
//! Clients keep a possibly-stale copy of each record. The cached copy is only
//! a starting point for the next edit; it is never patched locally, and any
//! conflict or accepted write drops or replaces it.

use crate::rpc::{MutationRpc, RpcError};
use kin_record::{ProfileRecord, RecordId, Version};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Cached records keyed by id
#[derive(Debug, Clone)]
pub struct RecordCache {
    inner: Cache<RecordId, Arc<ProfileRecord>>,
}

impl RecordCache {
    /// Create cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cached copy, if any
    pub async fn get(&self, id: &RecordId) -> Option<Arc<ProfileRecord>> {
        self.inner.get(id).await
    }

    /// Cached copy, fetching through `rpc` on a miss
    ///
    /// # Errors
    /// Returns the fetch error on a miss that cannot be filled
    pub async fn get_or_fetch<R>(
        &self,
        rpc: &R,
        id: &RecordId,
    ) -> Result<Arc<ProfileRecord>, RpcError>
    where
        R: MutationRpc + ?Sized,
    {
        self.inner
            .try_get_with(id.clone(), async {
                tracing::debug!("Record cache miss for {}", id);
                rpc.fetch_record(id).await.map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Replace the cached copy unless the cache already holds a newer one
    pub async fn refresh(&self, record: ProfileRecord) {
        if let Some(existing) = self.inner.get(&record.id).await {
            if existing.version > record.version {
                return;
            }
        }
        self.inner.insert(record.id.clone(), Arc::new(record)).await;
    }

    /// Drop the cached copy (stale)
    pub async fn invalidate(&self, id: &RecordId) {
        self.inner.invalidate(id).await;
    }

    /// Drop everything
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Version of the cached copy, if any
    pub async fn baseline(&self, id: &RecordId) -> Option<Version> {
        self.inner.get(id).await.map(|r| r.version)
    }
}

impl Default for RecordCache {
    /// Cache with default capacity (1,000 records)
    fn default() -> Self {
        Self::new(1_000)
    }
}
