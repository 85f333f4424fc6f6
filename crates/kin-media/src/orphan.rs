//! Orphan ledger
//!
//! An orphan is a stored object that no record references and that the
//! pipeline could not delete. Orphans are never dropped silently: each one is
//! logged at error level and kept here until reconciled.

use crate::linker::LinkFailure;
use crate::storage::{ObjectStorage, StorageError};
use chrono::{DateTime, Utc};
use kin_record::{AssetId, MediaAsset, RecordId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Why an uploaded object was left behind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrphanReason {
    /// The compensating delete failed; `link` is `None` when the commit was abandoned
    #[error("cleanup failed: {delete}")]
    CleanupFailed {
        link: Option<LinkFailure>,
        delete: StorageError,
    },

    /// Link outcome unknown and unverifiable; deleting could leave a dangling reference
    #[error("link unverified: {link}")]
    Unverified { link: LinkFailure },
}

impl OrphanReason {
    /// Whether reconciliation may delete the object without checking the record
    #[inline]
    #[must_use]
    pub fn is_safe_to_delete(&self) -> bool {
        matches!(self, Self::CleanupFailed { .. })
    }
}

/// One orphaned object awaiting out-of-band cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanReport {
    pub asset_id: AssetId,
    pub owner_record_id: RecordId,
    pub remote_url: String,
    pub reason: OrphanReason,
    pub reported_at: DateTime<Utc>,
}

impl OrphanReport {
    #[must_use]
    pub fn new(asset: &MediaAsset, remote_url: String, reason: OrphanReason) -> Self {
        Self {
            asset_id: asset.asset_id,
            owner_record_id: asset.owner_record_id.clone(),
            remote_url,
            reason,
            reported_at: Utc::now(),
        }
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub cleaned: usize,
    pub remaining: usize,
    /// Entries left for an operator (unverified links)
    pub skipped: usize,
}

/// Shared list of unreconciled orphans
#[derive(Debug, Clone, Default)]
pub struct OrphanLedger {
    entries: Arc<Mutex<Vec<OrphanReport>>>,
}

impl OrphanLedger {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, report: OrphanReport) {
        tracing::error!(
            "Orphaned object {} (asset {}, record {}): {}",
            report.remote_url,
            report.asset_id,
            report.owner_record_id,
            report.reason
        );
        self.entries.lock().push(report);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<OrphanReport> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Retry deletes for orphans whose cleanup failed
    ///
    /// Unverified entries are left untouched. Entries whose delete fails again
    /// stay in the ledger.
    pub async fn reconcile<S: ObjectStorage + ?Sized>(&self, storage: &S) -> ReconcileSummary {
        let pending = std::mem::take(&mut *self.entries.lock());
        let mut summary = ReconcileSummary::default();
        let mut keep = Vec::new();

        for report in pending {
            if !report.reason.is_safe_to_delete() {
                summary.skipped += 1;
                keep.push(report);
                continue;
            }
            match storage.delete(&report.remote_url).await {
                Ok(()) => {
                    tracing::info!("Reconciled orphan {}", report.remote_url);
                    summary.cleaned += 1;
                }
                Err(e) => {
                    tracing::warn!("Orphan {} still not deletable: {}", report.remote_url, e);
                    summary.remaining += 1;
                    keep.push(report);
                }
            }
        }

        // Orphans recorded while reconciling stay behind the kept ones.
        let mut entries = self.entries.lock();
        keep.append(&mut entries);
        *entries = keep;
        summary
    }
}
