//! Media commit saga: stage, upload, link
//!
//! Steps run strictly in sequence for one asset. Upload is the first external
//! side effect; if the link step then fails, the uploaded object is deleted
//! (`Uploaded -> RolledBack`). If that delete fails too, the object is reported
//! as an orphan. A commit therefore ends in exactly one of:
//! - `Linked`: stored and referenced
//! - `RolledBack`: not stored, record unchanged
//! - orphan: stored, unreferenced, recorded in the [`OrphanLedger`]

use crate::abandon::{AbandonHandle, AbandonPolicy};
use crate::error::CommitError;
use crate::key::{DestinationKey, DEFAULT_KEY_PREFIX};
use crate::linker::{LinkFailure, LinkReceipt, MediaLinker};
use crate::orphan::{OrphanLedger, OrphanReason, OrphanReport};
use crate::stage::{LocalMedia, MediaOptimizer, StagedMedia};
use crate::storage::{ObjectStorage, StorageError};
use futures::future::join_all;
use kin_mutation::RetryPolicy;
use kin_record::{LinkState, MediaAsset, RecordId};

/// A linked asset and how the link landed
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub asset: MediaAsset,
    pub receipt: LinkReceipt,
}

/// Saga runner over an optimizer and an object store
#[derive(Debug)]
pub struct MediaCommitPipeline<O, S> {
    optimizer: O,
    storage: S,
    key_prefix: String,
    abandon_policy: AbandonPolicy,
    cleanup_retry: RetryPolicy,
    orphans: OrphanLedger,
}

impl<O: MediaOptimizer, S: ObjectStorage> MediaCommitPipeline<O, S> {
    #[must_use]
    pub fn new(optimizer: O, storage: S) -> Self {
        Self {
            optimizer,
            storage,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            abandon_policy: AbandonPolicy::default(),
            cleanup_retry: RetryPolicy::none(),
            orphans: OrphanLedger::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_abandon_policy(mut self, policy: AbandonPolicy) -> Self {
        self.abandon_policy = policy;
        self
    }

    /// Retry retryable failures of the compensating delete
    #[inline]
    #[must_use]
    pub fn with_cleanup_retry(mut self, retry: RetryPolicy) -> Self {
        self.cleanup_retry = retry;
        self
    }

    /// Report orphans into a shared ledger
    #[inline]
    #[must_use]
    pub fn with_orphan_ledger(mut self, ledger: OrphanLedger) -> Self {
        self.orphans = ledger;
        self
    }

    #[inline]
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[inline]
    #[must_use]
    pub fn orphans(&self) -> &OrphanLedger {
        &self.orphans
    }

    /// Commit one asset for `owner`
    ///
    /// # Errors
    /// Returns a [`CommitError`] whose [`effect`](CommitError::effect) tells
    /// whether nothing happened, the upload was rolled back, or it was orphaned
    pub async fn commit<L>(
        &self,
        local: LocalMedia,
        owner: &RecordId,
        linker: &L,
    ) -> Result<MediaAsset, CommitError>
    where
        L: MediaLinker + ?Sized,
    {
        self.commit_with(local, owner, linker, &AbandonHandle::new())
            .await
            .map(|committed| committed.asset)
    }

    /// Commit one asset, honoring `abandon` at step boundaries
    ///
    /// # Errors
    /// As [`commit`](Self::commit), plus [`CommitError::Abandoned`]
    pub async fn commit_with<L>(
        &self,
        local: LocalMedia,
        owner: &RecordId,
        linker: &L,
        abandon: &AbandonHandle,
    ) -> Result<Committed, CommitError>
    where
        L: MediaLinker + ?Sized,
    {
        if abandon.is_abandoned() {
            return Err(CommitError::Abandoned { asset: None });
        }

        let staged = self.optimizer.stage(&local.path).await?;
        let mut asset = MediaAsset::staged(
            owner.clone(),
            local.variant,
            staged.path.clone(),
            staged.content_hash,
        );

        if abandon.is_abandoned() {
            tracing::debug!("Commit of {} abandoned before upload", asset.asset_id);
            return Err(CommitError::Abandoned {
                asset: Some(Box::new(asset)),
            });
        }

        self.upload(&mut asset, &staged).await?;

        if abandon.is_abandoned() {
            match self.abandon_policy {
                AbandonPolicy::Reverse => {
                    tracing::info!(
                        "Commit of {} abandoned after upload, reversing",
                        asset.asset_id
                    );
                    return Err(self.compensate(asset, None).await);
                }
                AbandonPolicy::AcceptLateSuccess => {
                    tracing::info!(
                        "Commit of {} abandoned after upload, linking anyway",
                        asset.asset_id
                    );
                }
            }
        }

        self.link(asset, linker).await
    }

    /// Commit independent assets concurrently
    ///
    /// Results are in input order; one failure does not affect the others.
    pub async fn commit_all<L>(
        &self,
        jobs: Vec<(LocalMedia, RecordId)>,
        linker: &L,
    ) -> Vec<Result<MediaAsset, CommitError>>
    where
        L: MediaLinker + ?Sized,
    {
        join_all(
            jobs.into_iter()
                .map(|(local, owner)| async move { self.commit(local, &owner, linker).await }),
        )
        .await
    }

    async fn upload(
        &self,
        asset: &mut MediaAsset,
        staged: &StagedMedia,
    ) -> Result<(), CommitError> {
        let key = DestinationKey::generate(
            &self.key_prefix,
            &asset.owner_record_id,
            &asset.variant,
            &staged.content_hash,
            &staged.extension,
        );

        let url = self
            .storage
            .upload(&staged.path, &key, &staged.content_type)
            .await
            .map_err(|e| {
                tracing::warn!("Upload of {} to {} failed: {}", asset.asset_id, key, e);
                CommitError::Upload(e)
            })?;

        tracing::info!("Uploaded {} as {}", asset.asset_id, url);
        asset.mark_uploaded(url)?;
        Ok(())
    }

    async fn link<L>(&self, asset: MediaAsset, linker: &L) -> Result<Committed, CommitError>
    where
        L: MediaLinker + ?Sized,
    {
        match linker.link(&asset).await {
            Ok(receipt) => Self::linked(asset, receipt),
            Err(failure) if failure.is_indeterminate() => match linker.verify(&asset).await {
                Ok(Some(observed_version)) => {
                    tracing::warn!("Link of {} reported failure but landed", asset.asset_id);
                    Self::linked(asset, LinkReceipt::Verified { observed_version })
                }
                Ok(None) => Err(self.compensate(asset, Some(failure)).await),
                Err(e) => {
                    tracing::warn!("Link of {} unverifiable: {}", asset.asset_id, e);
                    Err(self.orphan(asset, OrphanReason::Unverified { link: failure }))
                }
            },
            Err(failure) => Err(self.compensate(asset, Some(failure)).await),
        }
    }

    fn linked(mut asset: MediaAsset, receipt: LinkReceipt) -> Result<Committed, CommitError> {
        asset.transition(LinkState::Linked)?;
        tracing::info!(
            "Linked {} to {} ({:?})",
            asset.asset_id,
            asset.owner_record_id,
            receipt
        );
        Ok(Committed { asset, receipt })
    }

    /// Delete the uploaded object; `cause` is `None` when abandoned
    async fn compensate(&self, mut asset: MediaAsset, cause: Option<LinkFailure>) -> CommitError {
        let Some(url) = asset.remote_url.clone() else {
            return CommitError::Abandoned {
                asset: Some(Box::new(asset)),
            };
        };

        match self.delete_with_retry(&url).await {
            Ok(()) => {
                if let Err(e) = asset.transition(LinkState::RolledBack) {
                    return CommitError::InvalidState(e);
                }
                tracing::warn!("Rolled back upload {} of {}", url, asset.asset_id);
                match cause {
                    Some(cause) => CommitError::RolledBack {
                        asset: Box::new(asset),
                        cause,
                    },
                    None => CommitError::Abandoned {
                        asset: Some(Box::new(asset)),
                    },
                }
            }
            Err(delete) => self.orphan(
                asset,
                OrphanReason::CleanupFailed {
                    link: cause,
                    delete,
                },
            ),
        }
    }

    async fn delete_with_retry(&self, url: &str) -> Result<(), StorageError> {
        let mut attempt = 1;
        loop {
            match self.storage.delete(url).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && self.cleanup_retry.allows_retry_after(attempt) => {
                    tracing::debug!("Delete of {} failed (attempt {}): {}", url, attempt, e);
                    tokio::time::sleep(self.cleanup_retry.delay_after(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn orphan(&self, asset: MediaAsset, reason: OrphanReason) -> CommitError {
        let url = asset.remote_url.clone().unwrap_or_default();
        let report = OrphanReport::new(&asset, url, reason);
        self.orphans.record(report.clone());
        CommitError::Orphaned {
            asset: Box::new(asset),
            report: Box::new(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SideEffect;
    use crate::linker::MockMediaLinker;
    use crate::stage::StageError;
    use crate::storage::MockObjectStorage;
    use async_trait::async_trait;
    use crate::linker::PatchLinker;
    use kin_mutation::{
        CasAck, MutationRpc, RpcError, VersionedMutationController, PERMISSION_DENIED_CODE,
    };
    use kin_record::{
        ContentHash, CropCoordinates, FieldPatch, MutationRequest, ProfileField, ProfileRecord,
        Version,
    };
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedStage;

    #[async_trait]
    impl MediaOptimizer for FixedStage {
        async fn stage(&self, source: &Path) -> Result<StagedMedia, StageError> {
            Ok(StagedMedia {
                path: source.to_path_buf(),
                content_hash: ContentHash::compute(source.to_string_lossy().as_bytes()),
                content_type: "image/jpeg".to_string(),
                extension: "jpg".to_string(),
                byte_len: 1,
            })
        }
    }

    fn uploads_to(storage: &mut MockObjectStorage, url: &'static str) {
        storage
            .expect_upload()
            .times(1)
            .returning(move |_, _, _| Ok(url.to_string()));
    }

    fn applied() -> Result<LinkReceipt, LinkFailure> {
        Ok(LinkReceipt::Applied {
            new_version: Version::new(4),
        })
    }

    fn owner() -> RecordId {
        RecordId::new("p1")
    }

    #[tokio::test]
    async fn happy_path_links() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_upload()
            .withf(|_, key, content_type| {
                key.as_str().starts_with("media/p1/original/") && content_type == "image/jpeg"
            })
            .times(1)
            .returning(|_, _, _| Ok("mem://u".to_string()));
        storage.expect_delete().times(0);

        let mut linker = MockMediaLinker::new();
        linker.expect_link().times(1).returning(|_| applied());

        let pipeline = MediaCommitPipeline::new(FixedStage, storage).with_key_prefix("media");
        let asset = pipeline
            .commit(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker)
            .await
            .unwrap();
        assert_eq!(asset.link_state(), LinkState::Linked);
        assert_eq!(asset.remote_url.as_deref(), Some("mem://u"));
    }

    #[tokio::test]
    async fn link_failure_deletes_upload() {
        let mut storage = MockObjectStorage::new();
        uploads_to(&mut storage, "mem://u");
        storage
            .expect_delete()
            .withf(|url| url == "mem://u")
            .times(1)
            .returning(|_| Ok(()));

        let mut linker = MockMediaLinker::new();
        linker.expect_link().returning(|_| {
            Err(LinkFailure::Conflict {
                current_version: Version::new(5),
            })
        });
        linker.expect_verify().times(0);

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let crop = CropCoordinates::new(0.1, 0.1, 0.1, 0.1).unwrap();
        let err = pipeline
            .commit(LocalMedia::cropped("/tmp/a.jpg", crop), &owner(), &linker)
            .await
            .unwrap_err();
        assert_eq!(err.effect(), SideEffect::RolledBack);
        assert!(err.is_conflict());
        assert_eq!(err.asset().map(MediaAsset::link_state), Some(LinkState::RolledBack));
        assert!(pipeline.orphans().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_is_orphan_not_rollback() {
        let mut storage = MockObjectStorage::new();
        uploads_to(&mut storage, "mem://u");
        storage
            .expect_delete()
            .returning(|_| Err(StorageError::transport("timeout", true)));

        let mut linker = MockMediaLinker::new();
        linker
            .expect_link()
            .returning(|_| Err(LinkFailure::Rejected(kin_record::RejectReason::Permission)));

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let err = pipeline
            .commit(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker)
            .await
            .unwrap_err();
        assert_eq!(err.effect(), SideEffect::Orphaned);
        assert_eq!(err.asset().map(MediaAsset::link_state), Some(LinkState::Uploaded));
        let orphans = pipeline.orphans().snapshot();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].remote_url, "mem://u");
        assert!(orphans[0].reason.is_safe_to_delete());
    }

    #[tokio::test]
    async fn upload_failure_never_links() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_upload()
            .returning(|_, _, _| Err(StorageError::transport("offline", true)));
        storage.expect_delete().times(0);

        let mut linker = MockMediaLinker::new();
        linker.expect_link().times(0);

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let err = pipeline
            .commit(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker)
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::Upload(_)));
        assert_eq!(err.effect(), SideEffect::Nothing);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn indeterminate_link_that_landed_is_kept() {
        let mut storage = MockObjectStorage::new();
        uploads_to(&mut storage, "mem://u");
        storage.expect_delete().times(0);

        let mut linker = MockMediaLinker::new();
        linker
            .expect_link()
            .returning(|_| Err(LinkFailure::Transport { retryable: true }));
        linker
            .expect_verify()
            .times(1)
            .returning(|_| Ok(Some(Version::new(4))));

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let asset = pipeline
            .commit(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker)
            .await
            .unwrap();
        assert_eq!(asset.link_state(), LinkState::Linked);
    }

    mockall::mock! {
        Rpc {}
        #[async_trait]
        impl MutationRpc for Rpc {
            async fn compare_and_swap(&self, request: &MutationRequest) -> Result<CasAck, RpcError>;
            async fn fetch_record(&self, id: &RecordId) -> Result<ProfileRecord, RpcError>;
        }
    }

    /// First write lands with its response lost; the retry is denied. The
    /// record already references the object, so it must not be deleted.
    #[tokio::test]
    async fn denied_retry_after_landed_write_keeps_upload() {
        let mut storage = MockObjectStorage::new();
        uploads_to(&mut storage, "mem://u");
        storage.expect_delete().times(0);

        let mut rpc = MockRpc::new();
        let mut seq = mockall::Sequence::new();
        rpc.expect_compare_and_swap()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(RpcError::transport("connection reset", true)));
        rpc.expect_compare_and_swap()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(RpcError::coded(PERMISSION_DENIED_CODE, "denied")));
        rpc.expect_fetch_record().times(1).returning(|id| {
            Ok(ProfileRecord::new(id.clone())
                .at_version(Version::new(4))
                .with_field(ProfileField::PhotoUrl, "mem://u"))
        });

        let controller = VersionedMutationController::new(rpc)
            .with_retry_policy(RetryPolicy::new(3, Duration::ZERO));
        let linker = PatchLinker::new(
            Arc::new(controller),
            Version::new(3),
            FieldPatch::new().name("Ada"),
        );

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let committed = pipeline
            .commit_with(
                LocalMedia::original("/tmp/a.jpg"),
                &owner(),
                &linker,
                &AbandonHandle::new(),
            )
            .await
            .unwrap();
        assert_eq!(committed.asset.link_state(), LinkState::Linked);
        assert_eq!(
            committed.receipt,
            LinkReceipt::Verified {
                observed_version: Version::new(4)
            }
        );
        assert!(pipeline.orphans().is_empty());
    }

    #[tokio::test]
    async fn indeterminate_link_absent_is_rolled_back() {
        let mut storage = MockObjectStorage::new();
        uploads_to(&mut storage, "mem://u");
        storage.expect_delete().times(1).returning(|_| Ok(()));

        let mut linker = MockMediaLinker::new();
        linker
            .expect_link()
            .returning(|_| Err(LinkFailure::Transport { retryable: true }));
        linker.expect_verify().returning(|_| Ok(None));

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let err = pipeline
            .commit(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker)
            .await
            .unwrap_err();
        assert_eq!(err.effect(), SideEffect::RolledBack);
    }

    #[tokio::test]
    async fn unverifiable_link_is_orphaned_without_delete() {
        let mut storage = MockObjectStorage::new();
        uploads_to(&mut storage, "mem://u");
        storage.expect_delete().times(0);

        let mut linker = MockMediaLinker::new();
        linker
            .expect_link()
            .returning(|_| Err(LinkFailure::Transport { retryable: true }));
        linker
            .expect_verify()
            .returning(|_| Err(LinkFailure::Transport { retryable: true }));

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let err = pipeline
            .commit(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker)
            .await
            .unwrap_err();
        assert_eq!(err.effect(), SideEffect::Orphaned);
        assert!(!pipeline.orphans().snapshot()[0].reason.is_safe_to_delete());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_retries_transient_delete_failures() {
        let mut storage = MockObjectStorage::new();
        uploads_to(&mut storage, "mem://u");
        let mut seq = mockall::Sequence::new();
        storage
            .expect_delete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StorageError::transport("timeout", true)));
        storage
            .expect_delete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut linker = MockMediaLinker::new();
        linker.expect_link().returning(|_| {
            Err(LinkFailure::Conflict {
                current_version: Version::new(9),
            })
        });

        let pipeline = MediaCommitPipeline::new(FixedStage, storage)
            .with_cleanup_retry(RetryPolicy::new(2, Duration::from_millis(10)));
        let err = pipeline
            .commit(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker)
            .await
            .unwrap_err();
        assert_eq!(err.effect(), SideEffect::RolledBack);
    }

    #[tokio::test]
    async fn abandoned_before_upload_touches_nothing() {
        let mut storage = MockObjectStorage::new();
        storage.expect_upload().times(0);
        let mut linker = MockMediaLinker::new();
        linker.expect_link().times(0);

        let handle = AbandonHandle::new();
        handle.abandon();

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let err = pipeline
            .commit_with(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker, &handle)
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::Abandoned { .. }));
        assert_eq!(err.effect(), SideEffect::Nothing);
    }

    fn abandoning_upload(storage: &mut MockObjectStorage, handle: &AbandonHandle) {
        let handle = handle.clone();
        storage.expect_upload().times(1).returning(move |_, _, _| {
            handle.abandon();
            Ok("mem://late".to_string())
        });
    }

    #[tokio::test]
    async fn late_upload_is_linked_by_default() {
        let handle = AbandonHandle::new();
        let mut storage = MockObjectStorage::new();
        abandoning_upload(&mut storage, &handle);
        storage.expect_delete().times(0);

        let mut linker = MockMediaLinker::new();
        linker.expect_link().times(1).returning(|_| applied());

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let committed = pipeline
            .commit_with(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker, &handle)
            .await
            .unwrap();
        assert_eq!(committed.asset.link_state(), LinkState::Linked);
        assert_eq!(
            committed.receipt,
            LinkReceipt::Applied {
                new_version: Version::new(4)
            }
        );
    }

    #[tokio::test]
    async fn reverse_policy_deletes_late_upload() {
        let handle = AbandonHandle::new();
        let mut storage = MockObjectStorage::new();
        abandoning_upload(&mut storage, &handle);
        storage
            .expect_delete()
            .withf(|url| url == "mem://late")
            .times(1)
            .returning(|_| Ok(()));

        let mut linker = MockMediaLinker::new();
        linker.expect_link().times(0);

        let pipeline = MediaCommitPipeline::new(FixedStage, storage)
            .with_abandon_policy(AbandonPolicy::Reverse);
        let err = pipeline
            .commit_with(LocalMedia::original("/tmp/a.jpg"), &owner(), &linker, &handle)
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::Abandoned { .. }));
        assert_eq!(err.effect(), SideEffect::RolledBack);
    }

    #[tokio::test]
    async fn commit_all_keeps_failures_independent() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_upload()
            .times(2)
            .returning(|path, _, _| Ok(format!("mem://{}", path.display())));
        storage.expect_delete().times(1).returning(|_| Ok(()));

        let mut linker = MockMediaLinker::new();
        linker.expect_link().times(2).returning(|asset| {
            if asset.owner_record_id.as_str() == "bad" {
                Err(LinkFailure::Rejected(kin_record::RejectReason::NotFound))
            } else {
                applied()
            }
        });

        let pipeline = MediaCommitPipeline::new(FixedStage, storage);
        let results = pipeline
            .commit_all(
                vec![
                    (LocalMedia::original("/tmp/a.jpg"), RecordId::new("good")),
                    (LocalMedia::original("/tmp/b.jpg"), RecordId::new("bad")),
                ],
                &linker,
            )
            .await;
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().effect(), SideEffect::RolledBack);
    }
}
