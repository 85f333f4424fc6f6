//! Kinship media commit
//!
//! A best-effort saga that takes a locally selected image to a durable,
//! record-referenced object, or cleans up after itself.
//!
//! # Core Concepts
//!
//! - [`MediaCommitPipeline`]: `Staged -> Uploaded -> Linked`, or `Uploaded -> RolledBack`
//! - [`MediaOptimizer`]: local staging seam ([`PassthroughOptimizer`])
//! - [`ObjectStorage`]: upload never overwrites, delete is idempotent
//! - [`MediaLinker`]: how the record comes to reference the object
//! - [`OrphanLedger`]: objects whose cleanup failed, kept for reconciliation
//!
//! # Example
//!
//! ```rust,ignore
//! use kin_media::{LocalMedia, MediaCommitPipeline, PassthroughOptimizer, VersionedLinker};
//!
//! let pipeline = MediaCommitPipeline::new(PassthroughOptimizer::new(), storage);
//! let linker = VersionedLinker::new(controller.clone());
//! match pipeline.commit(LocalMedia::original(path), &owner, &linker).await {
//!     Ok(asset) => println!("linked {}", asset.remote_url.unwrap()),
//!     Err(e) => println!("{} ({:?})", e, e.effect()),
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod abandon;
mod error;
mod key;
mod linker;
mod orphan;
mod pipeline;
mod stage;
mod storage;

pub use abandon::{AbandonHandle, AbandonPolicy};
pub use error::{CommitError, SideEffect};
pub use key::{DestinationKey, DEFAULT_KEY_PREFIX};
pub use linker::{
    media_patch, LinkFailure, LinkReceipt, MediaLinker, PatchLinker, SuggestionLinker,
    VersionedLinker,
};
pub use orphan::{OrphanLedger, OrphanReason, OrphanReport, ReconcileSummary};
pub use pipeline::{Committed, MediaCommitPipeline};
pub use stage::{
    content_type_for, LocalMedia, MediaOptimizer, PassthroughOptimizer, StageError, StagedMedia,
    DEFAULT_MAX_BYTES,
};
pub use storage::{ObjectStorage, StorageError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use async_trait::async_trait;
    use kin_record::{LinkState, RecordId, Version};
    use std::io::Write;
    use std::path::Path;

    struct AcceptAll;

    #[async_trait]
    impl MediaLinker for AcceptAll {
        async fn link(&self, _asset: &kin_record::MediaAsset) -> Result<LinkReceipt, LinkFailure> {
            Ok(LinkReceipt::Applied {
                new_version: Version::new(2),
            })
        }

        async fn verify(
            &self,
            _asset: &kin_record::MediaAsset,
        ) -> Result<Option<Version>, LinkFailure> {
            Ok(Some(Version::new(2)))
        }
    }

    struct EchoStorage;

    #[async_trait]
    impl ObjectStorage for EchoStorage {
        async fn upload(
            &self,
            _local_path: &Path,
            key: &DestinationKey,
            _content_type: &str,
        ) -> Result<String, StorageError> {
            Ok(format!("mem://{key}"))
        }

        async fn delete(&self, _remote_url: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn passthrough_stage_feeds_content_addressed_key() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"png bytes").unwrap();

        let pipeline = MediaCommitPipeline::new(PassthroughOptimizer::new(), EchoStorage);
        let asset = pipeline
            .commit(LocalMedia::original(file.path()), &RecordId::new("p1"), &AcceptAll)
            .await
            .unwrap();

        let hash = asset.content_hash.unwrap();
        let url = asset.remote_url.clone().unwrap();
        assert_eq!(asset.link_state(), LinkState::Linked);
        assert!(url.starts_with("mem://profiles/p1/original/"));
        assert!(url.contains(&hash.short()));
        assert!(url.ends_with(".png"));
    }
}
