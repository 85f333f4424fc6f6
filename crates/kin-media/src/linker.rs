//! Link step: point a record at an uploaded object
//!
//! Three strategies share the [`MediaLinker`] seam:
//! - [`VersionedLinker`]: media fields only, through the CAS controller
//! - [`PatchLinker`]: the user's pending patch plus media fields, one CAS call
//! - [`SuggestionLinker`]: media reference filed as a suggestion

use async_trait::async_trait;
use kin_mutation::{
    ErrorClass, MutationRpc, RpcError, SignalClassifier, Suggestion, SuggestionSink,
    VersionedMutationController,
};
use kin_record::{
    ActorId, FieldPatch, MediaAsset, MediaVariant, MutationOutcome, MutationRequest,
    ProfileField, RecordId, RejectReason, SuggestionId, Version,
};
use serde_json::Value;
use std::sync::Arc;

/// Successful link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkReceipt {
    /// Record now references the object at `new_version`
    Applied { new_version: Version },
    /// Reference filed for approval; the record is unchanged
    Suggested { suggestion_id: SuggestionId },
    /// Indeterminate link found to have landed; record observed at `observed_version`
    Verified { observed_version: Version },
}

/// Failed link
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkFailure {
    #[error("record changed concurrently (now {current_version})")]
    Conflict { current_version: Version },

    #[error("link rejected: {0}")]
    Rejected(RejectReason),

    /// Outcome unknown; the record may or may not reference the object
    #[error("link outcome unknown (transport failure)")]
    Transport { retryable: bool },

    #[error("asset has no remote url")]
    NotUploaded,
}

impl LinkFailure {
    /// Whether the record may have been changed anyway
    #[inline]
    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    fn from_outcome(outcome: MutationOutcome) -> Result<LinkReceipt, Self> {
        match outcome {
            MutationOutcome::Applied { new_version } => Ok(LinkReceipt::Applied { new_version }),
            MutationOutcome::Conflict {
                current_version, ..
            } => Err(Self::Conflict { current_version }),
            MutationOutcome::Rejected { reason } => Err(Self::Rejected(reason)),
            MutationOutcome::TransportFailure { retryable } => Err(Self::Transport { retryable }),
        }
    }

    /// `expected` is the version the failed call was made against, if any
    fn from_rpc(
        classifier: &SignalClassifier,
        error: &RpcError,
        expected: Option<Version>,
    ) -> Self {
        match classifier.classify(error) {
            ErrorClass::Conflict { reported } => match reported.or(expected.map(Version::next)) {
                Some(current_version) => Self::Conflict { current_version },
                None => Self::Rejected(RejectReason::Invalid(format!(
                    "stale-version signal without a version: {error}"
                ))),
            },
            ErrorClass::PermissionDenied => Self::Rejected(RejectReason::Permission),
            ErrorClass::NotFound => Self::Rejected(RejectReason::NotFound),
            ErrorClass::Invalid(detail) => Self::Rejected(RejectReason::Invalid(detail)),
            ErrorClass::Transport { retryable } => Self::Transport { retryable },
        }
    }
}

/// Updates the owning record to reference an uploaded asset
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaLinker: Send + Sync {
    /// Reference `asset.remote_url` from its owner record
    async fn link(&self, asset: &MediaAsset) -> Result<LinkReceipt, LinkFailure>;

    /// After an indeterminate link: the version at which the record was seen
    /// referencing the object, or `None` if it does not
    ///
    /// An error means the question cannot be answered.
    async fn verify(&self, asset: &MediaAsset) -> Result<Option<Version>, LinkFailure>;
}

#[async_trait]
impl<T: MediaLinker + ?Sized> MediaLinker for Arc<T> {
    async fn link(&self, asset: &MediaAsset) -> Result<LinkReceipt, LinkFailure> {
        (**self).link(asset).await
    }

    async fn verify(&self, asset: &MediaAsset) -> Result<Option<Version>, LinkFailure> {
        (**self).verify(asset).await
    }
}

/// Record fields that reference `asset`
///
/// An original replaces both the displayed and the original photo and clears
/// any crop. A cropped rendition replaces only the displayed photo and carries
/// its crop; the original reference is left alone.
///
/// # Errors
/// Returns [`LinkFailure::NotUploaded`] if the asset has no remote url
pub fn media_patch(asset: &MediaAsset) -> Result<FieldPatch, LinkFailure> {
    let url = asset.remote_url.as_deref().ok_or(LinkFailure::NotUploaded)?;
    let patch = match &asset.variant {
        MediaVariant::Original => FieldPatch::new()
            .photo(url)
            .set(ProfileField::PhotoOriginalUrl, url)
            .set(ProfileField::CropTop, Value::Null)
            .set(ProfileField::CropBottom, Value::Null)
            .set(ProfileField::CropLeft, Value::Null)
            .set(ProfileField::CropRight, Value::Null),
        MediaVariant::Cropped { crop } => FieldPatch::new().photo(url).crop(crop),
    };
    Ok(patch)
}

async fn record_references<R: MutationRpc>(
    controller: &VersionedMutationController<R>,
    asset: &MediaAsset,
) -> Result<Option<Version>, LinkFailure> {
    let url = asset.remote_url.as_deref().ok_or(LinkFailure::NotUploaded)?;
    match controller.rpc().fetch_record(&asset.owner_record_id).await {
        Ok(record) => Ok(record.references(url).then_some(record.version)),
        Err(e) => {
            tracing::warn!("Cannot verify link of {} on {}: {}", url, asset.owner_record_id, e);
            Err(LinkFailure::from_rpc(controller.classifier(), &e, None))
        }
    }
}

/// Media-only update through the CAS controller
///
/// Without a pinned version the current version is read just before the write;
/// a concurrent writer between read and write still surfaces as a conflict.
#[derive(Debug)]
pub struct VersionedLinker<R> {
    controller: Arc<VersionedMutationController<R>>,
    expected: Option<Version>,
}

impl<R: MutationRpc> VersionedLinker<R> {
    #[inline]
    #[must_use]
    pub fn new(controller: Arc<VersionedMutationController<R>>) -> Self {
        Self {
            controller,
            expected: None,
        }
    }

    /// Write against `version` instead of the freshly read one
    #[inline]
    #[must_use]
    pub fn at_version(mut self, version: Version) -> Self {
        self.expected = Some(version);
        self
    }

    async fn expected_version(&self, owner: &RecordId) -> Result<Version, LinkFailure> {
        if let Some(version) = self.expected {
            return Ok(version);
        }
        let rpc = self.controller.rpc();
        let current = match self.controller.cache() {
            Some(cache) => cache.get_or_fetch(rpc, owner).await.map(|r| r.version),
            None => rpc.fetch_record(owner).await.map(|r| r.version),
        };
        current.map_err(|e| LinkFailure::from_rpc(self.controller.classifier(), &e, None))
    }
}

#[async_trait]
impl<R: MutationRpc> MediaLinker for VersionedLinker<R> {
    async fn link(&self, asset: &MediaAsset) -> Result<LinkReceipt, LinkFailure> {
        let patch = media_patch(asset)?;
        let expected = self.expected_version(&asset.owner_record_id).await?;
        let request = MutationRequest::new(asset.owner_record_id.clone(), expected, patch)
            .map_err(|e| LinkFailure::Rejected(RejectReason::Invalid(e.to_string())))?;
        LinkFailure::from_outcome(self.controller.submit(&request).await)
    }

    async fn verify(&self, asset: &MediaAsset) -> Result<Option<Version>, LinkFailure> {
        record_references(&self.controller, asset).await
    }
}

/// The user's pending field edits and the media reference in one CAS call
///
/// Either the whole form (photo included) lands, or nothing does.
#[derive(Debug)]
pub struct PatchLinker<R> {
    controller: Arc<VersionedMutationController<R>>,
    expected: Version,
    patch: FieldPatch,
}

impl<R: MutationRpc> PatchLinker<R> {
    #[inline]
    #[must_use]
    pub fn new(
        controller: Arc<VersionedMutationController<R>>,
        expected: Version,
        patch: FieldPatch,
    ) -> Self {
        Self {
            controller,
            expected,
            patch,
        }
    }
}

#[async_trait]
impl<R: MutationRpc> MediaLinker for PatchLinker<R> {
    async fn link(&self, asset: &MediaAsset) -> Result<LinkReceipt, LinkFailure> {
        let mut patch = self.patch.clone();
        patch.merge(media_patch(asset)?);
        let request = MutationRequest::new(asset.owner_record_id.clone(), self.expected, patch)
            .map_err(|e| LinkFailure::Rejected(RejectReason::Invalid(e.to_string())))?;
        LinkFailure::from_outcome(self.controller.submit(&request).await)
    }

    async fn verify(&self, asset: &MediaAsset) -> Result<Option<Version>, LinkFailure> {
        record_references(&self.controller, asset).await
    }
}

/// Files the media reference (and any pending edits) as a suggestion
#[derive(Debug)]
pub struct SuggestionLinker<S> {
    sink: S,
    author: ActorId,
    base_version: Version,
    patch: FieldPatch,
    classifier: SignalClassifier,
}

impl<S: SuggestionSink> SuggestionLinker<S> {
    #[inline]
    #[must_use]
    pub fn new(sink: S, author: ActorId, base_version: Version) -> Self {
        Self {
            sink,
            author,
            base_version,
            patch: FieldPatch::new(),
            classifier: SignalClassifier::default(),
        }
    }

    /// Include pending field edits in the suggestion
    #[inline]
    #[must_use]
    pub fn with_patch(mut self, patch: FieldPatch) -> Self {
        self.patch = patch;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_classifier(mut self, classifier: SignalClassifier) -> Self {
        self.classifier = classifier;
        self
    }
}

#[async_trait]
impl<S: SuggestionSink> MediaLinker for SuggestionLinker<S> {
    async fn link(&self, asset: &MediaAsset) -> Result<LinkReceipt, LinkFailure> {
        let mut patch = self.patch.clone();
        patch.merge(media_patch(asset)?);
        let suggestion = Suggestion::new(
            asset.owner_record_id.clone(),
            self.author.clone(),
            self.base_version,
            patch,
        );
        match self.sink.propose(&suggestion).await {
            Ok(suggestion_id) => Ok(LinkReceipt::Suggested { suggestion_id }),
            Err(e) => Err(LinkFailure::from_rpc(
                &self.classifier,
                &e,
                Some(self.base_version),
            )),
        }
    }

    /// Filed suggestions cannot be looked up, so an indeterminate proposal
    /// is never assumed absent.
    async fn verify(&self, _asset: &MediaAsset) -> Result<Option<Version>, LinkFailure> {
        Err(LinkFailure::Transport { retryable: false })
    }
}
