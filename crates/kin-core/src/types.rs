//! Edit requests and outcomes

use kin_media::LocalMedia;
use kin_record::{ActorId, FieldPatch, MediaAsset, RecordId, SuggestionId, Version};

/// One user action against one record
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub actor: ActorId,
    pub target: RecordId,
    /// Version the actor last observed
    pub expected_version: Version,
    pub patch: FieldPatch,
    pub media: Option<LocalMedia>,
}

impl EditRequest {
    #[must_use]
    pub fn new(actor: ActorId, target: RecordId, expected_version: Version) -> Self {
        Self {
            actor,
            target,
            expected_version,
            patch: FieldPatch::new(),
            media: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_patch(mut self, patch: FieldPatch) -> Self {
        self.patch = patch;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_media(mut self, media: LocalMedia) -> Self {
        self.media = Some(media);
        self
    }

    /// Nothing to submit
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty() && self.media.is_none()
    }
}

/// Successful edit
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Written; `new_version` is the new baseline
    Applied {
        new_version: Version,
        asset: Option<MediaAsset>,
    },
    /// Filed for approval; the record version is unchanged
    Suggested {
        suggestion_id: SuggestionId,
        asset: Option<MediaAsset>,
    },
}

impl EditOutcome {
    #[inline]
    #[must_use]
    pub fn new_version(&self) -> Option<Version> {
        match self {
            Self::Applied { new_version, .. } => Some(*new_version),
            Self::Suggested { .. } => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn asset(&self) -> Option<&MediaAsset> {
        match self {
            Self::Applied { asset, .. } | Self::Suggested { asset, .. } => asset.as_ref(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_suggested(&self) -> bool {
        matches!(self, Self::Suggested { .. })
    }
}
