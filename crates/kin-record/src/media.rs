//! Media assets and their commit lifecycle
//!
//! ```text
//! Staged -> Uploaded -> Linked
//!              |
//!              +-----> RolledBack
//! ```

use crate::crop::CropCoordinates;
use crate::hash::ContentHash;
use crate::ids::{AssetId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Commit state of a media asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Optimized locally; no external side effect yet
    Staged,
    /// Durable in object storage; not yet referenced by the record
    Uploaded,
    /// Referenced by the record (or by a pending suggestion)
    Linked,
    /// Uploaded object deleted after a failed link
    RolledBack,
}

impl LinkState {
    /// States reachable from `self` in one step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [LinkState] {
        match self {
            Self::Staged => &[Self::Uploaded],
            Self::Uploaded => &[Self::Linked, Self::RolledBack],
            Self::Linked | Self::RolledBack => &[],
        }
    }

    /// Check a single transition
    ///
    /// # Errors
    /// Returns [`LinkStateError`] if `to` is not reachable from `self`
    pub fn validate_transition(self, to: LinkState) -> Result<(), LinkStateError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(LinkStateError { from: self, to })
        }
    }

    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Illegal lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal media transition {from:?} -> {to:?}")]
pub struct LinkStateError {
    pub from: LinkState,
    pub to: LinkState,
}

/// Which rendition of the image an asset is
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "variant")]
pub enum MediaVariant {
    /// The full original image
    Original,
    /// A derived rendition; the crop is metadata relative to the original
    Cropped { crop: CropCoordinates },
}

impl MediaVariant {
    /// Short name used in storage keys
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Cropped { .. } => "cropped",
        }
    }

    /// Crop metadata, if derived
    #[must_use]
    pub fn crop(&self) -> Option<&CropCoordinates> {
        match self {
            Self::Original => None,
            Self::Cropped { crop } => Some(crop),
        }
    }
}

/// One media asset moving through the commit pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub asset_id: AssetId,
    pub owner_record_id: RecordId,
    pub variant: MediaVariant,
    pub source_local_path: PathBuf,
    pub content_hash: Option<ContentHash>,
    pub remote_url: Option<String>,
    link_state: LinkState,
    pub updated_at: DateTime<Utc>,
}

impl MediaAsset {
    /// New asset in [`LinkState::Staged`]
    #[must_use]
    pub fn staged(
        owner_record_id: RecordId,
        variant: MediaVariant,
        source_local_path: PathBuf,
        content_hash: ContentHash,
    ) -> Self {
        Self {
            asset_id: AssetId::new(),
            owner_record_id,
            variant,
            source_local_path,
            content_hash: Some(content_hash),
            remote_url: None,
            link_state: LinkState::Staged,
            updated_at: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    /// Advance the lifecycle
    ///
    /// # Errors
    /// Returns [`LinkStateError`] on an illegal transition; state is unchanged
    pub fn transition(&mut self, to: LinkState) -> Result<(), LinkStateError> {
        self.link_state.validate_transition(to)?;
        self.link_state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a successful upload and enter [`LinkState::Uploaded`]
    ///
    /// # Errors
    /// Returns [`LinkStateError`] unless currently `Staged`
    pub fn mark_uploaded(&mut self, remote_url: String) -> Result<(), LinkStateError> {
        self.transition(LinkState::Uploaded)?;
        self.remote_url = Some(remote_url);
        Ok(())
    }
}
