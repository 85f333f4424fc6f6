//! Commit failures
//!
//! Every failure says what happened to storage and the record:
//! - nothing happened ([`SideEffect::Nothing`])
//! - something happened and was rolled back ([`SideEffect::RolledBack`])
//! - something happened and cleanup failed ([`SideEffect::Orphaned`])

use crate::linker::LinkFailure;
use crate::orphan::OrphanReport;
use crate::stage::StageError;
use crate::storage::StorageError;
use kin_record::{LinkState, LinkStateError, MediaAsset};
use serde::{Deserialize, Serialize};

/// Net effect of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    Nothing,
    RolledBack,
    Orphaned,
}

/// Typed failure of [`crate::MediaCommitPipeline::commit`]
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("staging failed: {0}")]
    Stage(#[from] StageError),

    /// No link attempted
    #[error("upload failed: {0}")]
    Upload(StorageError),

    /// Link failed; uploaded object deleted, record unchanged
    #[error("link failed, upload rolled back: {cause}")]
    RolledBack {
        asset: Box<MediaAsset>,
        cause: LinkFailure,
    },

    /// Object left in storage without a record reference
    #[error("orphaned upload {}: {}", .report.remote_url, .report.reason)]
    Orphaned {
        asset: Box<MediaAsset>,
        report: Box<OrphanReport>,
    },

    /// Abandoned at a step boundary; `asset` is `RolledBack` if an upload was deleted
    #[error("commit abandoned")]
    Abandoned { asset: Option<Box<MediaAsset>> },

    #[error("illegal media state transition: {0}")]
    InvalidState(#[from] LinkStateError),
}

impl CommitError {
    #[must_use]
    pub fn effect(&self) -> SideEffect {
        match self {
            Self::Stage(_) | Self::Upload(_) | Self::InvalidState(_) => SideEffect::Nothing,
            Self::RolledBack { .. } => SideEffect::RolledBack,
            Self::Orphaned { .. } => SideEffect::Orphaned,
            Self::Abandoned { asset } => match asset.as_deref().map(MediaAsset::link_state) {
                Some(LinkState::RolledBack) => SideEffect::RolledBack,
                _ => SideEffect::Nothing,
            },
        }
    }

    /// Whether trying the same commit again is reasonable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upload(e) => e.is_retryable(),
            Self::RolledBack { cause, .. } => {
                matches!(cause, LinkFailure::Transport { retryable: true })
            }
            _ => false,
        }
    }

    /// Link failed because the record moved on
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::RolledBack {
                cause: LinkFailure::Conflict { .. },
                ..
            }
        )
    }

    /// Asset as it stood when the commit stopped, if one was created
    #[must_use]
    pub fn asset(&self) -> Option<&MediaAsset> {
        match self {
            Self::RolledBack { asset, .. } | Self::Orphaned { asset, .. } => Some(&**asset),
            Self::Abandoned { asset } => asset.as_deref(),
            _ => None,
        }
    }
}
