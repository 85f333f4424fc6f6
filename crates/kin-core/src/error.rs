//! Editor errors
//!
//! Every failure is typed. A caller can always tell "nothing happened" from
//! "something happened and was rolled back" from "something happened and
//! cleanup failed" via [`EditError::effect`].

use kin_media::{CommitError, LinkFailure, SideEffect};
use kin_mutation::ErrorClass;
use kin_permission::AccessMode;
use kin_record::{ProfileRecord, RecordId, RejectReason, RequestError, Version};

/// Failure of one edit
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// Refused before any write (`mode` set) or by the backend (`mode` unset)
    #[error("permission denied{}", .mode.map(|m| format!(" ({m} access)")).unwrap_or_default())]
    PermissionDenied { mode: Option<AccessMode> },

    /// Another writer won; nothing was applied
    #[error("record changed elsewhere (now {current_version})")]
    Conflict {
        current_version: Version,
        snapshot: Option<Box<ProfileRecord>>,
    },

    /// The session saw a conflict and must reload before submitting again
    #[error("session baseline {baseline} is stale; reload first")]
    StaleSession { baseline: Version },

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("edit rejected: {0}")]
    Invalid(String),

    /// Server state unknown
    #[error("transport failure")]
    Transport { retryable: bool },

    #[error("invalid edit request: {0}")]
    Request(#[from] RequestError),

    #[error("media commit failed: {0}")]
    Media(#[from] CommitError),
}

impl EditError {
    /// Map a rejection reason from the backend
    #[must_use]
    pub fn rejected(reason: RejectReason, target: &RecordId) -> Self {
        match reason {
            RejectReason::Permission => Self::PermissionDenied { mode: None },
            RejectReason::NotFound => Self::NotFound(target.clone()),
            RejectReason::Invalid(detail) => Self::Invalid(detail),
        }
    }

    /// Map a classified RPC failure outside the CAS path (reads, suggestions)
    ///
    /// `expected` is the version the call was made against, if any. A
    /// stale-version signal that names no version and has no baseline to
    /// bound it is reported as invalid rather than guessed.
    #[must_use]
    pub fn from_class(class: ErrorClass, target: &RecordId, expected: Option<Version>) -> Self {
        match class {
            ErrorClass::Conflict { reported } => match reported.or(expected.map(Version::next)) {
                Some(current_version) => Self::Conflict {
                    current_version,
                    snapshot: None,
                },
                None => Self::Invalid("stale-version signal without a version".to_string()),
            },
            ErrorClass::PermissionDenied => Self::PermissionDenied { mode: None },
            ErrorClass::NotFound => Self::NotFound(target.clone()),
            ErrorClass::Invalid(detail) => Self::Invalid(detail),
            ErrorClass::Transport { retryable } => Self::Transport { retryable },
        }
    }

    /// What happened to storage and the record
    #[must_use]
    pub fn effect(&self) -> SideEffect {
        match self {
            Self::Media(e) => e.effect(),
            _ => SideEffect::Nothing,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable } => *retryable,
            Self::Media(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The caller must re-fetch and re-derive its patch
    #[must_use]
    pub fn requires_reload(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::StaleSession { .. } => true,
            Self::Media(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Text for the person editing
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        const CHANGED_ELSEWHERE: &str =
            "This profile was changed elsewhere. Please reload and try again.";
        const NOTHING_CHANGED: &str = "Failed to save. Nothing was changed.";
        const TRY_AGAIN: &str = "Connection problem. Please try again.";

        match self {
            Self::Conflict { .. } | Self::StaleSession { .. } => CHANGED_ELSEWHERE,
            Self::PermissionDenied {
                mode: Some(AccessMode::ReadOnly),
            } => "This profile is locked and cannot be edited.",
            Self::PermissionDenied { .. } => "You do not have permission to edit this profile.",
            Self::NotFound(_) => "This profile no longer exists.",
            Self::Invalid(_) | Self::Request(_) => "Some of the changes are not valid.",
            Self::Transport { .. } => TRY_AGAIN,
            Self::Media(e) => match e {
                CommitError::Stage(_) => "This image could not be prepared for upload.",
                CommitError::Upload(_) => "Failed to upload media.",
                CommitError::RolledBack {
                    cause: LinkFailure::Conflict { .. },
                    ..
                } => CHANGED_ELSEWHERE,
                CommitError::RolledBack { .. } | CommitError::InvalidState(_) => NOTHING_CHANGED,
                CommitError::Orphaned { .. } => "Failed to save. Please contact support.",
                CommitError::Abandoned { .. } => "The edit was cancelled.",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kin_media::StorageError;

    #[test]
    fn conflict_asks_for_reload() {
        let err = EditError::Conflict {
            current_version: Version::new(4),
            snapshot: None,
        };
        assert!(err.requires_reload());
        assert!(!err.is_retryable());
        assert_eq!(err.effect(), SideEffect::Nothing);
        assert_eq!(
            err.user_message(),
            "This profile was changed elsewhere. Please reload and try again."
        );
    }

    #[test]
    fn read_only_and_blocked_read_differently() {
        let locked = EditError::PermissionDenied {
            mode: Some(AccessMode::ReadOnly),
        };
        let blocked = EditError::PermissionDenied {
            mode: Some(AccessMode::Blocked),
        };
        assert_ne!(locked.user_message(), blocked.user_message());
        assert_eq!(
            EditError::rejected(RejectReason::Permission, &RecordId::new("p1")).user_message(),
            blocked.user_message()
        );
    }

    #[test]
    fn upload_failure_is_retryable_and_harmless() {
        let err = EditError::from(CommitError::Upload(StorageError::transport("offline", true)));
        assert!(err.is_retryable());
        assert_eq!(err.effect(), SideEffect::Nothing);
        assert_eq!(err.user_message(), "Failed to upload media.");
    }

    #[test]
    fn display_includes_mode() {
        let err = EditError::PermissionDenied {
            mode: Some(AccessMode::Blocked),
        };
        assert_eq!(err.to_string(), "permission denied (blocked access)");
    }

    #[test]
    fn versionless_conflict_is_bounded_by_the_baseline() {
        let class = ErrorClass::Conflict { reported: None };
        let err = EditError::from_class(class, &RecordId::new("p1"), Some(Version::new(3)));
        assert!(matches!(
            err,
            EditError::Conflict { current_version, .. } if current_version == Version::new(4)
        ));
    }

    #[test]
    fn versionless_conflict_without_baseline_is_not_guessed() {
        let class = ErrorClass::Conflict { reported: None };
        let err = EditError::from_class(class, &RecordId::new("p1"), None);
        assert!(matches!(err, EditError::Invalid(_)));
    }
}
