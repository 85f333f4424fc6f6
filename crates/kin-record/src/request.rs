//! Mutation requests and their classified outcomes

use crate::field::FieldPatch;
use crate::ids::RecordId;
use crate::record::ProfileRecord;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A field patch submitted against an expected record version
///
/// Created per user action and discarded once resolved. `expected_version`
/// is the optimistic lock token: the last version the client observed.
///
/// # Invariants
/// - `patch` is non-empty
/// - `expected_version >= 1`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    target_id: RecordId,
    expected_version: Version,
    patch: FieldPatch,
}

impl MutationRequest {
    /// Create a request, enforcing its preconditions
    ///
    /// # Errors
    /// - [`RequestError::EmptyPatch`] if `patch` has no assignments
    /// - [`RequestError::InvalidVersion`] if `expected_version` is 0
    pub fn new(
        target_id: RecordId,
        expected_version: Version,
        patch: FieldPatch,
    ) -> Result<Self, RequestError> {
        if patch.is_empty() {
            return Err(RequestError::EmptyPatch);
        }
        if !expected_version.is_valid() {
            return Err(RequestError::InvalidVersion(expected_version));
        }
        Ok(Self {
            target_id,
            expected_version,
            patch,
        })
    }

    #[inline]
    #[must_use]
    pub fn target_id(&self) -> &RecordId {
        &self.target_id
    }

    #[inline]
    #[must_use]
    pub fn expected_version(&self) -> Version {
        self.expected_version
    }

    #[inline]
    #[must_use]
    pub fn patch(&self) -> &FieldPatch {
        &self.patch
    }

    /// Decompose into parts
    #[must_use]
    pub fn into_parts(self) -> (RecordId, Version, FieldPatch) {
        (self.target_id, self.expected_version, self.patch)
    }
}

/// Request precondition violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("patch must assign at least one field")]
    EmptyPatch,

    #[error("expected version must be >= 1, got {0}")]
    InvalidVersion(Version),
}

/// Why a mutation was refused outright
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RejectReason {
    /// Backend or gate denied the write
    Permission,
    /// Target record does not exist
    NotFound,
    /// Backend refused the payload
    Invalid(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission => f.write_str("permission"),
            Self::NotFound => f.write_str("not found"),
            Self::Invalid(detail) => write!(f, "invalid: {detail}"),
        }
    }
}

/// Classified result of one compare-and-swap submission
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Patch committed; `new_version` is the new baseline
    Applied { new_version: Version },

    /// Another writer won the race; nothing was applied
    Conflict {
        current_version: Version,
        current_snapshot: Option<Box<ProfileRecord>>,
    },

    /// Write refused; nothing was applied
    Rejected { reason: RejectReason },

    /// Server state unknown; may be retried with the same expected version
    TransportFailure { retryable: bool },
}

impl MutationOutcome {
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// New baseline version, if applied
    #[inline]
    #[must_use]
    pub fn new_version(&self) -> Option<Version> {
        match self {
            Self::Applied { new_version } => Some(*new_version),
            _ => None,
        }
    }

    /// Whether the same request may be resent unchanged
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure { retryable: true })
    }

    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Conflict { .. } => "conflict",
            Self::Rejected { .. } => "rejected",
            Self::TransportFailure { .. } => "transport_failure",
        }
    }
}
