//! Access modes and permission decisions

use chrono::{DateTime, Utc};
use kin_record::{ActorId, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What mutation path an actor may use on a record
///
/// Four mutually exclusive modes. `ReadOnly` behaves exactly like `Blocked`
/// for writes; it exists so presenters can word the refusal differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Submit directly through the versioned controller
    Direct,
    /// Wrap the mutation as a pending suggestion
    Suggest,
    /// No write path; record is viewable
    ReadOnly,
    /// No write of any kind
    Blocked,
}

impl AccessMode {
    /// Whether any write path exists (direct or suggestion)
    #[inline]
    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, Self::Direct | Self::Suggest)
    }

    #[inline]
    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, Self::Direct)
    }

    #[inline]
    #[must_use]
    pub fn requires_suggestion(self) -> bool {
        matches!(self, Self::Suggest)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::Suggest => "suggest",
            Self::ReadOnly => "read_only",
            Self::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// The authorization collaborator answered
    Authorizer,
    /// No answer was available; safe default applied
    Fallback,
}

/// Decision for one (actor, record) pair at one point in time
///
/// Never cached across mutations: relationships can change mid-edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub mode: AccessMode,
    pub actor: ActorId,
    pub target: RecordId,
    pub source: DecisionSource,
    pub decided_at: DateTime<Utc>,
}

impl PermissionDecision {
    /// Decision reported by the authorizer
    #[must_use]
    pub fn granted(mode: AccessMode, actor: ActorId, target: RecordId) -> Self {
        Self {
            mode,
            actor,
            target,
            source: DecisionSource::Authorizer,
            decided_at: Utc::now(),
        }
    }

    /// `Blocked` because no permission signal was available
    #[must_use]
    pub fn fallback(actor: ActorId, target: RecordId) -> Self {
        Self {
            mode: AccessMode::Blocked,
            actor,
            target,
            source: DecisionSource::Fallback,
            decided_at: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.source == DecisionSource::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_direct_and_suggest_can_write() {
        assert!(AccessMode::Direct.can_write());
        assert!(AccessMode::Suggest.can_write());
        assert!(!AccessMode::ReadOnly.can_write());
        assert!(!AccessMode::Blocked.can_write());
    }

    #[test]
    fn fallback_is_blocked() {
        let decision = PermissionDecision::fallback(ActorId::new("a"), RecordId::new("r"));
        assert_eq!(decision.mode, AccessMode::Blocked);
        assert!(decision.is_fallback());
    }
}
