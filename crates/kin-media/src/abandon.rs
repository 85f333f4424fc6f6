//! Abandonment of an in-progress commit
//!
//! In-flight calls are never force-aborted. The pipeline checks the handle at
//! step boundaries only.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What to do with an upload that landed after the user walked away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonPolicy {
    /// Link it anyway; the record stays consistent and re-visitable
    #[default]
    AcceptLateSuccess,
    /// Skip the link and delete the uploaded object
    Reverse,
}

/// Shared abandon flag for one edit
#[derive(Debug, Clone, Default)]
pub struct AbandonHandle {
    abandoned: Arc<AtomicBool>,
}

impl AbandonHandle {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the edit abandoned; takes effect at the next step boundary
    pub fn abandon(&self) {
        if !self.abandoned.swap(true, Ordering::AcqRel) {
            tracing::debug!("Edit abandoned");
        }
    }

    #[inline]
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let handle = AbandonHandle::new();
        let ui_side = handle.clone();
        assert!(!handle.is_abandoned());
        ui_side.abandon();
        assert!(handle.is_abandoned());
    }

    #[test]
    fn policy_wire_names() {
        assert_eq!(
            serde_json::to_string(&AbandonPolicy::AcceptLateSuccess).unwrap(),
            "\"accept_late_success\""
        );
        assert_eq!(AbandonPolicy::default(), AbandonPolicy::AcceptLateSuccess);
    }
}
