//! Table-driven authorizer

use async_trait::async_trait;
use dashmap::DashMap;
use kin_permission::{AccessMode, Authorizer, AuthorizerError};
use kin_record::{ActorId, RecordId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Answers from a grant table; unknown pairs get the default mode
#[derive(Debug)]
pub struct StaticAuthorizer {
    grants: DashMap<(ActorId, RecordId), AccessMode>,
    default_mode: AccessMode,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticAuthorizer {
    #[must_use]
    pub fn new(default_mode: AccessMode) -> Self {
        Self {
            grants: DashMap::new(),
            default_mode,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_grant(self, actor: &ActorId, target: &RecordId, mode: AccessMode) -> Self {
        self.grant(actor, target, mode);
        self
    }

    /// Change a grant; takes effect on the next resolution
    pub fn grant(&self, actor: &ActorId, target: &RecordId, mode: AccessMode) {
        self.grants.insert((actor.clone(), target.clone()), mode);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn access_mode(
        &self,
        actor: &ActorId,
        target: &RecordId,
    ) -> Result<AccessMode, AuthorizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthorizerError::Transport("authorization service unavailable".to_string()));
        }
        Ok(self
            .grants
            .get(&(actor.clone(), target.clone()))
            .map_or(self.default_mode, |mode| *mode))
    }
}
