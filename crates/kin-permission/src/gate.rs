//! Permission gate
//!
//! Resolves the [`AccessMode`] for every attempted mutation. Any failure to
//! obtain a signal resolves to `Blocked`.

use crate::mode::{AccessMode, PermissionDecision};
use async_trait::async_trait;
use kin_record::{ActorId, RecordId};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on how long resolution may take
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// External authorization collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Access mode of `actor` on `target`, as of now
    async fn access_mode(
        &self,
        actor: &ActorId,
        target: &RecordId,
    ) -> Result<AccessMode, AuthorizerError>;
}

#[async_trait]
impl<T: Authorizer + ?Sized> Authorizer for Arc<T> {
    async fn access_mode(
        &self,
        actor: &ActorId,
        target: &RecordId,
    ) -> Result<AccessMode, AuthorizerError> {
        (**self).access_mode(actor, target).await
    }
}

/// Authorizer failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthorizerError {
    /// Network or backend failure
    #[error("authorization transport failure: {0}")]
    Transport(String),

    /// Actor or record unknown to the authorizer
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
}

/// Per-mutation permission resolution
#[derive(Debug, Clone)]
pub struct PermissionGate<A> {
    authorizer: A,
    timeout: Duration,
}

impl<A: Authorizer> PermissionGate<A> {
    /// Create gate with [`DEFAULT_RESOLVE_TIMEOUT`]
    #[inline]
    #[must_use]
    pub fn new(authorizer: A) -> Self {
        Self {
            authorizer,
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// Override the resolution timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the decision for `actor` on `target`
    ///
    /// Always asks the authorizer; nothing is cached. Errors and timeouts
    /// resolve to a fallback `Blocked` decision.
    pub async fn resolve(&self, actor: &ActorId, target: &RecordId) -> PermissionDecision {
        let lookup = self.authorizer.access_mode(actor, target);
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(mode)) => {
                tracing::debug!("Permission for {} on {}: {}", actor, target, mode);
                PermissionDecision::granted(mode, actor.clone(), target.clone())
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "Permission lookup failed for {} on {}: {}; blocking",
                    actor,
                    target,
                    e
                );
                PermissionDecision::fallback(actor.clone(), target.clone())
            }
            Err(_) => {
                tracing::warn!(
                    "Permission lookup for {} on {} timed out after {:?}; blocking",
                    actor,
                    target,
                    self.timeout
                );
                PermissionDecision::fallback(actor.clone(), target.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::DecisionSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ids() -> (ActorId, RecordId) {
        (ActorId::new("alice"), RecordId::new("p1"))
    }

    #[tokio::test]
    async fn passes_through_authorizer_mode() {
        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_access_mode()
            .returning(|_, _| Ok(AccessMode::Suggest));

        let gate = PermissionGate::new(authorizer);
        let (actor, target) = ids();
        let decision = gate.resolve(&actor, &target).await;
        assert_eq!(decision.mode, AccessMode::Suggest);
        assert_eq!(decision.source, DecisionSource::Authorizer);
    }

    #[tokio::test]
    async fn authorizer_error_blocks() {
        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_access_mode()
            .returning(|_, _| Err(AuthorizerError::Transport("offline".to_string())));

        let gate = PermissionGate::new(authorizer);
        let (actor, target) = ids();
        let decision = gate.resolve(&actor, &target).await;
        assert_eq!(decision.mode, AccessMode::Blocked);
        assert!(decision.is_fallback());
    }

    #[tokio::test]
    async fn resolves_every_time() {
        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_access_mode()
            .times(3)
            .returning(|_, _| Ok(AccessMode::Direct));

        let gate = PermissionGate::new(authorizer);
        let (actor, target) = ids();
        for _ in 0..3 {
            assert!(gate.resolve(&actor, &target).await.mode.is_direct());
        }
    }

    struct SlowAuthorizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Authorizer for SlowAuthorizer {
        async fn access_mode(
            &self,
            _actor: &ActorId,
            _target: &RecordId,
        ) -> Result<AccessMode, AuthorizerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AccessMode::Direct)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_blocks() {
        let gate = PermissionGate::new(SlowAuthorizer {
            calls: AtomicUsize::new(0),
        })
        .with_timeout(Duration::from_millis(100));
        let (actor, target) = ids();

        let decision = gate.resolve(&actor, &target).await;
        assert_eq!(decision.mode, AccessMode::Blocked);
        assert!(decision.is_fallback());
        assert_eq!(gate.authorizer.calls.load(Ordering::SeqCst), 1);
    }
}
