//! Versioned mutation controller
//!
//! Submits a [`MutationRequest`] to the compare-and-swap endpoint and
//! classifies the result.
//!
//! # Characteristics
//! - No automatic retry on conflict: another writer won, and resending the
//!   same patch would clobber their change. The caller re-fetches and
//!   re-derives a patch.
//! - Transport failures may be retried with the *same* expected version
//!   (see [`RetryPolicy`]).
//! - No local optimistic application; the cached copy is dropped or replaced.

use crate::cache::RecordCache;
use crate::classify::{ErrorClass, SignalClassifier};
use crate::retry::RetryPolicy;
use crate::rpc::MutationRpc;
use kin_record::{
    FieldPatch, MutationOutcome, MutationRequest, ProfileRecord, RecordId, RejectReason,
    RequestError, Version,
};

/// Compare-and-swap submitter
#[derive(Debug)]
pub struct VersionedMutationController<R> {
    rpc: R,
    classifier: SignalClassifier,
    retry: RetryPolicy,
    cache: Option<RecordCache>,
    fetch_snapshot_on_conflict: bool,
}

impl<R: MutationRpc> VersionedMutationController<R> {
    /// Controller with default classification, no retry and no cache
    #[inline]
    #[must_use]
    pub fn new(rpc: R) -> Self {
        Self {
            rpc,
            classifier: SignalClassifier::default(),
            retry: RetryPolicy::none(),
            cache: None,
            fetch_snapshot_on_conflict: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_classifier(mut self, classifier: SignalClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep `cache` coherent with submission outcomes
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: RecordCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Whether to re-read the record on conflict
    #[inline]
    #[must_use]
    pub fn with_snapshot_on_conflict(mut self, enabled: bool) -> Self {
        self.fetch_snapshot_on_conflict = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    #[inline]
    #[must_use]
    pub fn classifier(&self) -> &SignalClassifier {
        &self.classifier
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&RecordCache> {
        self.cache.as_ref()
    }

    /// Build and submit a request in one step
    ///
    /// # Errors
    /// Returns [`RequestError`] if the request preconditions fail; nothing is sent
    pub async fn submit_patch(
        &self,
        target_id: RecordId,
        expected_version: Version,
        patch: FieldPatch,
    ) -> Result<MutationOutcome, RequestError> {
        let request = MutationRequest::new(target_id, expected_version, patch)?;
        Ok(self.submit(&request).await)
    }

    /// Submit `request` and classify the outcome
    pub async fn submit(&self, request: &MutationRequest) -> MutationOutcome {
        let mut attempt = 1;
        loop {
            let outcome = self.submit_once(request).await;
            match outcome {
                MutationOutcome::TransportFailure { retryable: true }
                    if self.retry.allows_retry_after(attempt) =>
                {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        "Transport failure submitting {} at {} (attempt {}), retrying in {:?}",
                        request.target_id(),
                        request.expected_version(),
                        attempt,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                // An earlier attempt may have landed; only success is conclusive.
                MutationOutcome::Conflict { .. }
                | MutationOutcome::Rejected { .. }
                | MutationOutcome::TransportFailure { .. }
                    if attempt > 1 =>
                {
                    tracing::warn!(
                        "{} on {} after a lost response; outcome unknown",
                        outcome.label(),
                        request.target_id()
                    );
                    return MutationOutcome::TransportFailure { retryable: false };
                }
                outcome => return outcome,
            }
        }
    }

    async fn submit_once(&self, request: &MutationRequest) -> MutationOutcome {
        let target = request.target_id();
        let expected = request.expected_version();

        match self.rpc.compare_and_swap(request).await {
            Ok(ack) => {
                let new_version = ack.resolve(expected);
                if new_version != expected.next() {
                    tracing::warn!(
                        "Backend reported {} for write against {} on {}",
                        new_version,
                        expected,
                        target
                    );
                }
                if let Some(cache) = &self.cache {
                    cache.invalidate(target).await;
                }
                tracing::info!(
                    "Applied {} field(s) to {}: {} -> {}",
                    request.patch().len(),
                    target,
                    expected,
                    new_version
                );
                MutationOutcome::Applied { new_version }
            }
            Err(err) => match self.classifier.classify(&err) {
                ErrorClass::Conflict { reported } => self.conflict(request, reported).await,
                ErrorClass::PermissionDenied => {
                    tracing::warn!("Write to {} denied by backend", target);
                    MutationOutcome::Rejected {
                        reason: RejectReason::Permission,
                    }
                }
                ErrorClass::NotFound => {
                    if let Some(cache) = &self.cache {
                        cache.invalidate(target).await;
                    }
                    MutationOutcome::Rejected {
                        reason: RejectReason::NotFound,
                    }
                }
                ErrorClass::Invalid(detail) => {
                    tracing::warn!("Write to {} rejected: {}", target, detail);
                    MutationOutcome::Rejected {
                        reason: RejectReason::Invalid(detail),
                    }
                }
                ErrorClass::Transport { retryable } => {
                    tracing::debug!("Transport failure on {}: {}", target, err);
                    MutationOutcome::TransportFailure { retryable }
                }
            },
        }
    }

    async fn conflict(
        &self,
        request: &MutationRequest,
        reported: Option<Version>,
    ) -> MutationOutcome {
        let target = request.target_id();
        let snapshot = if self.fetch_snapshot_on_conflict {
            self.fetch_snapshot(target).await
        } else {
            None
        };

        if let Some(cache) = &self.cache {
            match &snapshot {
                Some(record) => cache.refresh(record.clone()).await,
                None => cache.invalidate(target).await,
            }
        }

        // The stored version differs from one the client observed and versions
        // only grow, so expected + 1 is a lower bound when nothing better is known.
        let current_version = snapshot
            .as_ref()
            .map(|record| record.version)
            .or(reported)
            .unwrap_or_else(|| request.expected_version().next());

        tracing::warn!(
            "Version conflict on {}: expected {}, current {}",
            target,
            request.expected_version(),
            current_version
        );

        MutationOutcome::Conflict {
            current_version,
            current_snapshot: snapshot.map(Box::new),
        }
    }

    async fn fetch_snapshot(&self, target: &RecordId) -> Option<ProfileRecord> {
        match self.rpc.fetch_record(target).await {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Could not re-read {} after conflict: {}", target, e);
                None
            }
        }
    }
}
