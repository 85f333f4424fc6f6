//! In-memory compare-and-swap backend

use async_trait::async_trait;
use dashmap::DashSet;
use kin_mutation::{
    CasAck, MutationRpc, RpcError, Suggestion, SuggestionSink, PERMISSION_DENIED_CODE,
    VERSION_CONFLICT_CODE,
};
use kin_record::{MutationRequest, ProfileRecord, RecordId, SuggestionId, Version};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How the backend signals a stale expected version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSignal {
    /// Reserved code, with the stored version attached
    Coded,
    /// Reserved code only
    CodedWithoutVersion,
    /// Legacy: message text only
    MessageOnly,
}

/// Authoritative record store with an atomic check-then-set
#[derive(Debug)]
pub struct InMemoryBackend {
    records: Mutex<HashMap<RecordId, ProfileRecord>>,
    suggestions: Mutex<Vec<(SuggestionId, Suggestion)>>,
    denied: DashSet<RecordId>,
    faults: Mutex<VecDeque<RpcError>>,
    conflict_signal: ConflictSignal,
    explicit_ack: bool,
    lose_next_ack: AtomicBool,
    deny_after_lost_ack: AtomicBool,
    fail_fetches: AtomicBool,
    cas_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    propose_calls: AtomicUsize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            suggestions: Mutex::new(Vec::new()),
            denied: DashSet::new(),
            faults: Mutex::new(VecDeque::new()),
            conflict_signal: ConflictSignal::Coded,
            explicit_ack: false,
            lose_next_ack: AtomicBool::new(false),
            deny_after_lost_ack: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            cas_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            propose_calls: AtomicUsize::new(0),
        }
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_record(self, record: ProfileRecord) -> Self {
        self.insert(record);
        self
    }

    #[must_use]
    pub fn with_conflict_signal(mut self, signal: ConflictSignal) -> Self {
        self.conflict_signal = signal;
        self
    }

    /// Answer `{ newVersion }` instead of `{}`
    #[must_use]
    pub fn with_explicit_ack(mut self) -> Self {
        self.explicit_ack = true;
        self
    }

    pub fn insert(&self, record: ProfileRecord) {
        self.records.lock().insert(record.id.clone(), record);
    }

    #[must_use]
    pub fn record(&self, id: &RecordId) -> Option<ProfileRecord> {
        self.records.lock().get(id).cloned()
    }

    #[must_use]
    pub fn version(&self, id: &RecordId) -> Option<Version> {
        self.records.lock().get(id).map(|r| r.version)
    }

    /// Refuse every write to `id` with the permission code
    pub fn deny_writes(&self, id: RecordId) {
        self.denied.insert(id);
    }

    /// Fail the next compare-and-swap with `error`, before touching state
    pub fn fail_next_cas(&self, error: RpcError) {
        self.faults.lock().push_back(error);
    }

    /// Apply the next write but report a transport failure
    pub fn lose_next_ack(&self) {
        self.lose_next_ack.store(true, Ordering::SeqCst);
    }

    /// Once a lost ack has been sent, refuse further writes to that record
    pub fn deny_after_lost_ack(&self) {
        self.deny_after_lost_ack.store(true, Ordering::SeqCst);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn cas_calls(&self) -> usize {
        self.cas_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn propose_calls(&self) -> usize {
        self.propose_calls.load(Ordering::SeqCst)
    }

    /// Every network call the backend has served
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.cas_calls() + self.fetch_calls() + self.propose_calls()
    }

    #[must_use]
    pub fn suggestions(&self) -> Vec<Suggestion> {
        self.suggestions.lock().iter().map(|(_, s)| s.clone()).collect()
    }

    fn conflict_error(&self, expected: Version, current: Version) -> RpcError {
        match self.conflict_signal {
            ConflictSignal::Coded => RpcError::coded(VERSION_CONFLICT_CODE, "version conflict")
                .with_current_version(current),
            ConflictSignal::CodedWithoutVersion => {
                RpcError::coded(VERSION_CONFLICT_CODE, "version conflict")
            }
            ConflictSignal::MessageOnly => RpcError::message_only(format!(
                "stale version: expected {expected}, record is at {current}"
            )),
        }
    }
}

#[async_trait]
impl MutationRpc for InMemoryBackend {
    async fn compare_and_swap(&self, request: &MutationRequest) -> Result<CasAck, RpcError> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(fault) = self.faults.lock().pop_front() {
            return Err(fault);
        }
        let target = request.target_id();
        if self.denied.contains(target) {
            return Err(RpcError::coded(
                PERMISSION_DENIED_CODE,
                "permission denied for table profiles",
            ));
        }

        let new_version = {
            let mut records = self.records.lock();
            let stored = records
                .get_mut(target)
                .ok_or_else(|| RpcError::NotFound(target.clone()))?;
            if stored.version != request.expected_version() {
                return Err(self.conflict_error(request.expected_version(), stored.version));
            }
            *stored = stored.apply(request.patch());
            stored.version
        };

        if self.lose_next_ack.swap(false, Ordering::SeqCst) {
            if self.deny_after_lost_ack.swap(false, Ordering::SeqCst) {
                self.denied.insert(target.clone());
            }
            return Err(RpcError::transport("connection reset after write", true));
        }
        Ok(if self.explicit_ack {
            CasAck::explicit(new_version)
        } else {
            CasAck::default()
        })
    }

    async fn fetch_record(&self, id: &RecordId) -> Result<ProfileRecord, RpcError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(RpcError::transport("read timed out", true));
        }
        self.record(id).ok_or_else(|| RpcError::NotFound(id.clone()))
    }
}

#[async_trait]
impl SuggestionSink for InMemoryBackend {
    async fn propose(&self, suggestion: &Suggestion) -> Result<SuggestionId, RpcError> {
        self.propose_calls.fetch_add(1, Ordering::SeqCst);
        if !self.records.lock().contains_key(&suggestion.target_id) {
            return Err(RpcError::NotFound(suggestion.target_id.clone()));
        }
        let id = SuggestionId::new();
        self.suggestions.lock().push((id, suggestion.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kin_record::FieldPatch;

    fn request(expected: u64) -> MutationRequest {
        MutationRequest::new(
            RecordId::new("p1"),
            Version::new(expected),
            FieldPatch::new().name("X"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stale_write_changes_nothing() {
        let backend = InMemoryBackend::new()
            .with_record(ProfileRecord::new(RecordId::new("p1")).at_version(Version::new(3)));

        let err = backend.compare_and_swap(&request(2)).await.unwrap_err();
        assert_eq!(
            err,
            RpcError::coded(VERSION_CONFLICT_CODE, "version conflict")
                .with_current_version(Version::new(3))
        );
        assert_eq!(backend.version(&RecordId::new("p1")), Some(Version::new(3)));
    }

    #[tokio::test]
    async fn lost_ack_still_applies() {
        let backend = InMemoryBackend::new()
            .with_record(ProfileRecord::new(RecordId::new("p1")).at_version(Version::new(3)));
        backend.lose_next_ack();

        assert!(backend.compare_and_swap(&request(3)).await.is_err());
        assert_eq!(backend.version(&RecordId::new("p1")), Some(Version::new(4)));
    }

    #[tokio::test]
    async fn writes_are_denied_after_lost_ack() {
        let backend = InMemoryBackend::new()
            .with_record(ProfileRecord::new(RecordId::new("p1")).at_version(Version::new(3)));
        backend.lose_next_ack();
        backend.deny_after_lost_ack();

        assert!(backend.compare_and_swap(&request(3)).await.is_err());
        let err = backend.compare_and_swap(&request(4)).await.unwrap_err();
        assert_eq!(
            err,
            RpcError::coded(PERMISSION_DENIED_CODE, "permission denied for table profiles")
        );
        assert_eq!(backend.version(&RecordId::new("p1")), Some(Version::new(4)));
    }
}
