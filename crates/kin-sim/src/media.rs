//! Media commits under injected link and delete failures
//!
//! Each commit targets its own record. A link failure is injected as a
//! backend permission denial; a delete failure makes the compensating delete
//! fail. After every commit the outcome is checked against storage and the
//! record:
//! - linked: object stored and referenced
//! - rolled back: object gone, record untouched
//! - orphaned: object stored, unreferenced, present in the ledger
//!
//! At the end every stored object must be referenced or ledgered, and a
//! reconciliation pass must drain the ledger.

use kin_core::prelude::*;
use kin_media::CommitError;
use kin_mutation::{RpcError, PERMISSION_DENIED_CODE};
use kin_test_utils::{record_at, InMemoryBackend, InMemoryStorage, StaticAuthorizer};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Media run configuration
#[derive(Debug, Clone, Serialize)]
pub struct MediaConfig {
    pub seed: u64,
    /// Number of commits
    pub count: usize,
    /// Probability in `[0, 1]` that the link step is denied
    pub link_failure_rate: f64,
    /// Probability in `[0, 1]` that the compensating delete fails
    pub delete_failure_rate: f64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            count: 50,
            link_failure_rate: 0.3,
            delete_failure_rate: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaViolation {
    LinkedButMissing { record: RecordId, url: String },
    RolledBackButPresent { record: RecordId, url: String },
    /// The record references an object that is not stored
    DanglingReference { record: RecordId, url: String },
    OrphanNotLedgered { url: String },
    /// Stored object neither referenced nor ledgered
    Untracked { url: String },
    Unreconciled { remaining: usize },
    UnexpectedError { record: RecordId, error: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MediaStats {
    pub linked: usize,
    pub rolled_back: usize,
    pub orphaned: usize,
    pub reconciled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaReport {
    pub config: MediaConfig,
    pub stats: MediaStats,
    pub violations: Vec<MediaViolation>,
}

impl MediaReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Media Commit Report ===\n\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Commits: {}", self.config.count);
        let _ = writeln!(report, "Linked: {}", self.stats.linked);
        let _ = writeln!(report, "Rolled back: {}", self.stats.rolled_back);
        let _ = writeln!(report, "Orphaned: {}", self.stats.orphaned);
        let _ = writeln!(report, "Reconciled: {}", self.stats.reconciled);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {:?}", i + 1, v);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Run the media scenario
///
/// # Errors
/// Returns an error for out-of-range rates or if the source image cannot be written
pub async fn run_media(config: MediaConfig) -> anyhow::Result<MediaReport> {
    for (name, rate) in [
        ("link failure rate", config.link_failure_rate),
        ("delete failure rate", config.delete_failure_rate),
    ] {
        anyhow::ensure!((0.0..=1.0).contains(&rate), "{name} must be within [0, 1], got {rate}");
    }

    let dir = tempfile::tempdir()?;
    let source = dir.path().join("portrait.jpg");
    tokio::fs::write(&source, b"simulated portrait bytes").await?;

    let backend = Arc::new(InMemoryBackend::new());
    let storage = Arc::new(InMemoryStorage::new());
    let records: Vec<RecordId> = (0..config.count)
        .map(|i| RecordId::new(format!("person-{i}")))
        .collect();
    for id in &records {
        backend.insert(record_at(id.as_str(), 1));
    }

    let collaborators = Collaborators::new(
        backend.clone(),
        backend.clone(),
        Arc::new(StaticAuthorizer::new(AccessMode::Direct)),
        storage.clone(),
    );
    let editor = ProfileEditor::new(
        EditorConfig::new()
            .with_retry(1, Duration::ZERO)
            .with_cleanup_retry(1, Duration::ZERO),
        collaborators,
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut stats = MediaStats::default();
    let mut violations = Vec::new();

    for record in &records {
        if rng.gen_bool(config.link_failure_rate) {
            backend.fail_next_cas(RpcError::coded(PERMISSION_DENIED_CODE, "simulated denial"));
        }
        storage.set_fail_deletes(rng.gen_bool(config.delete_failure_rate));

        let request = EditRequest::new(ActorId::new("sim"), record.clone(), Version::INITIAL)
            .with_media(LocalMedia::original(&source));
        let result = editor.edit(request).await;
        storage.set_fail_deletes(false);

        check_commit(&editor, &backend, &storage, record, result, &mut stats, &mut violations);
    }

    check_tracked(&editor, &backend, &storage, &records, &mut violations);

    let summary = editor.orphans().reconcile(storage.as_ref()).await;
    stats.reconciled = summary.cleaned;
    if !editor.orphans().is_empty() {
        violations.push(MediaViolation::Unreconciled {
            remaining: editor.orphans().len(),
        });
    }

    tracing::info!(
        "Media run finished: {} linked, {} rolled back, {} orphaned, {} reconciled",
        stats.linked,
        stats.rolled_back,
        stats.orphaned,
        stats.reconciled
    );

    Ok(MediaReport {
        config,
        stats,
        violations,
    })
}

fn check_commit(
    editor: &ProfileEditor,
    backend: &InMemoryBackend,
    storage: &InMemoryStorage,
    record: &RecordId,
    result: Result<EditOutcome, EditError>,
    stats: &mut MediaStats,
    violations: &mut Vec<MediaViolation>,
) {
    let references = |url: &str| {
        backend
            .record(record)
            .is_some_and(|stored| stored.references(url))
    };

    match result {
        Ok(outcome) => {
            stats.linked += 1;
            let url = outcome
                .asset()
                .and_then(|asset| asset.remote_url.clone())
                .unwrap_or_default();
            if !storage.contains(&url) || !references(&url) {
                violations.push(MediaViolation::LinkedButMissing {
                    record: record.clone(),
                    url,
                });
            }
        }
        Err(EditError::Media(CommitError::RolledBack { asset, .. })) => {
            stats.rolled_back += 1;
            let url = asset.remote_url.clone().unwrap_or_default();
            if storage.contains(&url) || references(&url) {
                violations.push(MediaViolation::RolledBackButPresent {
                    record: record.clone(),
                    url,
                });
            }
        }
        Err(EditError::Media(CommitError::Orphaned { report, .. })) => {
            stats.orphaned += 1;
            let url = report.remote_url.clone();
            if references(&url) {
                violations.push(MediaViolation::DanglingReference {
                    record: record.clone(),
                    url: url.clone(),
                });
            }
            if !editor.orphans().snapshot().iter().any(|o| o.remote_url == url) {
                violations.push(MediaViolation::OrphanNotLedgered { url });
            }
        }
        Err(e) => violations.push(MediaViolation::UnexpectedError {
            record: record.clone(),
            error: e.to_string(),
        }),
    }
}

fn check_tracked(
    editor: &ProfileEditor,
    backend: &InMemoryBackend,
    storage: &InMemoryStorage,
    records: &[RecordId],
    violations: &mut Vec<MediaViolation>,
) {
    let ledgered: Vec<String> = editor
        .orphans()
        .snapshot()
        .into_iter()
        .map(|o| o.remote_url)
        .collect();

    for url in storage.urls() {
        let referenced = records
            .iter()
            .filter_map(|id| backend.record(id))
            .any(|record| record.references(&url));
        if !referenced && !ledgered.contains(&url) {
            violations.push(MediaViolation::Untracked { url });
        }
    }

    for id in records {
        if let Some(url) = backend.record(id).and_then(|r| r.photo_url().map(str::to_string)) {
            if !storage.contains(&url) {
                violations.push(MediaViolation::DanglingReference {
                    record: id.clone(),
                    url,
                });
            }
        }
    }
}
