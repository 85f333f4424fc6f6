//! Concurrent writers racing on one record
//!
//! Every writer holds an [`EditSession`](kin_core::EditSession), submits until
//! it has landed `rounds` writes, and reloads whenever it loses a race.
//!
//! Invariants checked:
//! - no two applied writes report the same version
//! - each writer observes strictly increasing versions
//! - the final version equals the start version plus the applied count

use kin_core::prelude::*;
use kin_test_utils::{sample_record, InMemoryBackend, InMemoryStorage, StaticAuthorizer};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

const RECORD: &str = "race-target";

/// Race configuration
#[derive(Debug, Clone, Serialize)]
pub struct RaceConfig {
    /// Random seed for reproducible interleavings
    pub seed: u64,
    pub writers: usize,
    /// Applied writes each writer must land
    pub rounds: usize,
    pub start_version: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            writers: 4,
            rounds: 25,
            start_version: 1,
        }
    }
}

/// A broken invariant
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RaceViolation {
    DuplicateVersion { version: Version },
    NonMonotonic {
        writer: usize,
        previous: Version,
        next: Version,
    },
    FinalVersionMismatch { expected: Version, actual: Version },
    UnexpectedError { writer: usize, error: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RaceStats {
    pub applied: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceReport {
    pub config: RaceConfig,
    pub stats: RaceStats,
    pub final_version: Version,
    pub violations: Vec<RaceViolation>,
}

impl RaceReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Race Report ===\n\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Writers: {}", self.config.writers);
        let _ = writeln!(report, "Rounds per writer: {}", self.config.rounds);
        let _ = writeln!(report, "Applied: {}", self.stats.applied);
        let _ = writeln!(report, "Conflicts: {}", self.stats.conflicts);
        let _ = writeln!(
            report,
            "Version: {} -> {}",
            self.config.start_version, self.final_version
        );
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

#[derive(Debug, Default)]
struct WriterLog {
    applied: Vec<Version>,
    conflicts: usize,
    error: Option<String>,
}

/// Run the race
///
/// # Errors
/// Returns an error if a writer task panics
pub async fn run_race(config: RaceConfig) -> anyhow::Result<RaceReport> {
    anyhow::ensure!(config.start_version >= 1, "start version must be at least 1");

    let backend = Arc::new(
        InMemoryBackend::new().with_record(sample_record(RECORD, config.start_version)),
    );
    let collaborators = Collaborators::new(
        backend.clone(),
        backend.clone(),
        Arc::new(StaticAuthorizer::new(AccessMode::Direct)),
        Arc::new(InMemoryStorage::new()),
    );
    let editor = Arc::new(ProfileEditor::new(EditorConfig::new(), collaborators));

    let handles: Vec<_> = (0..config.writers)
        .map(|index| {
            tokio::spawn(writer(
                Arc::clone(&editor),
                index,
                config.rounds,
                config.seed,
            ))
        })
        .collect();

    let mut logs = Vec::with_capacity(handles.len());
    for handle in handles {
        logs.push(handle.await?);
    }

    let final_version = backend
        .version(&RecordId::new(RECORD))
        .ok_or_else(|| anyhow::anyhow!("race record disappeared"))?;
    let (stats, violations) = check(&config, &logs, final_version);

    tracing::info!(
        "Race finished: {} applied, {} conflicts, {} violations",
        stats.applied,
        stats.conflicts,
        violations.len()
    );

    Ok(RaceReport {
        config,
        stats,
        final_version,
        violations,
    })
}

async fn writer(editor: Arc<ProfileEditor>, index: usize, rounds: usize, seed: u64) -> WriterLog {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
    let mut log = WriterLog::default();

    let actor = ActorId::new(format!("writer-{index}"));
    let mut session = match editor.open(actor, RecordId::new(RECORD)).await {
        Ok(session) => session,
        Err(e) => {
            log.error = Some(e.to_string());
            return log;
        }
    };

    while log.applied.len() < rounds {
        for _ in 0..rng.gen_range(0..3) {
            tokio::task::yield_now().await;
        }

        let patch = FieldPatch::new().name(format!("writer {index}, write {}", log.applied.len()));
        match session.submit(patch).await {
            Ok(outcome) => {
                if let Some(version) = outcome.new_version() {
                    log.applied.push(version);
                }
            }
            Err(e) if e.requires_reload() => {
                log.conflicts += 1;
                if let Err(e) = session.reload().await {
                    log.error = Some(e.to_string());
                    return log;
                }
            }
            Err(e) => {
                log.error = Some(e.to_string());
                return log;
            }
        }
    }

    tracing::debug!("Writer {} done after {} conflicts", index, log.conflicts);
    log
}

fn check(
    config: &RaceConfig,
    logs: &[WriterLog],
    final_version: Version,
) -> (RaceStats, Vec<RaceViolation>) {
    let mut stats = RaceStats::default();
    let mut violations = Vec::new();
    let mut seen = BTreeSet::new();

    for (writer, log) in logs.iter().enumerate() {
        stats.conflicts += log.conflicts;
        if let Some(error) = &log.error {
            violations.push(RaceViolation::UnexpectedError {
                writer,
                error: error.clone(),
            });
        }
        for pair in log.applied.windows(2) {
            if pair[1] <= pair[0] {
                violations.push(RaceViolation::NonMonotonic {
                    writer,
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        for version in &log.applied {
            stats.applied += 1;
            if !seen.insert(*version) {
                violations.push(RaceViolation::DuplicateVersion { version: *version });
            }
        }
    }

    let expected = Version::new(config.start_version + stats.applied as u64);
    if expected != final_version {
        violations.push(RaceViolation::FinalVersionMismatch {
            expected,
            actual: final_version,
        });
    }

    (stats, violations)
}
