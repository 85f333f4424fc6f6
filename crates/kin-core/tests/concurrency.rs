//! Concurrent writers against one record.
//!
//! Guarantees exercised here:
//! - Versions only grow, by exactly one per applied write.
//! - Of N writers submitting against the same version, exactly one applies.
//! - A conflict carries the version to re-derive from, and resubmitting
//!   against it succeeds.
//! - Conflicts are never retried automatically.

use kin_core::prelude::*;
use kin_record::ProfileField;
use kin_test_utils::{
    sample_record, ConflictSignal, InMemoryBackend, InMemoryStorage, StaticAuthorizer,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn editor_over(backend: Arc<InMemoryBackend>) -> ProfileEditor {
    let collaborators = Collaborators::new(
        backend.clone(),
        backend,
        Arc::new(StaticAuthorizer::new(AccessMode::Direct)),
        Arc::new(InMemoryStorage::new()),
    );
    ProfileEditor::new(EditorConfig::new(), collaborators)
}

fn edit(actor: &str, expected: u64, name: &str) -> EditRequest {
    EditRequest::new(ActorId::new(actor), RecordId::new("p1"), Version::new(expected))
        .with_patch(FieldPatch::new().name(name))
}

/// Two editors open the record at v3; A saves first.
///
/// A gets `Applied{4}`. B gets `Conflict{4}` with nothing written, and after
/// re-deriving against 4 B's save lands at 5.
#[tokio::test]
async fn second_writer_conflicts_then_resubmits() {
    let backend = Arc::new(InMemoryBackend::new().with_record(sample_record("p1", 3)));
    let editor = editor_over(backend.clone());

    let a = editor.edit(edit("a", 3, "From A")).await.unwrap();
    assert_eq!(a.new_version(), Some(Version::new(4)));

    let err = editor.edit(edit("b", 3, "From B")).await.unwrap_err();
    match &err {
        EditError::Conflict {
            current_version,
            snapshot,
        } => {
            assert_eq!(*current_version, Version::new(4));
            let snapshot = snapshot.as_ref().expect("snapshot fetched on conflict");
            assert_eq!(snapshot.get_str(&ProfileField::Name), Some("From A"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(err.requires_reload());
    assert_eq!(err.effect(), SideEffect::Nothing);

    let stored = backend.record(&RecordId::new("p1")).unwrap();
    assert_eq!(stored.get_str(&ProfileField::Name), Some("From A"));

    let b = editor.edit(edit("b", 4, "From B")).await.unwrap();
    assert_eq!(b.new_version(), Some(Version::new(5)));
}

/// Conflicts are not retried: one CAS call per submission.
#[tokio::test]
async fn conflict_costs_a_single_write_attempt() {
    let backend = Arc::new(InMemoryBackend::new().with_record(sample_record("p1", 7)));
    let editor = editor_over(backend.clone());

    let err = editor.edit(edit("a", 6, "Stale")).await.unwrap_err();
    assert!(matches!(err, EditError::Conflict { .. }));
    assert_eq!(backend.cas_calls(), 1);
}

/// Legacy backends signal staleness only through the message text.
#[tokio::test]
async fn message_only_conflict_is_still_a_conflict() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_record(sample_record("p1", 3))
            .with_conflict_signal(ConflictSignal::MessageOnly),
    );
    let editor = editor_over(backend.clone());

    let err = editor.edit(edit("a", 2, "Late")).await.unwrap_err();
    assert!(matches!(
        err,
        EditError::Conflict {
            current_version,
            ..
        } if current_version == Version::new(3)
    ));
}

/// Exactly one of several simultaneous writers wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_writers_have_one_winner() {
    let backend = Arc::new(InMemoryBackend::new().with_record(sample_record("p1", 3)));
    let editor = Arc::new(editor_over(backend.clone()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let editor = Arc::clone(&editor);
            tokio::spawn(
                async move { editor.edit(edit(&format!("w{i}"), 3, &format!("W{i}"))).await },
            )
        })
        .collect();

    let mut applied = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                assert_eq!(outcome.new_version(), Some(Version::new(4)));
                applied += 1;
            }
            Err(EditError::Conflict { current_version, .. }) => {
                assert_eq!(current_version, Version::new(4));
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(backend.version(&RecordId::new("p1")), Some(Version::new(4)));
}

/// A write whose response is lost lands once; the retry's conflict is not
/// reported as another writer winning.
#[tokio::test(start_paused = true)]
async fn lost_response_is_reported_as_unknown() {
    let backend = Arc::new(InMemoryBackend::new().with_record(sample_record("p1", 3)));
    let editor = editor_over(backend.clone());
    backend.lose_next_ack();

    let err = editor.edit(edit("a", 3, "Once")).await.unwrap_err();
    assert!(matches!(err, EditError::Transport { retryable: false }));
    assert_eq!(backend.version(&RecordId::new("p1")), Some(Version::new(4)));
    assert_eq!(backend.cas_calls(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any schedule of stale and fresh writes keeps versions strictly
    /// increasing by one per applied write.
    #[test]
    fn versions_grow_by_one_per_applied_write(
        stale in proptest::collection::vec(any::<bool>(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let backend = Arc::new(InMemoryBackend::new().with_record(sample_record("p1", 1)));
            let editor = editor_over(backend.clone());
            let mut observed = Version::new(1);

            for (i, use_stale) in stale.iter().enumerate() {
                let expected = if *use_stale && observed.get() > 1 {
                    Version::new(observed.get() - 1)
                } else {
                    observed
                };
                let before = backend.version(&RecordId::new("p1")).unwrap();

                match editor.edit(edit("p", expected.get(), &format!("n{i}"))).await {
                    Ok(outcome) => {
                        let new_version = outcome.new_version().unwrap();
                        prop_assert_eq!(new_version, before.next());
                        observed = new_version;
                    }
                    Err(EditError::Conflict { current_version, .. }) => {
                        prop_assert_eq!(current_version, before);
                        prop_assert_eq!(backend.version(&RecordId::new("p1")), Some(before));
                        observed = current_version;
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
            }
            Ok(())
        })?;
    }
}
