//! Scenario tests for the index-overwrite protocol.

use super::{assistant_spec, catalog_batch, catalog_v2, fast_poll};
use crate::catalog;
use crate::coordinator::{IndexOverwriteCoordinator, OverwriteWarning};
use crate::ingest::ContentBatch;
use crate::poll::PollPolicy;
use crate::progress::{OverwritePhase, ProgressEvent, ProgressReporter};
use crate::query::QueryRunner;
use crate::session::SessionState;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vsctl_api::{FailurePlan, InMemoryBackend};
use vsctl_core::AppError;

fn coordinator(backend: &InMemoryBackend) -> IndexOverwriteCoordinator<'_> {
    IndexOverwriteCoordinator::new(backend, backend).with_poll(fast_poll())
}

fn seed_catalog_v1(backend: &InMemoryBackend) -> String {
    backend.seed_index(
        "catalog-v1",
        &[
            "{\"sku\":\"OLD-1\",\"colour\":\"grey\"}",
            "{\"sku\":\"OLD-2\",\"colour\":\"black\"}",
            "{\"sku\":\"OLD-3\",\"colour\":\"white\"}",
        ],
    )
}

fn position(calls: &[String], call: &str) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("missing call {}", call))
}

#[tokio::test]
async fn test_catalog_v1_is_replaced_by_five_rows() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let old_documents = backend.document_ids(&old_id).unwrap();
    let batch = catalog_v2();
    let mut session = SessionState::new();
    session.select(old_id.clone());

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &batch)
        .await
        .unwrap();

    assert_ne!(report.new_index_id, old_id);
    assert_eq!(report.previous_index_id, old_id);
    assert_eq!(report.name.as_deref(), Some("catalog-v1"));
    assert_eq!(report.documents_removed, 3);
    assert_eq!(report.rows, 5);
    assert!(report.warnings.is_empty());
    assert!(report.finished_at >= report.started_at);

    // old index and its blobs are gone
    assert!(!backend.index_exists(&old_id));
    for document in &old_documents {
        assert!(!backend.blob_exists(document));
    }

    // the name resolves to the new index holding exactly the new rows
    let resolved = catalog::resolve_name(&backend, "catalog-v1").await.unwrap();
    assert_eq!(resolved.id, report.new_index_id);
    assert_eq!(resolved.document_count, 1);
    let contents = backend.index_contents(&report.new_index_id).unwrap();
    assert_eq!(contents, vec![batch.to_json_lines().unwrap()]);
    assert_eq!(contents[0].lines().count(), 5);
    assert!(!contents[0].contains("OLD-"));

    let uploaded = report.uploaded_document.unwrap();
    assert_eq!(
        backend.blob_file_name(&uploaded).as_deref(),
        Some("catalog-v1.txt")
    );
    assert_eq!(session.selected_index(), Some(report.new_index_id.as_str()));
}

#[tokio::test]
async fn test_detach_precedes_blob_deletion_and_index_deletion() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let documents = backend.document_ids(&old_id).unwrap();
    let mut session = SessionState::new();

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap();

    let calls = backend.calls();
    let delete_index = position(&calls, &format!("delete_index:{}", old_id));
    let create_index = position(&calls, "create_index:catalog-v1");
    let upload = position(&calls, "upload_blob:catalog-v1.txt");

    for document in &documents {
        let detach = position(&calls, &format!("detach:{}:{}", old_id, document));
        let delete_blob = position(&calls, &format!("delete_blob:{}", document));
        assert!(detach < delete_blob);
        assert!(delete_blob < delete_index);
    }
    assert!(delete_index < create_index);
    assert!(create_index < upload);
    assert!(calls
        .last()
        .unwrap()
        .starts_with(&format!("attach:{}:", report.new_index_id)));
}

#[tokio::test]
async fn test_creation_failure_leaves_no_index_under_the_name() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    backend.set_failures(FailurePlan {
        create_index: true,
        ..Default::default()
    });
    let mut session = SessionState::new();
    session.select(old_id.clone());

    let err = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap_err();

    match &err {
        AppError::IndexCreationFailed {
            name,
            previous_index_id,
            ..
        } => {
            assert_eq!(name, "catalog-v1");
            assert_eq!(previous_index_id, &old_id);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("NO LONGER EXISTS"));
    assert_eq!(session.selected_index(), None);

    let lookup = catalog::resolve_name(&backend, "catalog-v1").await;
    assert!(matches!(lookup, Err(AppError::IndexNotFound(_))));

    // re-running against the dead id is a plain not-found
    backend.set_failures(FailurePlan::default());
    let rerun = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await;
    assert!(matches!(rerun, Err(AppError::IndexNotFound(_))));
}

#[tokio::test]
async fn test_overwrite_twice_is_idempotent_in_content() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let batch = catalog_v2();
    let mut session = SessionState::new();
    let coordinator = coordinator(&backend);

    let first = coordinator.overwrite(&mut session, &old_id, &batch).await.unwrap();
    let second = coordinator
        .overwrite(&mut session, &first.new_index_id, &batch)
        .await
        .unwrap();

    assert_ne!(first.new_index_id, second.new_index_id);
    assert_eq!(second.documents_removed, 1);
    assert_eq!(
        backend.index_contents(&second.new_index_id).unwrap(),
        vec![batch.to_json_lines().unwrap()]
    );
    assert!(!backend.index_exists(&first.new_index_id));
    assert_eq!(backend.blob_count(), 1);
}

#[tokio::test]
async fn test_cached_handle_follows_the_new_index() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let runner = QueryRunner::new(&backend, assistant_spec()).with_poll(fast_poll());
    let mut session = SessionState::new();

    let before = runner.query(&mut session, &old_id, "which colour is grey?").await.unwrap();
    assert!(before.contains("OLD-1"));
    let assistant_id = session.assistant().unwrap().assistant_id.clone();

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap();

    assert!(session.is_bound_to(&report.new_index_id));
    assert_eq!(
        backend.assistant_binding(&assistant_id),
        Some(report.new_index_id.clone())
    );

    let after = runner
        .query(&mut session, &report.new_index_id, "anything teal or grey?")
        .await
        .unwrap();
    assert!(after.contains("A-200"));
    assert!(!after.contains("OLD-"));
    assert_eq!(backend.assistant_count(), 1);
}

#[tokio::test]
async fn test_selection_of_another_index_is_left_alone() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let other_id = backend.seed_index("pricing", &["P-1 9.99"]);
    let mut session = SessionState::new();
    session.select(other_id.clone());

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap();

    assert_ne!(report.new_index_id, old_id);
    assert_eq!(session.selected_index(), Some(other_id.as_str()));
}

#[tokio::test]
async fn test_dropped_overwrite_leaves_the_last_completed_step() {
    let backend = InMemoryBackend::new().with_poll_delays(u32::MAX, 1);
    let old_id = seed_catalog_v1(&backend);
    let runner = QueryRunner::new(&backend, assistant_spec()).with_poll(fast_poll());
    let mut session = SessionState::new();
    session.select(old_id.clone());
    runner.query(&mut session, &old_id, "grey?").await.unwrap();

    // ingestion never finishes, so the deadline drops the future mid-poll
    let patient = IndexOverwriteCoordinator::new(&backend, &backend).with_poll(PollPolicy::new(
        Duration::from_millis(1),
        Duration::from_secs(60),
    ));
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        patient.overwrite(&mut session, &old_id, &catalog_v2()),
    )
    .await;
    assert!(outcome.is_err());

    // remote state: old index gone, new one created with the pending upload
    assert!(!backend.index_exists(&old_id));
    let recreated = catalog::resolve_name(&backend, "catalog-v1").await.unwrap();
    assert_ne!(recreated.id, old_id);
    assert!(backend.index_exists(&recreated.id));
    assert_eq!(recreated.document_count, 1);
    assert!(!backend.calls().iter().any(|c| c.starts_with("bind:")));

    // local state: untouched, since steps 6 and 7 never completed
    assert_eq!(session.selected_index(), Some(old_id.as_str()));
    assert!(session.is_bound_to(&old_id));

    // the session still works: retry the upload and query the new index
    let backend = backend.clone().with_poll_delays(1, 1);
    session.select(recreated.id.clone());
    let report = coordinator(&backend)
        .upload(&recreated.id, &catalog_v2())
        .await
        .unwrap();
    assert_eq!(report.rows, 5);

    let answer = runner
        .query(&mut session, &recreated.id, "crimson?")
        .await
        .unwrap();
    assert!(answer.contains("A-100"));
    assert!(session.is_bound_to(&recreated.id));
}

#[tokio::test]
async fn test_empty_batch_yields_empty_index() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let mut session = SessionState::new();

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &ContentBatch::default())
        .await
        .unwrap();

    assert_eq!(report.rows, 0);
    assert_eq!(report.uploaded_document, None);
    assert!(backend.document_ids(&report.new_index_id).unwrap().is_empty());
    assert!(!backend.calls().iter().any(|c| c.starts_with("upload_blob:")));
    assert_eq!(backend.blob_count(), 0);
}

#[tokio::test]
async fn test_blob_deletion_failure_is_a_warning() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let stuck = backend.document_ids(&old_id).unwrap()[1].clone();
    backend.set_failures(FailurePlan {
        delete_blob: HashSet::from([stuck.clone()]),
        ..Default::default()
    });
    let mut session = SessionState::new();

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap();

    assert_eq!(report.documents_removed, 3);
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        &report.warnings[0],
        OverwriteWarning::OrphanedDocument { file_id, stage, .. }
            if file_id == &stuck && stage == "delete-blob"
    ));
    assert!(backend.blob_exists(&stuck));
}

#[tokio::test]
async fn test_detach_failure_keeps_the_blob() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let stuck = backend.document_ids(&old_id).unwrap()[0].clone();
    backend.set_failures(FailurePlan {
        detach: HashSet::from([stuck.clone()]),
        ..Default::default()
    });
    let mut session = SessionState::new();

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap();

    assert_eq!(report.documents_removed, 2);
    assert!(matches!(
        &report.warnings[0],
        OverwriteWarning::OrphanedDocument { file_id, stage, .. }
            if file_id == &stuck && stage == "detach"
    ));
    assert!(!backend.calls().contains(&format!("delete_blob:{}", stuck)));
    assert!(backend.blob_exists(&stuck));
}

#[tokio::test]
async fn test_deletion_failure_stops_before_recreating() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    backend.set_failures(FailurePlan {
        delete_index: true,
        ..Default::default()
    });
    let mut session = SessionState::new();
    session.select(old_id.clone());

    let result = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await;

    assert!(matches!(
        result,
        Err(AppError::IndexDeletionFailed { ref index_id, .. }) if index_id == &old_id
    ));
    assert!(backend.index_exists(&old_id));
    assert!(backend.document_ids(&old_id).unwrap().is_empty());
    assert!(!backend.calls().iter().any(|c| c.starts_with("create_index:")));
    assert_eq!(session.selected_index(), Some(old_id.as_str()));
}

#[tokio::test]
async fn test_ingestion_failure_then_upload_recovers() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    backend.set_failures(FailurePlan {
        ingestion: Some("unsupported file".to_string()),
        ..Default::default()
    });
    let mut session = SessionState::new();
    let coordinator = coordinator(&backend);

    let err = coordinator
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap_err();

    let new_id = match &err {
        AppError::IngestionFailed { index_id, reason } => {
            assert_eq!(reason, "unsupported file");
            index_id.clone()
        }
        other => panic!("unexpected error: {}", other),
    };
    assert!(err.to_string().contains("exists but is empty"));
    assert!(backend.index_exists(&new_id));
    assert!(backend.document_ids(&new_id).unwrap().is_empty());
    assert_eq!(backend.blob_count(), 0);
    assert_eq!(session.selected_index(), Some(new_id.as_str()));

    backend.set_failures(FailurePlan::default());
    let report = coordinator.upload(&new_id, &catalog_v2()).await.unwrap();
    assert_eq!(report.index_id, new_id);
    assert_eq!(report.rows, 5);
    assert_eq!(backend.index_contents(&new_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_attach_failure_deletes_the_uploaded_blob() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    backend.set_failures(FailurePlan {
        attach: true,
        ..Default::default()
    });
    let mut session = SessionState::new();

    let result = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await;

    assert!(matches!(result, Err(AppError::IngestionFailed { .. })));
    assert_eq!(backend.blob_count(), 0);
}

#[tokio::test]
async fn test_ingestion_timeout_is_ingestion_failure() {
    let backend = InMemoryBackend::new().with_poll_delays(u32::MAX, 1);
    let old_id = seed_catalog_v1(&backend);
    let mut session = SessionState::new();

    let result = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await;

    match result {
        Err(AppError::IngestionFailed { reason, .. }) => {
            assert!(reason.contains("did not finish"))
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.new_index_id)),
    }
}

#[tokio::test]
async fn test_rebind_failure_is_a_warning() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let runner = QueryRunner::new(&backend, assistant_spec()).with_poll(fast_poll());
    let mut session = SessionState::new();
    runner.query(&mut session, &old_id, "grey?").await.unwrap();
    backend.set_failures(FailurePlan {
        bind_assistant: true,
        ..Default::default()
    });

    let report = coordinator(&backend)
        .overwrite(&mut session, &old_id, &catalog_v2())
        .await
        .unwrap();

    assert!(matches!(
        report.warnings.as_slice(),
        [OverwriteWarning::HandleRebind { .. }]
    ));
    assert!(session.is_bound_to(&old_id));
}

#[tokio::test]
async fn test_progress_covers_every_phase() {
    let backend = InMemoryBackend::new();
    let old_id = seed_catalog_v1(&backend);
    let runner = QueryRunner::new(&backend, assistant_spec()).with_poll(fast_poll());
    let mut session = SessionState::new();
    runner.query(&mut session, &old_id, "grey?").await.unwrap();

    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = phases.clone();
    let reporter = ProgressReporter::new(Arc::new(move |event: ProgressEvent| {
        sink.lock().unwrap().push(event.phase);
    }));

    coordinator(&backend)
        .with_progress(reporter)
        .overwrite(&mut session, &old_id, &catalog_batch(&[("A-1", "red")]))
        .await
        .unwrap();

    let phases = phases.lock().unwrap();
    for phase in [
        OverwritePhase::Resolve,
        OverwritePhase::Enumerate,
        OverwritePhase::Cleanup,
        OverwritePhase::DeleteIndex,
        OverwritePhase::CreateIndex,
        OverwritePhase::Upload,
        OverwritePhase::Ingest,
        OverwritePhase::Rebind,
    ] {
        assert!(phases.contains(&phase), "missing {:?}", phase);
    }
    assert_eq!(phases.first(), Some(&OverwritePhase::Resolve));
    assert_eq!(phases.last(), Some(&OverwritePhase::Rebind));
}
