mod common;

use std::sync::Arc;

use common::{RecordingVcs, StubGenerator};
use pretty_assertions::assert_eq;
use respec::batch::{BatchOptions, BatchOrchestrator, ProgressTracker};
use respec::events::{EventBus, EventType};
use tempfile::TempDir;

#[test]
fn mixed_batch_tallies_outcomes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let a = common::write(root, "a.py", "a = 1\n");
    let b = common::write(root, "b.py", "b = 1\n");
    let c = common::write(root, "c.py", "c = 1\n");
    let d = common::write(root, "d.py", "d = 1\n");

    let generator =
        StubGenerator::new(root.join("specs")).failing_on("c.py", "Permission denied");
    let bus = Arc::new(EventBus::default());
    let tracker = Arc::new(ProgressTracker::new());
    bus.subscribe(tracker.clone());

    let mut pipeline = common::pipeline_with_bus(root, generator, Arc::clone(&bus));
    pipeline.detector_mut().update_cache(&d).unwrap();

    let mut orchestrator = BatchOrchestrator::new(pipeline);
    let files = vec![a.clone(), b.clone(), c.clone(), d.clone()];
    let result = orchestrator.process_files(&files, &BatchOptions::default());

    assert!(!result.success);
    assert_eq!(result.successful_files, vec![a, b]);
    assert_eq!(result.failed_files, vec![c.clone()]);
    assert_eq!(result.skipped_files, vec![d]);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("Permission denied"));
    assert!(result.errors[0].contains("c.py"));

    let summary = result.summary();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.success_rate, 50.0);

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.total, 4);
    assert_eq!(snapshot.processed, 4);
    assert_eq!(snapshot.successful, 2);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.skipped, 1);
    assert!(snapshot.finished);
    assert_eq!(snapshot.fraction(), 1.0);

    assert!(common::cache_path(root).exists());
}

#[test]
fn batch_events_bracket_the_run() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let a = common::write(root, "a.py", "a = 1\n");

    let bus = Arc::new(EventBus::default());
    let pipeline = common::pipeline_with_bus(
        root,
        StubGenerator::new(root.join("specs")),
        Arc::clone(&bus),
    );
    let result = BatchOrchestrator::new(pipeline).process_files(&[a], &BatchOptions::default());
    assert!(result.success);

    let history = bus.history();
    assert_eq!(history.first().map(|e| e.event_type), Some(EventType::BatchStarted));
    assert_eq!(history.last().map(|e| e.event_type), Some(EventType::BatchCompleted));
    assert_eq!(
        history.last().unwrap().metadata["workflow_id"],
        result.workflow_id.as_str()
    );
    assert!(
        history
            .iter()
            .any(|e| e.event_type == EventType::FileStarted)
    );
}

#[test]
fn max_files_truncates_input() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let files: Vec<_> = ["a.py", "b.py", "c.py"]
        .into_iter()
        .map(|name| common::write(root, name, name))
        .collect();

    let pipeline = common::pipeline(root, StubGenerator::new(root.join("specs")));
    let options = BatchOptions {
        max_files: Some(2),
        ..BatchOptions::default()
    };
    let result = BatchOrchestrator::new(pipeline).process_files(&files, &options);

    assert_eq!(result.total_files, files[..2].to_vec());
    assert_eq!(result.successful_files.len(), 2);
    assert!(!root.join("specs/c.py.md").exists());
}

#[test]
fn changed_only_filters_before_processing() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let fresh = common::write(root, "fresh.py", "1\n");
    let cached = common::write(root, "cached.py", "2\n");

    let bus = Arc::new(EventBus::default());
    let mut pipeline = common::pipeline_with_bus(
        root,
        StubGenerator::new(root.join("specs")),
        Arc::clone(&bus),
    );
    pipeline.detector_mut().update_cache(&cached).unwrap();

    let options = BatchOptions {
        changed_only: true,
        ..BatchOptions::default()
    };
    let result =
        BatchOrchestrator::new(pipeline).process_files(&[fresh.clone(), cached.clone()], &options);

    assert_eq!(result.successful_files, vec![fresh]);
    assert_eq!(result.skipped_files, vec![cached.clone()]);
    assert!(!result.file_results.contains_key(&cached));
}

#[test]
fn auto_commit_stages_generated_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let a = common::write(root, "a.py", "a = 1\n");
    let generator = StubGenerator::new(root.join("specs"));
    let target = generator.target("a.py");

    let vcs = RecordingVcs::default();
    let pipeline = common::pipeline(root, generator);
    let mut orchestrator = BatchOrchestrator::new(pipeline).with_vcs(vcs.clone());

    let options = BatchOptions {
        auto_commit: true,
        commit_message: "docs: refresh".to_string(),
        ..BatchOptions::default()
    };
    let result = orchestrator.process_files(&[a], &options);

    assert!(result.success);
    assert_eq!(result.commit_id.as_deref(), Some("abc0001"));
    assert_eq!(*vcs.added.lock().unwrap(), vec![target]);
    assert_eq!(*vcs.commits.lock().unwrap(), vec!["docs: refresh"]);
}

#[test]
fn commit_failure_is_only_a_warning() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let a = common::write(root, "a.py", "a = 1\n");

    let pipeline = common::pipeline(root, StubGenerator::new(root.join("specs")));
    let mut orchestrator = BatchOrchestrator::new(pipeline).with_vcs(RecordingVcs::failing());

    let options = BatchOptions {
        auto_commit: true,
        ..BatchOptions::default()
    };
    let result = orchestrator.process_files(&[a], &options);

    assert!(result.success);
    assert_eq!(result.commit_id, None);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].starts_with("auto-commit failed"));
}

#[test]
fn auto_commit_without_vcs_warns() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let a = common::write(root, "a.py", "a = 1\n");

    let pipeline = common::pipeline(root, StubGenerator::new(root.join("specs")));
    let options = BatchOptions {
        auto_commit: true,
        ..BatchOptions::default()
    };
    let result = BatchOrchestrator::new(pipeline).process_files(&[a], &options);

    assert!(result.success);
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn empty_batch_succeeds() {
    let dir = TempDir::new().unwrap();
    let pipeline = common::pipeline(dir.path(), StubGenerator::new(dir.path().join("specs")));

    let result = BatchOrchestrator::new(pipeline).process_files(&[], &BatchOptions::default());

    assert!(result.success);
    assert_eq!(result.summary().success_rate, 0.0);
}
