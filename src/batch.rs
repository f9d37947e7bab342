use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::conflict::ResolutionStrategy;
use crate::events::{EventBus, EventType, ProgressEvent, ProgressListener, lock};
use crate::pipeline::{FileProcessingResult, ProcessingPipeline};
use crate::services::VersionControl;

pub const DEFAULT_COMMIT_MESSAGE: &str = "docs: regenerate specs";

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub custom_vars: BTreeMap<String, String>,
    /// Applied to every conflict; `None` uses each conflict type's default.
    pub conflict_strategy: Option<ResolutionStrategy>,
    pub force_regenerate: bool,
    pub max_files: Option<usize>,
    /// Filter unchanged files up front instead of inside the pipeline.
    pub changed_only: bool,
    pub auto_commit: bool,
    pub commit_message: String,
    /// Accepted for configuration compatibility. Files are always processed
    /// one after another.
    pub max_parallel: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            custom_vars: BTreeMap::new(),
            conflict_strategy: None,
            force_regenerate: false,
            max_files: None,
            changed_only: false,
            auto_commit: false,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            max_parallel: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProcessingResult {
    pub workflow_id: String,
    pub success: bool,
    pub total_files: Vec<PathBuf>,
    pub successful_files: Vec<PathBuf>,
    pub failed_files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub file_results: BTreeMap<PathBuf, FileProcessingResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub commit_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Percentage of all files, skipped ones included, that succeeded.
    pub success_rate: f64,
    pub duration_seconds: f64,
}

impl BatchProcessingResult {
    fn new(workflow_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            workflow_id,
            success: false,
            total_files: Vec::new(),
            successful_files: Vec::new(),
            failed_files: Vec::new(),
            skipped_files: Vec::new(),
            file_results: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            commit_id: None,
            start_time,
            end_time: start_time,
        }
    }

    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time)
            .to_std()
            .unwrap_or_default()
    }

    pub fn summary(&self) -> BatchSummary {
        let total = self.total_files.len();
        let successful = self.successful_files.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        };

        BatchSummary {
            total,
            successful,
            failed: self.failed_files.len(),
            skipped: self.skipped_files.len(),
            success_rate,
            duration_seconds: self.duration().as_secs_f64(),
        }
    }
}

pub struct BatchOrchestrator {
    pipeline: ProcessingPipeline,
    vcs: Option<Box<dyn VersionControl>>,
    bus: Arc<EventBus>,
}

impl BatchOrchestrator {
    pub fn new(pipeline: ProcessingPipeline) -> Self {
        let bus = Arc::clone(pipeline.bus());
        Self {
            pipeline,
            vcs: None,
            bus,
        }
    }

    pub fn with_vcs(mut self, vcs: impl VersionControl + 'static) -> Self {
        self.vcs = Some(Box::new(vcs));
        self
    }

    pub fn pipeline(&self) -> &ProcessingPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut ProcessingPipeline {
        &mut self.pipeline
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn process_files(&mut self, files: &[PathBuf], options: &BatchOptions) -> BatchProcessingResult {
        let mut result = BatchProcessingResult::new(workflow_id(), Utc::now());

        if options.max_parallel > 1 {
            debug!(
                "max_parallel={} requested; processing sequentially",
                options.max_parallel
            );
        }

        let mut candidates = files.to_vec();
        if let Some(limit) = options.max_files {
            candidates.truncate(limit);
        }
        let total = candidates.len();
        result.total_files = candidates.clone();

        self.bus.emit(
            ProgressEvent::new(EventType::BatchStarted)
                .counts(0, total)
                .meta("workflow_id", result.workflow_id.as_str()),
        );

        let to_process = if options.changed_only && !options.force_regenerate {
            let needing: HashSet<PathBuf> = self
                .pipeline
                .detector_mut()
                .files_needing_processing(&candidates, false)
                .into_iter()
                .collect();

            let (changed, unchanged): (Vec<_>, Vec<_>) =
                candidates.into_iter().partition(|p| needing.contains(p));
            for path in unchanged {
                self.bus.emit(
                    ProgressEvent::new(EventType::FileSkipped)
                        .file(&path)
                        .message("unchanged"),
                );
                result.skipped_files.push(path);
            }
            changed
        } else {
            candidates
        };

        for path in to_process {
            let processed = result.successful_files.len()
                + result.failed_files.len()
                + result.skipped_files.len();
            self.bus.emit(
                ProgressEvent::new(EventType::FileStarted)
                    .file(&path)
                    .counts(processed, total),
            );

            let file_result = self.pipeline.process_file(
                &path,
                &options.custom_vars,
                options.conflict_strategy,
                options.force_regenerate,
            );

            if !file_result.success {
                result.errors.extend(
                    file_result
                        .errors
                        .iter()
                        .map(|e| format!("{}: {e}", path.display())),
                );
                result.failed_files.push(path.clone());
            } else if file_result.skipped {
                result.skipped_files.push(path.clone());
            } else {
                result.successful_files.push(path.clone());
            }
            result.file_results.insert(path, file_result);
        }

        if let Err(e) = self.pipeline.detector_mut().save() {
            warn!("cache not persisted: {e}");
            result.warnings.push(format!("cache not persisted: {e}"));
        }

        if options.auto_commit {
            self.commit(&mut result, &options.commit_message);
        }

        result.end_time = Utc::now();
        result.success = result.errors.is_empty();

        let summary = result.summary();
        info!(
            "batch {}: {} succeeded, {} failed, {} skipped in {:.2}s",
            result.workflow_id,
            summary.successful,
            summary.failed,
            summary.skipped,
            summary.duration_seconds
        );

        self.bus.emit(
            ProgressEvent::new(EventType::BatchCompleted)
                .counts(total, total)
                .meta("workflow_id", result.workflow_id.as_str())
                .meta("success", result.success)
                .meta("successful", summary.successful)
                .meta("failed", summary.failed)
                .meta("skipped", summary.skipped),
        );

        result
    }

    /// Failures here never fail the batch; they become warnings.
    fn commit(&mut self, result: &mut BatchProcessingResult, message: &str) {
        let generated: Vec<PathBuf> = result
            .successful_files
            .iter()
            .filter_map(|path| result.file_results.get(path))
            .flat_map(|r| r.generated_files.values().cloned())
            .collect();

        if generated.is_empty() {
            debug!("nothing generated; skipping commit");
            return;
        }

        let Some(vcs) = self.vcs.as_ref() else {
            result
                .warnings
                .push("auto-commit requested but no version control is configured".to_string());
            return;
        };

        let outcome = vcs
            .add_files(&generated)
            .and_then(|()| vcs.commit(message));

        match outcome {
            Ok(commit_id) => {
                info!("committed {} file(s) as {commit_id}", generated.len());
                self.bus.emit(
                    ProgressEvent::new(EventType::CommitCreated)
                        .message(message)
                        .meta("commit_id", commit_id.as_str())
                        .meta("files", generated.len()),
                );
                result.commit_id = Some(commit_id);
            }
            Err(e) => {
                warn!("auto-commit failed: {e:#}");
                result.warnings.push(format!("auto-commit failed: {e:#}"));
            }
        }
    }
}

fn workflow_id() -> String {
    format!("batch-{}", Utc::now().format("%Y%m%d-%H%M%S%3f"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub finished: bool,
    pub elapsed_seconds: f64,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            if self.finished { 1.0 } else { 0.0 }
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    snapshot: ProgressSnapshot,
    started: Option<Instant>,
    finished: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = lock(&self.state);
        let mut snapshot = state.snapshot.clone();
        if let Some(started) = state.started {
            let end = state.finished.unwrap_or_else(Instant::now);
            snapshot.elapsed_seconds = end.duration_since(started).as_secs_f64();
        }
        snapshot
    }
}

impl ProgressListener for ProgressTracker {
    fn on_event(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        match event.event_type {
            EventType::BatchStarted => {
                *state = TrackerState {
                    snapshot: ProgressSnapshot {
                        total: event.total.unwrap_or_default(),
                        ..ProgressSnapshot::default()
                    },
                    started: Some(Instant::now()),
                    finished: None,
                };
            }
            EventType::FileCompleted => {
                state.snapshot.processed += 1;
                state.snapshot.successful += 1;
            }
            EventType::FileFailed => {
                state.snapshot.processed += 1;
                state.snapshot.failed += 1;
            }
            EventType::FileSkipped => {
                state.snapshot.processed += 1;
                state.snapshot.skipped += 1;
            }
            EventType::BatchCompleted => {
                state.snapshot.finished = true;
                state.finished = Some(Instant::now());
            }
            EventType::FileStarted
            | EventType::StageUpdate
            | EventType::ConflictDetected
            | EventType::ConflictResolved
            | EventType::CommitCreated => {}
        }
        Ok(())
    }
}
