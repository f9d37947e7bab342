use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::conflict::{ConflictInfo, ConflictResolver, ResolutionStrategy};
use crate::detect::ChangeDetector;
use crate::error::Error;
use crate::events::{EventBus, EventType, ProgressEvent};
use crate::services::{ContentGenerator, GeneratedFile, GenerationRequest};

const MAX_FILE_SIZE: u64 = 1024 * 1024;
const ESTIMATED_SECONDS_PER_FILE: f64 = 2.0;

pub const UNCHANGED_WARNING: &str = "file unchanged, skipped";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Init,
    ChangeCheck,
    ContentGeneration,
    ConflictHandling,
    CacheUpdate,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::ChangeCheck => "change_check",
            Stage::ContentGeneration => "content_generation",
            Stage::ConflictHandling => "conflict_handling",
            Stage::CacheUpdate => "cache_update",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub template: Option<String>,
    /// Sources larger than this fail pre-flight validation.
    pub max_file_size: u64,
    pub create_backups: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            template: None,
            max_file_size: MAX_FILE_SIZE,
            create_backups: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileProcessingResult {
    pub file_path: PathBuf,
    pub success: bool,
    /// Unchanged since the last run; nothing was generated.
    pub skipped: bool,
    pub stage: Stage,
    pub generated_files: BTreeMap<String, PathBuf>,
    pub conflict_info: Option<ConflictInfo>,
    pub resolution_strategy: Option<ResolutionStrategy>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl FileProcessingResult {
    fn new(path: &Path) -> Self {
        Self {
            file_path: path.to_path_buf(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingEstimate {
    pub total_files: usize,
    pub processable_files: usize,
    pub files_needing_processing: usize,
    pub estimated_duration_seconds: f64,
    pub validation_issues: BTreeMap<PathBuf, Vec<String>>,
}

pub struct ProcessingPipeline {
    detector: ChangeDetector,
    resolver: ConflictResolver,
    generator: Box<dyn ContentGenerator>,
    bus: Arc<EventBus>,
    options: PipelineOptions,
}

impl ProcessingPipeline {
    pub fn new(
        detector: ChangeDetector,
        resolver: ConflictResolver,
        generator: Box<dyn ContentGenerator>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            detector,
            resolver,
            generator,
            bus,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut ChangeDetector {
        &mut self.detector
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Never panics or returns an error: every failure ends up in the
    /// returned result's `errors` with `success == false`.
    pub fn process_file(
        &mut self,
        path: &Path,
        custom_vars: &BTreeMap<String, String>,
        conflict_strategy: Option<ResolutionStrategy>,
        force_regenerate: bool,
    ) -> FileProcessingResult {
        let mut result = FileProcessingResult::new(path);

        self.enter(&mut result, Stage::Init);
        let issues = self.validate_file_for_processing(path);
        if !issues.is_empty() {
            let err = Error::Validation(issues.join("; "));
            return self.fail(result, err.to_string());
        }

        if !force_regenerate {
            self.enter(&mut result, Stage::ChangeCheck);
            if !self.detector.has_changed(path) {
                debug!("{} unchanged", path.display());
                result.success = true;
                result.skipped = true;
                result.stage = Stage::Done;
                result.warnings.push(UNCHANGED_WARNING.to_string());
                self.bus.emit(
                    ProgressEvent::new(EventType::FileSkipped)
                        .file(path)
                        .message(UNCHANGED_WARNING),
                );
                return result;
            }
        }

        self.enter(&mut result, Stage::ContentGeneration);
        let request = GenerationRequest {
            source: path,
            template: self.options.template.as_deref(),
            custom_vars,
            backup_existing: self.options.create_backups,
        };
        let generated = match self.generator.generate(&request) {
            Ok(files) => files,
            Err(e) => {
                let err = Error::Generation(format!("{e:#}"));
                return self.fail(result, err.to_string());
            }
        };

        self.enter(&mut result, Stage::ConflictHandling);
        for file in generated {
            if let Err(message) = self.handle_output(&file, conflict_strategy, &mut result) {
                result.errors.push(message);
            }
            result.generated_files.insert(file.name, file.path);
        }
        if !result.errors.is_empty() {
            return self.fail(result, String::new());
        }

        self.enter(&mut result, Stage::CacheUpdate);
        if let Err(e) = self.detector.update_cache(path) {
            warn!("cache update failed for {}: {e}", path.display());
            result.warnings.push(format!("cache update failed: {e}"));
        }

        result.stage = Stage::Done;
        result.success = true;
        self.bus.emit(
            ProgressEvent::new(EventType::FileCompleted)
                .file(path)
                .meta("generated", result.generated_files.len()),
        );
        result
    }

    fn handle_output(
        &mut self,
        file: &GeneratedFile,
        strategy: Option<ResolutionStrategy>,
        result: &mut FileProcessingResult,
    ) -> Result<(), String> {
        if !file.path.exists() {
            return write_atomic(&file.path, file.content.as_bytes())
                .map_err(|e| Error::file_access(&file.path, &e).to_string());
        }

        let Some(conflict) = self.resolver.detect(&file.path, &file.content) else {
            debug!("{} already up to date", file.path.display());
            return Ok(());
        };

        self.bus.emit(
            ProgressEvent::new(EventType::ConflictDetected)
                .file(&file.path)
                .meta("conflict_type", conflict.conflict_type.as_str()),
        );

        let resolution = self.resolver.resolve(
            &conflict,
            strategy,
            self.options.create_backups,
            Some(&mut self.detector),
        );

        self.bus.emit(
            ProgressEvent::new(EventType::ConflictResolved)
                .file(&file.path)
                .meta("strategy", resolution.strategy_used.as_str())
                .meta("success", resolution.success),
        );

        result.warnings.extend(resolution.warnings);
        result.resolution_strategy = Some(resolution.strategy_used);
        result.conflict_info = Some(conflict);
        if let Some(backup) = resolution.backup_path {
            result.metadata.insert(
                format!("backup:{}", file.name),
                serde_json::Value::from(backup.display().to_string()),
            );
        }

        if resolution.success {
            Ok(())
        } else {
            Err(resolution.errors.join("; "))
        }
    }

    fn enter(&self, result: &mut FileProcessingResult, stage: Stage) {
        result.stage = stage;
        self.bus.emit(
            ProgressEvent::new(EventType::StageUpdate)
                .file(&result.file_path)
                .stage(stage.as_str()),
        );
    }

    fn fail(&self, mut result: FileProcessingResult, message: String) -> FileProcessingResult {
        if !message.is_empty() {
            result.errors.push(message);
        }
        let failed_in = result.stage;
        result.stage = Stage::Failed;
        result.success = false;
        warn!(
            "{} failed during {}: {}",
            result.file_path.display(),
            failed_in.as_str(),
            result.errors.join("; ")
        );
        self.bus.emit(
            ProgressEvent::new(EventType::FileFailed)
                .file(&result.file_path)
                .stage(failed_in.as_str())
                .message(result.errors.join("; ")),
        );
        result
    }

    pub fn validate_file_for_processing(&self, path: &Path) -> Vec<String> {
        let metadata = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return vec![format!("file does not exist: {}", path.display())];
            }
            Err(e) => return vec![Error::file_access(path, &e).to_string()],
        };

        if !metadata.is_file() {
            return vec![format!("not a regular file: {}", path.display())];
        }

        let mut issues = Vec::new();
        if metadata.len() > self.options.max_file_size {
            issues.push(format!(
                "file size {} exceeds limit {}: {}",
                metadata.len(),
                self.options.max_file_size,
                path.display()
            ));
        }
        issues
    }

    pub fn get_processing_estimate(&mut self, paths: &[PathBuf]) -> ProcessingEstimate {
        let mut estimate = ProcessingEstimate {
            total_files: paths.len(),
            ..ProcessingEstimate::default()
        };

        let mut processable = Vec::new();
        for path in paths {
            let issues = self.validate_file_for_processing(path);
            if issues.is_empty() {
                processable.push(path.clone());
            } else {
                estimate.validation_issues.insert(path.clone(), issues);
            }
        }

        estimate.processable_files = processable.len();
        estimate.files_needing_processing = self
            .detector
            .files_needing_processing(&processable, false)
            .len();
        estimate.estimated_duration_seconds =
            estimate.files_needing_processing as f64 * ESTIMATED_SECONDS_PER_FILE;

        estimate
    }
}
