use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::BatchProcessingResult;
use crate::cache::CacheStatistics;
use crate::detect::ScanResult;
use crate::events::{EventType, ProgressEvent, ProgressListener};
use crate::git::GitInfo;
use crate::pipeline::ProcessingEstimate;

pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .expect("valid template")
                .progress_chars("#>-"),
        );
        Self { bar }
    }
}

impl ProgressListener for ConsoleProgress {
    fn on_event(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        match event.event_type {
            EventType::BatchStarted => {
                self.bar.reset();
                self.bar.set_length(event.total.unwrap_or_default() as u64);
            }
            EventType::FileStarted => {
                if let Some(name) = event.file_path.as_deref().and_then(Path::file_name) {
                    self.bar.set_message(name.to_string_lossy().into_owned());
                }
            }
            EventType::FileCompleted | EventType::FileFailed | EventType::FileSkipped => {
                self.bar.inc(1);
            }
            EventType::BatchCompleted => self.bar.finish_and_clear(),
            EventType::StageUpdate
            | EventType::ConflictDetected
            | EventType::ConflictResolved
            | EventType::CommitCreated => {}
        }
        Ok(())
    }
}

pub fn print_batch_summary(root: &Path, result: &BatchProcessingResult, git_info: Option<&GitInfo>) {
    let summary = result.summary();

    println!();
    match git_info {
        Some(git) => println!(
            "Generated @ {} ({} files, {:.1}% succeeded)",
            git.commit_short, summary.total, summary.success_rate
        ),
        None => println!(
            "Generated ({} files, {:.1}% succeeded)",
            summary.total, summary.success_rate
        ),
    }
    println!(
        "  updated: {}, failed: {}, skipped: {} in {:.2}s",
        summary.successful, summary.failed, summary.skipped, summary.duration_seconds
    );

    for path in &result.successful_files {
        let Some(file_result) = result.file_results.get(path) else {
            continue;
        };
        for generated in file_result.generated_files.values() {
            let strategy = file_result
                .resolution_strategy
                .map(|s| format!(" ({s})"))
                .unwrap_or_default();
            println!("  wrote: {}{}", display_relative(root, generated), strategy);
        }
    }

    for error in &result.errors {
        println!("  error: {error}");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    if let Some(commit) = &result.commit_id {
        println!("  committed: {commit}");
    }
}

pub fn print_status(stats: &CacheStatistics, issues: &[String]) {
    println!("respec status");
    println!("  cache: {}", stats.cache_file);
    if !stats.cache_file_exists {
        println!("  (not written yet)");
    }
    println!("  entries: {}", stats.total_entries);
    println!("  tracked bytes: {}", stats.total_size);
    if let Some(oldest) = stats.oldest_processed.and_then(format_epoch) {
        println!("  oldest: {oldest}");
    }
    if let Some(newest) = stats.newest_processed.and_then(format_epoch) {
        println!("  newest: {newest}");
    }
    if issues.is_empty() {
        println!("  integrity: ok");
    } else {
        println!("  integrity: {} issue(s)", issues.len());
    }
}

pub fn print_scan(root: &Path, scan: &ScanResult) {
    println!(
        "{} new, {} changed, {} unchanged, {} deleted",
        scan.new.len(),
        scan.changed.len(),
        scan.unchanged.len(),
        scan.deleted.len()
    );

    let groups = [
        ("new", &scan.new),
        ("changed", &scan.changed),
        ("deleted", &scan.deleted),
    ];
    for (label, paths) in groups {
        for path in paths {
            println!("  {label}: {}", display_relative(root, path));
        }
    }
}

pub fn print_estimate(root: &Path, estimate: &ProcessingEstimate) {
    println!(
        "{} of {} files need processing (~{:.0}s)",
        estimate.files_needing_processing, estimate.total_files, estimate.estimated_duration_seconds
    );
    println!("  processable: {}", estimate.processable_files);
    for (path, issues) in &estimate.validation_issues {
        println!("  {}: {}", display_relative(root, path), issues.join("; "));
    }
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn format_epoch(secs: f64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs as i64, 0).map(|t| t.to_rfc3339())
}
