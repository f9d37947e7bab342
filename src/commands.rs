//! Subcommand handlers. Each returns `Ok(false)` when the command ran but
//! the outcome should produce a non-zero exit status.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::batch::{BatchOptions, BatchOrchestrator};
use crate::cache::CacheStore;
use crate::cli::RunArgs;
use crate::conflict::ConflictResolver;
use crate::detect::{ChangeDetector, walk_files};
use crate::events::EventBus;
use crate::generate::TemplateGenerator;
use crate::git::{GitVcs, get_git_info};
use crate::merge::ContentMerger;
use crate::output::{ConsoleProgress, print_batch_summary, print_estimate, print_scan, print_status};
use crate::pipeline::{PipelineOptions, ProcessingPipeline};
use crate::project::{Project, find_project_root};
use crate::services::{GitignoreMatcher, SourceStatsExtractor};

pub async fn run(path: Option<PathBuf>, args: RunArgs) -> Result<bool> {
    let project = open_project(path).await?;
    let template = project.template().await?;

    let bus = Arc::new(EventBus::new(project.config.event_history));
    bus.subscribe(Arc::new(ConsoleProgress::new()));

    let pipeline = build_pipeline(&project, template, Arc::clone(&bus))?;
    let files = collect_sources(&project)?;

    let config = &project.config;
    let options = BatchOptions {
        custom_vars: args.vars.into_iter().collect(),
        conflict_strategy: args.strategy.or(config.default_strategy),
        force_regenerate: args.force,
        max_files: args.limit,
        changed_only: false,
        auto_commit: args.commit || config.auto_commit,
        commit_message: config.commit_message.clone(),
        max_parallel: config.max_parallel,
    };

    let mut orchestrator = BatchOrchestrator::new(pipeline);
    if options.auto_commit {
        orchestrator = orchestrator.with_vcs(GitVcs::new(&project.root));
    }

    let (git_info, result) = tokio::join!(
        get_git_info(&project.root),
        tokio::task::spawn_blocking(move || orchestrator.process_files(&files, &options))
    );
    let result = result.context("batch worker panicked")?;

    print_batch_summary(&project.root, &result, git_info.ok().as_ref());
    Ok(result.success)
}

pub async fn status(path: Option<PathBuf>) -> Result<bool> {
    let project = open_project(path).await?;
    let store = CacheStore::open(project.cache_path());

    print_status(&store.statistics(), &store.validate_integrity());
    Ok(true)
}

pub async fn scan(path: Option<PathBuf>) -> Result<bool> {
    let project = open_project(path).await?;
    let mut detector = build_detector(&project)?;

    let root = project.root.clone();
    let scan = tokio::task::spawn_blocking(move || detector.scan_directory(&root))
        .await
        .context("scan worker panicked")?;

    print_scan(&project.root, &scan);
    Ok(true)
}

pub async fn estimate(path: Option<PathBuf>) -> Result<bool> {
    let project = open_project(path).await?;
    let bus = Arc::new(EventBus::new(project.config.event_history));
    let mut pipeline = build_pipeline(&project, None, bus)?;
    let files = collect_sources(&project)?;

    let estimate = tokio::task::spawn_blocking(move || pipeline.get_processing_estimate(&files))
        .await
        .context("estimate worker panicked")?;

    print_estimate(&project.root, &estimate);
    Ok(true)
}

pub async fn cleanup(path: Option<PathBuf>, max_age_days: Option<f64>) -> Result<bool> {
    let project = open_project(path).await?;
    let max_age = max_age_days.unwrap_or(project.config.cache_max_age_days);
    let mut detector = build_detector(&project)?;

    let removed = detector.cleanup(max_age);
    if removed > 0 {
        detector.save()?;
    }

    println!(
        "Removed {} cache entr{} ({} remaining)",
        removed,
        if removed == 1 { "y" } else { "ies" },
        detector.store().len()
    );
    Ok(true)
}

pub async fn verify(path: Option<PathBuf>) -> Result<bool> {
    let project = open_project(path).await?;
    let store = CacheStore::open(project.cache_path());
    let issues = store.validate_integrity();

    if issues.is_empty() {
        println!("Cache OK ({} entries)", store.len());
        return Ok(true);
    }

    println!("Cache has {} issue(s):", issues.len());
    for issue in &issues {
        println!("  {issue}");
    }
    Ok(false)
}

pub async fn export(path: Option<PathBuf>, destination: &Path) -> Result<bool> {
    let project = open_project(path).await?;
    let store = CacheStore::open(project.cache_path());

    store.export(destination)?;
    println!(
        "Exported {} entries to {}",
        store.len(),
        destination.display()
    );
    Ok(true)
}

pub async fn preview(base: &Path, new: &Path, strategy: &str) -> Result<bool> {
    let base_content = fs::read_to_string(base)
        .await
        .with_context(|| format!("Failed to read {}", base.display()))?;
    let new_content = fs::read_to_string(new)
        .await
        .with_context(|| format!("Failed to read {}", new.display()))?;

    let preview = ContentMerger::default().preview(&base_content, &new_content, strategy);
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(preview.error.is_none())
}

async fn open_project(path: Option<PathBuf>) -> Result<Project> {
    let root = find_project_root(path).await?;
    Project::open(root).await
}

fn build_detector(project: &Project) -> Result<ChangeDetector> {
    let ignore = GitignoreMatcher::new(&project.root, &project.ignore_patterns())?;
    let store = CacheStore::open(project.cache_path());

    Ok(ChangeDetector::new(&project.root, store)
        .with_ignore(ignore)
        .with_metadata(SourceStatsExtractor))
}

fn build_pipeline(
    project: &Project,
    template: Option<String>,
    bus: Arc<EventBus>,
) -> Result<ProcessingPipeline> {
    let detector = build_detector(project)?;
    let resolver = ConflictResolver::new(project.config.conflict_size_limit);

    let mut generator = TemplateGenerator::new(&project.root, project.output_dir())
        .with_excerpt_lines(project.config.excerpt_lines);
    if let Some(template) = template {
        generator = generator.with_template(template);
    }

    let options = PipelineOptions {
        template: None,
        max_file_size: project.config.max_file_size,
        create_backups: project.config.create_backups,
    };

    Ok(ProcessingPipeline::new(detector, resolver, Box::new(generator), bus).with_options(options))
}

fn collect_sources(project: &Project) -> Result<Vec<PathBuf>> {
    let ignore = GitignoreMatcher::new(&project.root, &project.ignore_patterns())?;
    Ok(walk_files(&project.root, &ignore)
        .into_iter()
        .filter(|path| project.config.wants_extension(path))
        .collect())
}
