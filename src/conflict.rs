mod types;

pub use types::{
    ConflictInfo, ConflictResolutionResult, ConflictSummary, ConflictType, ResolutionStrategy,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::detect::ChangeDetector;
use crate::error::{Error, format_io_error};
use crate::merge::{ContentMerger, MergeStrategy, Severity};

pub const DEFAULT_SIZE_LIMIT: usize = 1024 * 1024;

pub type StrategyMap = BTreeMap<ConflictType, ResolutionStrategy>;

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    merger: ContentMerger,
    size_limit: usize,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_LIMIT)
    }
}

impl ConflictResolver {
    pub fn new(size_limit: usize) -> Self {
        Self {
            merger: ContentMerger::default(),
            size_limit,
        }
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    pub fn merger(&self) -> &ContentMerger {
        &self.merger
    }

    pub fn detect(&self, path: &Path, new_content: &str) -> Option<ConflictInfo> {
        let metadata = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => return Some(self.permission_conflict(path, new_content, &e)),
        };

        let existing = match std::fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => return Some(self.permission_conflict(path, new_content, &e)),
        };

        if metadata.permissions().readonly() {
            return Some(
                ConflictInfo::new(ConflictType::PermissionDenied, path)
                    .with_contents(Some(existing), Some(new_content.to_string()))
                    .with_meta("error", "target is read-only"),
            );
        }

        if new_content.len() > self.size_limit {
            return Some(
                ConflictInfo::new(ConflictType::SizeLimit, path)
                    .with_contents(Some(existing), Some(new_content.to_string()))
                    .with_meta("new_size", new_content.len())
                    .with_meta("size_limit", self.size_limit),
            );
        }

        if existing == new_content {
            return None;
        }

        let conflicts = self.merger.detect_conflicts(&existing, new_content);
        let similarity = self.merger.similarity(&existing, new_content);

        let conflict_type = if conflicts.iter().any(|c| c.severity == Severity::High) {
            ConflictType::StructureConflict
        } else if !existing.is_empty() {
            ConflictType::ContentModified
        } else {
            ConflictType::FileExists
        };

        debug!(
            "{} conflict on {} (similarity {similarity:.2})",
            conflict_type,
            path.display()
        );

        let conflict_list = serde_json::to_value(&conflicts).unwrap_or_default();

        Some(
            ConflictInfo::new(conflict_type, path)
                .with_meta("existing_size", existing.len())
                .with_meta("new_size", new_content.len())
                .with_meta("similarity", similarity)
                .with_meta("structural_conflicts", conflict_list)
                .with_contents(Some(existing), Some(new_content.to_string())),
        )
    }

    fn permission_conflict(
        &self,
        path: &Path,
        new_content: &str,
        err: &std::io::Error,
    ) -> ConflictInfo {
        ConflictInfo::new(ConflictType::PermissionDenied, path)
            .with_contents(None, Some(new_content.to_string()))
            .with_meta("error", format_io_error(err))
    }

    pub fn recommend_strategy(&self, conflict: &ConflictInfo) -> ResolutionStrategy {
        match conflict.conflict_type {
            ConflictType::PermissionDenied | ConflictType::SizeLimit => ResolutionStrategy::Skip,
            ConflictType::FileExists
            | ConflictType::ContentModified
            | ConflictType::StructureConflict => {
                let existing = conflict.existing_content.as_deref().unwrap_or_default();
                let new = conflict.new_content.as_deref().unwrap_or_default();

                let conflicts = self.merger.detect_conflicts(existing, new);
                if conflicts.iter().any(|c| c.severity == Severity::High) {
                    return ResolutionStrategy::Prompt;
                }

                if self.merger.similarity(existing, new) > 0.5 {
                    ResolutionStrategy::MergeIntelligent
                } else {
                    ResolutionStrategy::BackupAndReplace
                }
            }
        }
    }

    /// When a backup is taken it is written before the target. The target is
    /// replaced atomically, so a failed resolution leaves it untouched. On
    /// success the path's cache entry in `cache` is refreshed.
    pub fn resolve(
        &self,
        conflict: &ConflictInfo,
        strategy: Option<ResolutionStrategy>,
        create_backup: bool,
        cache: Option<&mut ChangeDetector>,
    ) -> ConflictResolutionResult {
        let requested = strategy.unwrap_or_else(|| conflict.conflict_type.default_strategy());
        let path = conflict.file_path.as_path();
        let existing = conflict.existing_content.as_deref();
        let new = conflict.new_content.as_deref().unwrap_or_default();

        let mut result = ConflictResolutionResult {
            success: false,
            strategy_used: requested,
            final_content: None,
            backup_path: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            resolved_at: Utc::now(),
        };

        let merge = |strategy: MergeStrategy| {
            Some(self.merger.merge(existing.unwrap_or_default(), new, strategy))
        };

        let final_content = match requested {
            ResolutionStrategy::Skip => {
                result.warnings.push(format!(
                    "skipped {} ({})",
                    path.display(),
                    conflict.conflict_type
                ));
                result.success = true;
                return result;
            }
            ResolutionStrategy::KeepOurs => existing.map(str::to_string),
            ResolutionStrategy::KeepTheirs | ResolutionStrategy::BackupAndReplace => {
                Some(new.to_string())
            }
            ResolutionStrategy::MergeIntelligent => merge(MergeStrategy::Intelligent),
            ResolutionStrategy::MergeAppend => merge(MergeStrategy::Append),
            ResolutionStrategy::MergePrepend => merge(MergeStrategy::Prepend),
            ResolutionStrategy::Prompt => {
                result.warnings.push(format!(
                    "interactive resolution unavailable for {}; used merge_intelligent",
                    path.display()
                ));
                result.strategy_used = ResolutionStrategy::MergeIntelligent;
                merge(MergeStrategy::Intelligent)
            }
        };

        let Some(final_content) = final_content else {
            debug!("nothing to write for {}", path.display());
            result.success = true;
            return result;
        };

        if existing == Some(final_content.as_str()) {
            debug!("{} already holds the resolved content", path.display());
            result.final_content = Some(final_content);
            result.success = true;
            return result;
        }

        if conflict.conflict_type == ConflictType::PermissionDenied {
            let err = Error::FileAccess {
                path: path.to_path_buf(),
                reason: "permission denied".to_string(),
            };
            result.errors.push(format!("{requested} refused: {err}"));
            return result;
        }

        let wants_backup = create_backup || requested == ResolutionStrategy::BackupAndReplace;
        if let (true, Some(existing)) = (wants_backup, existing) {
            let backup = backup_path(path);
            if let Err(e) = write_atomic(&backup, existing.as_bytes()) {
                let err = Error::file_access(&backup, &e);
                result.errors.push(format!("backup failed: {err}"));
                return result;
            }
            debug!("backed up {} to {}", path.display(), backup.display());
            result.backup_path = Some(backup);
        }

        if let Err(e) = write_atomic(path, final_content.as_bytes()) {
            let err = Error::file_access(path, &e);
            result.errors.push(format!("write failed: {err}"));
            return result;
        }

        if let Some(detector) = cache {
            if let Err(e) = detector.update_cache(path) {
                result.warnings.push(format!("cache refresh failed: {e}"));
            }
        }

        info!("resolved {} with {}", path.display(), result.strategy_used);
        result.final_content = Some(final_content);
        result.success = true;
        result
    }

    pub fn resolve_many(
        &self,
        conflicts: &[ConflictInfo],
        strategies: Option<&StrategyMap>,
        create_backup: bool,
        mut cache: Option<&mut ChangeDetector>,
    ) -> Vec<ConflictResolutionResult> {
        conflicts
            .iter()
            .map(|conflict| {
                let strategy = strategies.and_then(|m| m.get(&conflict.conflict_type).copied());
                self.resolve(conflict, strategy, create_backup, cache.as_deref_mut())
            })
            .collect()
    }

    pub fn summarize(&self, conflicts: &[ConflictInfo]) -> ConflictSummary {
        let mut summary = ConflictSummary {
            total: conflicts.len(),
            ..ConflictSummary::default()
        };

        for conflict in conflicts {
            *summary.by_type.entry(conflict.conflict_type).or_insert(0) += 1;
            summary.total_size += conflict.size();

            let recommendation = self.recommend_strategy(conflict);
            if recommendation == ResolutionStrategy::Prompt
                || conflict.conflict_type == ConflictType::StructureConflict
            {
                summary
                    .requires_manual_review
                    .push(conflict.file_path.clone());
            }
            summary
                .recommendations
                .insert(conflict.file_path.clone(), recommendation);
        }

        summary
    }

    pub fn validate_strategy_map(&self, strategies: &StrategyMap) -> Vec<String> {
        let mut issues = Vec::new();

        for conflict_type in ConflictType::ALL {
            let Some(strategy) = strategies.get(&conflict_type).copied() else {
                issues.push(format!("no strategy for {conflict_type}"));
                continue;
            };

            match (conflict_type, strategy) {
                (ConflictType::PermissionDenied, ResolutionStrategy::Skip) => {}
                (ConflictType::PermissionDenied, strategy) => issues.push(format!(
                    "{strategy} for {conflict_type} would write to a path that cannot be written"
                )),
                (ConflictType::SizeLimit, strategy) if strategy.merge_strategy().is_some() => {
                    issues.push(format!(
                        "{strategy} for {conflict_type} would grow content that is already over the limit"
                    ))
                }
                (_, ResolutionStrategy::Prompt) => issues.push(format!(
                    "prompt for {conflict_type} is not interactive and falls back to merge_intelligent"
                )),
                _ => {}
            }
        }

        if !issues.is_empty() {
            warn!("strategy map has {} issue(s)", issues.len());
        }
        issues
    }
}

/// Timestamped sibling of `path`, e.g. `spec.md.20250131T142307.123456.bak`.
fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
    path.with_file_name(format!("{name}.{stamp}.bak"))
}
