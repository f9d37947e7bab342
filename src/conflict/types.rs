use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::merge::MergeStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    FileExists,
    ContentModified,
    StructureConflict,
    PermissionDenied,
    SizeLimit,
}

impl ConflictType {
    pub const ALL: [ConflictType; 5] = [
        ConflictType::FileExists,
        ConflictType::ContentModified,
        ConflictType::StructureConflict,
        ConflictType::PermissionDenied,
        ConflictType::SizeLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::FileExists => "file_exists",
            ConflictType::ContentModified => "content_modified",
            ConflictType::StructureConflict => "structure_conflict",
            ConflictType::PermissionDenied => "permission_denied",
            ConflictType::SizeLimit => "size_limit",
        }
    }

    pub fn default_strategy(&self) -> ResolutionStrategy {
        match self {
            ConflictType::FileExists => ResolutionStrategy::MergeIntelligent,
            ConflictType::ContentModified => ResolutionStrategy::MergeIntelligent,
            ConflictType::StructureConflict => ResolutionStrategy::KeepTheirs,
            ConflictType::PermissionDenied => ResolutionStrategy::Skip,
            ConflictType::SizeLimit => ResolutionStrategy::Skip,
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to reconcile existing content ("ours") with generated content ("theirs").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepOurs,
    KeepTheirs,
    MergeIntelligent,
    MergeAppend,
    MergePrepend,
    BackupAndReplace,
    Skip,
    Prompt,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 8] = [
        ResolutionStrategy::KeepOurs,
        ResolutionStrategy::KeepTheirs,
        ResolutionStrategy::MergeIntelligent,
        ResolutionStrategy::MergeAppend,
        ResolutionStrategy::MergePrepend,
        ResolutionStrategy::BackupAndReplace,
        ResolutionStrategy::Skip,
        ResolutionStrategy::Prompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::KeepOurs => "keep_ours",
            ResolutionStrategy::KeepTheirs => "keep_theirs",
            ResolutionStrategy::MergeIntelligent => "merge_intelligent",
            ResolutionStrategy::MergeAppend => "merge_append",
            ResolutionStrategy::MergePrepend => "merge_prepend",
            ResolutionStrategy::BackupAndReplace => "backup_and_replace",
            ResolutionStrategy::Skip => "skip",
            ResolutionStrategy::Prompt => "prompt",
        }
    }

    pub fn merge_strategy(&self) -> Option<MergeStrategy> {
        match self {
            ResolutionStrategy::MergeIntelligent => Some(MergeStrategy::Intelligent),
            ResolutionStrategy::MergeAppend => Some(MergeStrategy::Append),
            ResolutionStrategy::MergePrepend => Some(MergeStrategy::Prepend),
            ResolutionStrategy::KeepOurs
            | ResolutionStrategy::KeepTheirs
            | ResolutionStrategy::BackupAndReplace
            | ResolutionStrategy::Skip
            | ResolutionStrategy::Prompt => None,
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ResolutionStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| Error::InvalidStrategy(format!("unknown resolution strategy {s:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub conflict_type: ConflictType,
    pub file_path: PathBuf,
    pub existing_content: Option<String>,
    pub new_content: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub detected_at: DateTime<Utc>,
}

impl ConflictInfo {
    pub fn new(conflict_type: ConflictType, file_path: impl Into<PathBuf>) -> Self {
        Self {
            conflict_type,
            file_path: file_path.into(),
            existing_content: None,
            new_content: None,
            metadata: BTreeMap::new(),
            detected_at: Utc::now(),
        }
    }

    pub fn with_contents(mut self, existing: Option<String>, new: Option<String>) -> Self {
        self.existing_content = existing;
        self.new_content = new;
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn size(&self) -> usize {
        self.existing_content.as_ref().map_or(0, String::len)
            + self.new_content.as_ref().map_or(0, String::len)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionResult {
    pub success: bool,
    pub strategy_used: ResolutionStrategy,
    pub final_content: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictSummary {
    pub total: usize,
    pub by_type: BTreeMap<ConflictType, usize>,
    pub recommendations: BTreeMap<PathBuf, ResolutionStrategy>,
    pub total_size: usize,
    pub requires_manual_review: Vec<PathBuf>,
}
