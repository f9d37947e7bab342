use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::batch::DEFAULT_COMMIT_MESSAGE;
use crate::conflict::{DEFAULT_SIZE_LIMIT, ResolutionStrategy};
use crate::events::DEFAULT_HISTORY;
use crate::generate::DEFAULT_EXCERPT_LINES;

pub const CONFIG_FILE: &str = "config.toml";

/// Project settings read from `.respec/config.toml`. Every field is optional
/// in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    /// Only sources with these extensions are processed. Empty means all.
    pub extensions: Vec<String>,
    pub template: Option<PathBuf>,
    pub ignore: Vec<String>,
    /// Source lines quoted by the default template's `{{excerpt}}`.
    pub excerpt_lines: usize,
    pub max_file_size: u64,
    pub conflict_size_limit: usize,
    pub default_strategy: Option<ResolutionStrategy>,
    pub create_backups: bool,
    pub auto_commit: bool,
    pub commit_message: String,
    pub cache_max_age_days: f64,
    /// Has no effect; files are processed sequentially.
    pub max_parallel: usize,
    pub event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("specs"),
            extensions: ["rs", "py", "js", "ts", "go", "sh"]
                .into_iter()
                .map(String::from)
                .collect(),
            template: None,
            ignore: Vec::new(),
            excerpt_lines: DEFAULT_EXCERPT_LINES,
            max_file_size: 1024 * 1024,
            conflict_size_limit: DEFAULT_SIZE_LIMIT,
            default_strategy: None,
            create_backups: true,
            auto_commit: false,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            cache_max_age_days: 30.0,
            max_parallel: 1,
            event_history: DEFAULT_HISTORY,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if fs::metadata(&path).await.is_err() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn wants_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
output_dir = "docs/specs"
default_strategy = "merge_append"
"#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("docs/specs"));
        assert_eq!(config.default_strategy, Some(ResolutionStrategy::MergeAppend));
        assert!(config.create_backups);
        assert_eq!(config.event_history, DEFAULT_HISTORY);
        assert_eq!(config.excerpt_lines, DEFAULT_EXCERPT_LINES);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(Config::from_toml("default_strategy = \"yolo\"").is_err());
    }

    #[test]
    fn extension_filter() {
        let config = Config::default();
        assert!(config.wants_extension(Path::new("src/app.py")));
        assert!(!config.wants_extension(Path::new("notes.txt")));
    }
}
