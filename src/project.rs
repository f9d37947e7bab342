use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::Config;

pub const DATA_DIR: &str = ".respec";
pub const CACHE_FILE: &str = "cache.json";

/// Walks up from `path` (or the working directory) to the nearest directory
/// holding `.respec/`, then to the nearest holding `.git/`. Falls back to the
/// starting directory.
pub async fn find_project_root(path: Option<PathBuf>) -> Result<PathBuf> {
    let start = match path {
        Some(p) => {
            if p.is_absolute() {
                p
            } else {
                std::env::current_dir()?.join(p)
            }
        }
        None => std::env::current_dir()?,
    };

    let start = fs::canonicalize(&start)
        .await
        .with_context(|| format!("Failed to canonicalize path: {}", start.display()))?;

    if let Some(root) = find_ancestor_with(&start, DATA_DIR).await {
        return Ok(root);
    }

    if let Some(root) = find_ancestor_with(&start, ".git").await {
        return Ok(root);
    }

    Ok(start)
}

async fn find_ancestor_with(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if fs::metadata(current.join(marker)).await.is_ok() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub config: Config,
}

impl Project {
    pub async fn open(root: PathBuf) -> Result<Self> {
        let data_dir = root.join(DATA_DIR);
        ensure_data_dir(&data_dir).await?;
        let config = Config::load(&data_dir).await?;

        Ok(Self {
            root,
            data_dir,
            config,
        })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.output_dir)
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        let mut patterns = vec![format!("/{DATA_DIR}/")];
        if let Ok(relative) = self.output_dir().strip_prefix(&self.root) {
            let relative = relative.to_string_lossy().replace('\\', "/");
            if !relative.is_empty() {
                patterns.push(format!("/{}/", relative.trim_end_matches('/')));
            }
        }
        patterns.extend(self.config.ignore.iter().cloned());
        patterns
    }

    pub async fn template(&self) -> Result<Option<String>> {
        let Some(template) = &self.config.template else {
            return Ok(None);
        };
        let path = self.root.join(template);
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        Ok(Some(content))
    }
}

async fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let gitignore = data_dir.join(".gitignore");
    if fs::metadata(&gitignore).await.is_err() {
        fs::write(&gitignore, format!("{CACHE_FILE}\n"))
            .await
            .with_context(|| format!("Failed to write {}", gitignore.display()))?;
    }

    Ok(())
}
