//! Collaborators the core calls out to.
//!
//! Each seam is a small trait so the pipeline can be assembled with the real
//! implementations in the binary and with test doubles in tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde_json::Value;

use crate::language::Language;

#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub source: &'a Path,
    pub template: Option<&'a str>,
    pub custom_vars: &'a BTreeMap<String, String>,
    /// Hint for generators that manage their own side files.
    pub backup_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Short label such as `"spec"`; keys the result's generated-files map.
    pub name: String,
    pub path: PathBuf,
    pub content: String,
}

pub trait ContentGenerator: Send {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<Vec<GeneratedFile>>;
}

pub trait IgnoreMatcher: Send {
    fn should_ignore(&self, path: &Path) -> bool;
}

pub trait MetadataExtractor: Send {
    fn extract(&self, path: &Path) -> Result<BTreeMap<String, Value>>;
}

pub trait VersionControl: Send {
    fn add_files(&self, paths: &[PathBuf]) -> Result<()>;
    fn commit(&self, message: &str) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoIgnore;

impl IgnoreMatcher for NoIgnore {
    fn should_ignore(&self, _path: &Path) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn extract(&self, _path: &Path) -> Result<BTreeMap<String, Value>> {
        Ok(BTreeMap::new())
    }
}

/// `.gitignore`-style matcher rooted at a project directory.
///
/// Always ignores `.git/`; callers add their own data and output directories.
pub struct GitignoreMatcher {
    root: PathBuf,
    rules: Gitignore,
}

impl GitignoreMatcher {
    pub fn new(root: &Path, extra_patterns: &[String]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);

        let gitignore = root.join(".gitignore");
        if gitignore.is_file() {
            if let Some(err) = builder.add(&gitignore) {
                tracing::warn!("partial .gitignore at {}: {err}", gitignore.display());
            }
        }

        builder.add_line(None, ".git/")?;
        for pattern in extra_patterns {
            builder.add_line(None, pattern)?;
        }

        Ok(Self {
            root: root.to_path_buf(),
            rules: builder.build()?,
        })
    }
}

impl IgnoreMatcher for GitignoreMatcher {
    fn should_ignore(&self, path: &Path) -> bool {
        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) if path.is_relative() => path,
            Err(_) => return false,
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        self.rules
            .matched_path_or_any_parents(relative, path.is_dir())
            .is_ignore()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SourceStatsExtractor;

impl MetadataExtractor for SourceStatsExtractor {
    fn extract(&self, path: &Path) -> Result<BTreeMap<String, Value>> {
        let data = std::fs::read(path)?;
        let mut meta = BTreeMap::new();

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            meta.insert("extension".to_string(), Value::from(ext));
        }
        if let Some(language) = Language::from_path(path) {
            meta.insert("language".to_string(), Value::from(language.name()));
        }

        let binary = is_binary_content(&data);
        meta.insert("binary".to_string(), Value::from(binary));
        if !binary {
            meta.insert("lines".to_string(), Value::from(count_lines(&data)));
        }

        Ok(meta)
    }
}

pub(crate) fn is_binary_content(data: &[u8]) -> bool {
    let check_len = data.len().min(8192);
    memchr::memchr(0, &data[..check_len]).is_some()
}

pub(crate) fn count_lines(data: &[u8]) -> usize {
    memchr::memchr_iter(b'\n', data).count()
        + if data.last() != Some(&b'\n') && !data.is_empty() {
            1
        } else {
            0
        }
}
