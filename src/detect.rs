mod hash;
mod walk;

pub use hash::hash_pair;
pub use walk::walk_files;

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStore, now_epoch_secs, system_time_secs};
use crate::error::{Error, Result};
use crate::services::{IgnoreMatcher, MetadataExtractor, NoIgnore, NoMetadata};

/// Decides whether files changed since they were last processed and keeps
/// the [`CacheStore`] in step.
///
/// Cache keys are paths relative to `root` with `/` separators; paths outside
/// `root` are keyed by their full normalized form.
pub struct ChangeDetector {
    root: PathBuf,
    store: CacheStore,
    ignore: Box<dyn IgnoreMatcher>,
    metadata: Box<dyn MetadataExtractor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub changed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub new: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl ScanResult {
    pub fn total(&self) -> usize {
        self.changed.len() + self.unchanged.len() + self.new.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub key: String,
    pub exists: bool,
    pub size: Option<u64>,
    pub mtime: Option<f64>,
    pub changed: bool,
    pub cached: Option<CacheEntry>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ChangeDetector {
    pub fn new(root: impl Into<PathBuf>, store: CacheStore) -> Self {
        Self {
            root: root.into(),
            store,
            ignore: Box::new(NoIgnore),
            metadata: Box::new(NoMetadata),
        }
    }

    pub fn with_ignore(mut self, matcher: impl IgnoreMatcher + 'static) -> Self {
        self.ignore = Box::new(matcher);
        self
    }

    pub fn with_metadata(mut self, extractor: impl MetadataExtractor + 'static) -> Self {
        self.metadata = Box::new(extractor);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CacheStore {
        &mut self.store
    }

    pub fn cache_key(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(normalize_path)
            .unwrap_or_else(|_| normalize_path(path))
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        let path = Path::new(key);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn hash_pair(&self, path: &Path) -> Result<(String, String)> {
        hash_pair(path)
    }

    /// Stat-only staleness check.
    ///
    /// No cache entry means changed. A missing file with an entry means
    /// changed, and the entry is dropped. Otherwise the file is unchanged iff
    /// both mtime and size match the entry.
    pub fn has_changed(&mut self, path: &Path) -> bool {
        let key = self.cache_key(path);

        let stat = match file_stat(path) {
            Ok(stat) => stat,
            Err(e) => {
                if e.kind() == io::ErrorKind::NotFound && self.store.remove(&key) {
                    debug!("{key} vanished; dropped its cache entry");
                }
                return true;
            }
        };

        match self.store.get(&key) {
            None => true,
            Some(entry) => entry.is_stale(stat.mtime, stat.size),
        }
    }

    /// Content-hash staleness check, for when stat data cannot be trusted.
    pub fn has_changed_deep(&mut self, path: &Path) -> bool {
        let key = self.cache_key(path);

        if !path.exists() {
            self.store.remove(&key);
            return true;
        }

        let Some(entry) = self.store.get(&key) else {
            return true;
        };

        match hash_pair(path) {
            Ok((md5, sha256)) => entry.md5 != md5 || entry.sha256 != sha256,
            Err(e) => {
                debug!("cannot hash {key}: {e}");
                true
            }
        }
    }

    pub fn update_cache(&mut self, path: &Path) -> Result<CacheEntry> {
        let stat = file_stat(path).map_err(|e| Error::file_access(path, &e))?;
        let (md5, sha256) = hash_pair(path)?;

        let metadata = match self.metadata.extract(path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("metadata extraction failed for {}: {e:#}", path.display());
                BTreeMap::new()
            }
        };

        let entry = CacheEntry {
            path: self.cache_key(path),
            md5,
            sha256,
            size: stat.size,
            mtime: stat.mtime,
            last_processed: now_epoch_secs(),
            metadata,
        };

        debug!("cached {}", entry.path);
        self.store.set(entry.clone());
        Ok(entry)
    }

    pub fn files_needing_processing(&mut self, paths: &[PathBuf], force_all: bool) -> Vec<PathBuf> {
        if force_all {
            return paths.to_vec();
        }

        paths
            .iter()
            .filter(|path| self.has_changed(path))
            .cloned()
            .collect()
    }

    pub fn scan_directory(&mut self, root: &Path) -> ScanResult {
        let mut result = ScanResult::default();
        let files = walk_files(root, self.ignore.as_ref());

        for path in files {
            let key = self.cache_key(&path);
            if self.store.get(&key).is_none() {
                result.new.push(path);
            } else if self.has_changed(&path) {
                result.changed.push(path);
            } else {
                result.unchanged.push(path);
            }
        }

        result.deleted = self
            .store
            .all()
            .keys()
            .map(|key| self.path_for_key(key))
            .filter(|path| path.starts_with(root) && !path.exists())
            .collect();

        debug!(
            "scan of {}: {} new, {} changed, {} unchanged, {} deleted",
            root.display(),
            result.new.len(),
            result.changed.len(),
            result.unchanged.len(),
            result.deleted.len()
        );

        result
    }

    pub fn file_info(&mut self, path: &Path) -> FileInfo {
        let key = self.cache_key(path);
        let stat = file_stat(path).ok();
        let changed = self.has_changed(path);

        let metadata = match stat {
            Some(_) => self.metadata.extract(path).unwrap_or_else(|e| {
                debug!("metadata extraction failed for {key}: {e:#}");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };

        FileInfo {
            path: path.to_path_buf(),
            exists: stat.is_some(),
            size: stat.map(|s| s.size),
            mtime: stat.map(|s| s.mtime),
            changed,
            cached: self.store.get(&key).cloned(),
            metadata,
            key,
        }
    }

    pub fn cleanup(&mut self, max_age_days: f64) -> usize {
        let existing: HashSet<String> = self
            .store
            .all()
            .keys()
            .filter(|key| self.path_for_key(key).exists())
            .cloned()
            .collect();

        self.store.cleanup(&existing, max_age_days)
    }

    pub fn save(&mut self) -> Result<()> {
        self.store.save()
    }
}

#[derive(Debug, Clone, Copy)]
struct FileStat {
    mtime: f64,
    size: u64,
}

fn file_stat(path: &Path) -> io::Result<FileStat> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }

    let mtime = metadata.modified().map(system_time_secs).unwrap_or(0.0);

    Ok(FileStat {
        mtime,
        size: metadata.len(),
    })
}

pub(crate) fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
