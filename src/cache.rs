mod types;

pub use types::{CacheEntry, CacheStatistics, MD5_HEX_LEN, SHA256_HEX_LEN};

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::error::{Error, Result};

/// Persisted map from normalized file path to its last-known fingerprint.
///
/// The backing file is a JSON object keyed by path. It is fully read on
/// [`CacheStore::open`] and fully rewritten on [`CacheStore::save`].
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
    load_issues: Vec<String>,
    dirty: bool,
}

#[derive(Serialize)]
struct CacheExport<'a> {
    exported_at: String,
    entry_count: usize,
    entries: &'a BTreeMap<String, CacheEntry>,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory entries with the backing file's contents.
    ///
    /// A missing or unreadable file yields an empty cache. Individual entries
    /// that fail to parse are dropped and reported by [`validate_integrity`].
    ///
    /// [`validate_integrity`]: CacheStore::validate_integrity
    pub fn load(&mut self) {
        self.entries.clear();
        self.load_issues.clear();
        self.dirty = false;

        if !self.path.exists() {
            debug!("no cache file at {}", self.path.display());
            return;
        }

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cannot read cache {}: {e}; starting empty", self.path.display());
                return;
            }
        };

        let document: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("corrupt cache {}: {e}; starting empty", self.path.display());
                return;
            }
        };

        for (key, value) in document {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    self.entries.insert(key, entry);
                }
                Err(e) => {
                    warn!("dropping malformed cache entry {key}: {e}");
                    self.load_issues
                        .push(format!("{key}: malformed entry dropped at load: {e}"));
                }
            }
        }

        debug!("loaded {} cache entries", self.entries.len());
    }

    pub fn save(&mut self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| Error::storage("cannot serialize cache", e))?;
        write_atomic(&self.path, &bytes)
            .map_err(|e| Error::storage(format!("cannot write {}", self.path.display()), e))?;
        self.dirty = false;
        info!("saved {} cache entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    pub fn set(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.path.clone(), entry);
        self.dirty = true;
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let removed = self.entries.remove(path).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn all(&self) -> &BTreeMap<String, CacheEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear(&mut self) {
        self.dirty |= !self.entries.is_empty();
        self.entries.clear();
    }

    /// Drops entries not listed in `existing_paths` or processed more than
    /// `max_age_days` ago. File contents are not consulted.
    pub fn cleanup(&mut self, existing_paths: &HashSet<String>, max_age_days: f64) -> usize {
        let now = now_epoch_secs();
        let before = self.entries.len();

        self.entries.retain(|key, entry| {
            let keep = existing_paths.contains(key) && entry.age_days(now) <= max_age_days;
            if !keep {
                debug!("cache cleanup drops {key}");
            }
            keep
        });

        let removed = before - self.entries.len();
        self.dirty |= removed > 0;
        removed
    }

    pub fn statistics(&self) -> CacheStatistics {
        let processed = self.entries.values().map(|e| e.last_processed);

        CacheStatistics {
            total_entries: self.entries.len(),
            total_size: self.entries.values().map(|e| e.size).sum(),
            oldest_processed: processed.clone().reduce(f64::min),
            newest_processed: processed.reduce(f64::max),
            cache_file: self.path.display().to_string(),
            cache_file_exists: self.path.exists(),
        }
    }

    pub fn validate_integrity(&self) -> Vec<String> {
        let mut issues = self.load_issues.clone();
        for (key, entry) in &self.entries {
            issues.extend(entry.integrity_issues(key));
        }
        issues
    }

    pub fn export(&self, destination: &Path) -> Result<()> {
        let export = CacheExport {
            exported_at: chrono::Utc::now().to_rfc3339(),
            entry_count: self.entries.len(),
            entries: &self.entries,
        };
        let bytes = serde_json::to_vec_pretty(&export)
            .map_err(|e| Error::storage("cannot serialize cache export", e))?;
        write_atomic(destination, &bytes)
            .map_err(|e| Error::storage(format!("cannot write {}", destination.display()), e))?;
        Ok(())
    }
}

pub(crate) fn now_epoch_secs() -> f64 {
    system_time_secs(std::time::SystemTime::now())
}

pub(crate) fn system_time_secs(time: std::time::SystemTime) -> f64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
