use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MD5_HEX_LEN: usize = 32;
pub const SHA256_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: String,
    pub md5: String,
    pub sha256: String,
    pub size: u64,
    /// Modification time in fractional seconds since the Unix epoch.
    pub mtime: f64,
    /// When the entry was written, in fractional seconds since the Unix epoch.
    pub last_processed: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CacheEntry {
    pub fn is_stale(&self, mtime: f64, size: u64) -> bool {
        self.mtime != mtime || self.size != size
    }

    pub fn age_days(&self, now: f64) -> f64 {
        (now - self.last_processed) / 86_400.0
    }

    pub(crate) fn integrity_issues(&self, key: &str) -> Vec<String> {
        let mut issues = Vec::new();

        if !is_hex_of_len(&self.md5, MD5_HEX_LEN) {
            issues.push(format!(
                "{key}: md5 must be {MD5_HEX_LEN} hex chars, found {:?}",
                self.md5
            ));
        }
        if !is_hex_of_len(&self.sha256, SHA256_HEX_LEN) {
            issues.push(format!(
                "{key}: sha256 must be {SHA256_HEX_LEN} hex chars, found {} chars",
                self.sha256.len()
            ));
        }
        if !is_positive(self.mtime) {
            issues.push(format!("{key}: non-positive mtime {}", self.mtime));
        }
        if !is_positive(self.last_processed) {
            issues.push(format!(
                "{key}: non-positive last_processed {}",
                self.last_processed
            ));
        }
        if self.path != key {
            issues.push(format!("{key}: entry path {:?} does not match its key", self.path));
        }

        issues
    }
}

fn is_positive(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}

fn is_hex_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub total_entries: usize,
    pub total_size: u64,
    pub oldest_processed: Option<f64>,
    pub newest_processed: Option<f64>,
    pub cache_file: String,
    pub cache_file_exists: bool,
}
