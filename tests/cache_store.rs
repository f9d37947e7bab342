mod common;

use std::collections::{BTreeMap, HashSet};

use pretty_assertions::assert_eq;
use respec::cache::{CacheEntry, CacheStore};
use tempfile::TempDir;

fn entry(path: &str, last_processed: f64) -> CacheEntry {
    CacheEntry {
        path: path.to_string(),
        md5: "5d41402abc4b2a76b9719d911017c592".to_string(),
        sha256: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824".to_string(),
        size: 5,
        mtime: 1_700_000_000.5,
        last_processed,
        metadata: BTreeMap::new(),
    }
}

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

#[test]
fn saved_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = common::cache_path(dir.path());

    let mut store = CacheStore::new(&path);
    let mut first = entry("src/a.py", now());
    first
        .metadata
        .insert("language".to_string(), serde_json::Value::from("Python"));
    store.set(first.clone());
    store.set(entry("src/b.py", now()));
    assert!(store.is_dirty());
    store.save().unwrap();
    assert!(!store.is_dirty());

    let reopened = CacheStore::open(&path);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.get("src/a.py"), Some(&first));
    assert!(reopened.validate_integrity().is_empty());
}

#[test]
fn missing_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::open(common::cache_path(dir.path()));
    assert!(store.is_empty());
    assert!(!store.statistics().cache_file_exists);
}

#[test]
fn corrupt_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let path = common::write(dir.path(), ".respec/cache.json", "{ not json");

    let store = CacheStore::open(&path);
    assert!(store.is_empty());
}

#[test]
fn malformed_entry_is_dropped_and_reported() {
    let dir = TempDir::new().unwrap();
    let good = serde_json::to_value(entry("ok.py", now())).unwrap();
    let mut bad = serde_json::to_value(entry("bad.py", now())).unwrap();
    bad["size"] = serde_json::Value::from(-1);

    let document = serde_json::json!({ "ok.py": good, "bad.py": bad });
    let path = common::write(
        dir.path(),
        ".respec/cache.json",
        &serde_json::to_string(&document).unwrap(),
    );

    let store = CacheStore::open(&path);
    assert_eq!(store.len(), 1);
    assert!(store.get("ok.py").is_some());

    let issues = store.validate_integrity();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].starts_with("bad.py"), "{issues:?}");
}

#[test]
fn integrity_flags_bad_hashes_and_timestamps() {
    let mut store = CacheStore::new("unused.json");
    let mut broken = entry("x.py", 0.0);
    broken.md5 = "abc".to_string();
    store.set(broken);

    let issues = store.validate_integrity();
    assert!(issues.iter().any(|i| i.contains("md5")), "{issues:?}");
    assert!(issues.iter().any(|i| i.contains("last_processed")), "{issues:?}");
}

#[test]
fn cleanup_drops_missing_and_aged_entries() {
    let mut store = CacheStore::new("unused.json");
    let day = 86_400.0;
    store.set(entry("fresh.py", now()));
    store.set(entry("old.py", now() - 45.0 * day));
    store.set(entry("gone.py", now()));

    let existing: HashSet<String> = ["fresh.py", "old.py"].map(String::from).into();
    let removed = store.cleanup(&existing, 30.0);

    assert_eq!(removed, 2);
    assert_eq!(store.all().keys().collect::<Vec<_>>(), vec!["fresh.py"]);
}

#[test]
fn remove_and_clear() {
    let mut store = CacheStore::new("unused.json");
    store.set(entry("a.py", now()));
    store.set(entry("b.py", now()));

    assert!(store.remove("a.py"));
    assert!(!store.remove("a.py"));
    assert_eq!(store.len(), 1);

    store.clear();
    assert!(store.is_empty());
}

#[test]
fn statistics_span_processing_times() {
    let mut store = CacheStore::new("unused.json");
    store.set(entry("a.py", 1_700_000_100.0));
    store.set(entry("b.py", 1_700_000_300.0));

    let stats = store.statistics();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.total_size, 10);
    assert_eq!(stats.oldest_processed, Some(1_700_000_100.0));
    assert_eq!(stats.newest_processed, Some(1_700_000_300.0));
}

#[test]
fn export_wraps_entries() {
    let dir = TempDir::new().unwrap();
    let mut store = CacheStore::new(common::cache_path(dir.path()));
    store.set(entry("a.py", now()));

    let destination = dir.path().join("export/cache-export.json");
    store.export(&destination).unwrap();

    let exported: serde_json::Value = serde_json::from_str(&common::read(&destination)).unwrap();
    assert_eq!(exported["entry_count"], 1);
    assert!(exported["exported_at"].is_string());
    assert_eq!(exported["entries"]["a.py"]["size"], 5);
}
