mod common;

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/docs_project")
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).expect("Failed to create fixture dir");
    for entry in std::fs::read_dir(from).expect("Failed to read fixture dir") {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).expect("Failed to copy fixture file");
        }
    }
}

/// A private copy of the fixture project. The fixture stores its ignore
/// file as `gitignore` so it does not apply to this repository.
fn setup() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    copy_dir(&fixture_path(), dir.path());
    std::fs::rename(dir.path().join("gitignore"), dir.path().join(".gitignore"))
        .expect("Failed to install .gitignore");
    std::fs::create_dir_all(dir.path().join(".respec")).unwrap();
    dir
}

fn run_respec(project: &Path, args: &[&str]) -> (bool, String, String) {
    let respec = env!("CARGO_BIN_EXE_respec");
    let output = Command::new(respec)
        .args(args)
        .current_dir(project)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run respec");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (output.status.success(), stdout, stderr)
}

fn run_ok(project: &Path, args: &[&str]) -> String {
    let (ok, stdout, stderr) = run_respec(project, args);
    if !ok {
        panic!("respec {:?} failed:\nstderr: {}\nstdout: {}", args, stderr, stdout);
    }
    stdout
}

#[test]
fn generates_docs_for_sources_only() {
    let project = setup();
    let root = project.path();

    run_ok(root, &[]);

    let app_doc = root.join("specs/src/app.py.md");
    let rs_doc = root.join("specs/src/inventory.rs.md");
    assert!(app_doc.exists(), "Should create {}", app_doc.display());
    assert!(rs_doc.exists(), "Should create {}", rs_doc.display());
    assert!(!root.join("specs/notes.txt.md").exists());
    assert!(!root.join("specs/build").exists());

    let doc = common::read(&app_doc);
    assert!(doc.starts_with("# app.py\n"), "{doc}");
    assert!(doc.contains("Source: `src/app.py`"));
    assert!(doc.contains("Language: Python"));
    assert!(doc.contains("```python\n\"\"\"Command-line entry point"));

    assert!(root.join(".respec/cache.json").exists());
    assert_eq!(common::read(&root.join(".respec/.gitignore")), "cache.json\n");
}

#[test]
fn second_run_skips_unchanged_sources() {
    let project = setup();
    let root = project.path();

    run_ok(root, &["run"]);
    let stdout = run_ok(root, &["run"]);

    assert!(stdout.contains("skipped: 2"), "{stdout}");
    assert!(stdout.contains("updated: 0"), "{stdout}");
}

#[test]
fn regeneration_keeps_hand_written_sections() {
    let project = setup();
    let root = project.path();
    let source = root.join("src/inventory.rs");
    common::age(&source);

    run_ok(root, &[]);

    let doc_path = root.join("specs/src/inventory.rs.md");
    let mut doc = common::read(&doc_path);
    doc.push_str("\n## Design Notes\n\nQuantities never go negative.\n");
    std::fs::write(&doc_path, &doc).unwrap();

    let mut code = common::read(&source);
    code.push_str("\npub fn is_empty(items: &[Item]) -> bool {\n    items.is_empty()\n}\n");
    std::fs::write(&source, code).unwrap();

    run_ok(root, &["run", "--strategy", "merge_intelligent"]);

    let merged = common::read(&doc_path);
    assert!(merged.contains("## Design Notes\n\nQuantities never go negative."), "{merged}");
    assert!(merged.contains("pub fn is_empty"), "{merged}");

    let backups: Vec<_> = std::fs::read_dir(root.join("specs/src"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn custom_template_and_variables() {
    let project = setup();
    let root = project.path();
    common::write(root, "template.md", "# {{file_name}} by {{author}}\n");
    common::write(
        root,
        ".respec/config.toml",
        "template = \"template.md\"\noutput_dir = \"docs\"\nextensions = [\"py\"]\n",
    );

    run_ok(root, &["run", "--var", "author=Ada"]);

    assert_eq!(
        common::read(&root.join("docs/src/app.py.md")),
        "# app.py by Ada\n"
    );
    assert!(!root.join("docs/src/inventory.rs.md").exists());
}

#[test]
fn status_and_verify_report_cache() {
    let project = setup();
    let root = project.path();
    run_ok(root, &[]);

    let status = run_ok(root, &["status"]);
    assert!(status.contains("entries: 2"), "{status}");
    assert!(status.contains("integrity: ok"), "{status}");

    let verify = run_ok(root, &["verify"]);
    assert!(verify.contains("Cache OK"), "{verify}");
}

#[test]
fn verify_fails_on_corrupt_entry() {
    let project = setup();
    let root = project.path();
    run_ok(root, &[]);

    let cache_path = root.join(".respec/cache.json");
    let mut cache: serde_json::Value = serde_json::from_str(&common::read(&cache_path)).unwrap();
    cache["src/app.py"]["md5"] = serde_json::Value::from("zz");
    std::fs::write(&cache_path, serde_json::to_string(&cache).unwrap()).unwrap();

    let (ok, stdout, _) = run_respec(root, &["verify"]);
    assert!(!ok);
    assert!(stdout.contains("src/app.py: md5"), "{stdout}");
}

#[test]
fn scan_and_estimate_before_first_run() {
    let project = setup();
    let root = project.path();

    let scan = run_ok(root, &["scan"]);
    assert!(scan.contains("new: src/app.py"), "{scan}");
    assert!(!scan.contains("build/generated.py"), "{scan}");

    let estimate = run_ok(root, &["estimate"]);
    assert!(estimate.starts_with("2 of 2 files need processing"), "{estimate}");
}

#[test]
fn cleanup_drops_deleted_sources() {
    let project = setup();
    let root = project.path();
    run_ok(root, &[]);

    std::fs::remove_file(root.join("src/app.py")).unwrap();
    let stdout = run_ok(root, &["cleanup"]);
    assert!(stdout.starts_with("Removed 1 cache entry"), "{stdout}");
}

#[test]
fn export_writes_document() {
    let project = setup();
    let root = project.path();
    run_ok(root, &[]);

    run_ok(root, &["export", "cache-export.json"]);
    let exported: serde_json::Value =
        serde_json::from_str(&common::read(&root.join("cache-export.json"))).unwrap();
    assert_eq!(exported["entry_count"], 2);
}

#[test]
fn preview_prints_json() {
    let project = setup();
    let root = project.path();
    common::write(root, "base.md", "# A\n\nold\n\n## Keep\n\nmine\n");
    common::write(root, "new.md", "# A\n\nnew\n");

    let stdout = run_ok(root, &["preview", "base.md", "new.md"]);
    let preview: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(preview["strategy"], "intelligent");
    assert_eq!(
        preview["merged_preview"],
        "# A\n\nnew\n\n## Keep\n\nmine\n"
    );

    let (ok, _, _) = run_respec(root, &["preview", "base.md", "new.md", "--strategy", "bogus"]);
    assert!(!ok);
}
