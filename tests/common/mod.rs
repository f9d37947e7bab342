#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use respec::cache::CacheStore;
use respec::conflict::ConflictResolver;
use respec::detect::ChangeDetector;
use respec::events::EventBus;
use respec::pipeline::ProcessingPipeline;
use respec::services::{ContentGenerator, GeneratedFile, GenerationRequest, VersionControl};

pub fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

/// Moves the file's mtime a minute into the past so a later write is
/// guaranteed to change it.
pub fn age(path: &Path) {
    set_mtime(path, SystemTime::now() - Duration::from_secs(60));
}

pub fn cache_path(root: &Path) -> PathBuf {
    root.join(".respec").join("cache.json")
}

pub fn detector(root: &Path) -> ChangeDetector {
    ChangeDetector::new(root, CacheStore::new(cache_path(root)))
}

pub fn pipeline(root: &Path, generator: StubGenerator) -> ProcessingPipeline {
    pipeline_with_bus(root, generator, Arc::new(EventBus::default()))
}

pub fn pipeline_with_bus(
    root: &Path,
    generator: StubGenerator,
    bus: Arc<EventBus>,
) -> ProcessingPipeline {
    ProcessingPipeline::new(
        detector(root),
        ConflictResolver::default(),
        Box::new(generator),
        bus,
    )
}

/// Renders `# <file name>` plus a `## Summary` section holding the source
/// text, and one section per custom variable.
#[derive(Debug, Clone)]
pub struct StubGenerator {
    pub output_dir: PathBuf,
    fail_on: Option<(String, String)>,
}

impl StubGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, file_name: &str, message: &str) -> Self {
        self.fail_on = Some((file_name.to_string(), message.to_string()));
        self
    }

    pub fn target(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(format!("{file_name}.md"))
    }
}

pub fn render_stub(file_name: &str, source: &str) -> String {
    format!("# {file_name}\n\n## Summary\n\n{}\n", source.trim())
}

impl ContentGenerator for StubGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Vec<GeneratedFile>> {
        let name = request
            .source
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();

        if let Some((target, message)) = &self.fail_on {
            if *target == name {
                anyhow::bail!("{message}");
            }
        }

        let source = std::fs::read_to_string(request.source)?;
        let mut content = render_stub(&name, &source);
        for (key, value) in request.custom_vars {
            content.push_str(&format!("\n## {key}\n\n{value}\n"));
        }

        Ok(vec![GeneratedFile {
            name: "spec".to_string(),
            path: self.target(&name),
            content,
        }])
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingVcs {
    pub added: Arc<Mutex<Vec<PathBuf>>>,
    pub commits: Arc<Mutex<Vec<String>>>,
    pub fail_commit: bool,
}

impl RecordingVcs {
    pub fn failing() -> Self {
        Self {
            fail_commit: true,
            ..Self::default()
        }
    }
}

impl VersionControl for RecordingVcs {
    fn add_files(&self, paths: &[PathBuf]) -> anyhow::Result<()> {
        self.added.lock().unwrap().extend(paths.iter().cloned());
        Ok(())
    }

    fn commit(&self, message: &str) -> anyhow::Result<String> {
        if self.fail_commit {
            anyhow::bail!("nothing to commit, working tree clean");
        }
        let mut commits = self.commits.lock().unwrap();
        commits.push(message.to_string());
        Ok(format!("abc{:04}", commits.len()))
    }
}
