use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use regex::{Captures, Regex};

use crate::detect::normalize_path;
use crate::language::Language;
use crate::services::{
    ContentGenerator, GeneratedFile, GenerationRequest, count_lines, is_binary_content,
};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
});

pub const DEFAULT_EXCERPT_LINES: usize = 40;

pub const DEFAULT_TEMPLATE: &str = "# {{file_name}}

Source: `{{relative_path}}`
Language: {{language}}
Lines: {{line_count}}

## Purpose

_Describe what `{{file_name}}` is responsible for._

## Source

```{{fence}}
{{excerpt}}
```
";

/// Renders one markdown file per source under `output_dir`, mirroring the
/// source's path relative to `root`: `src/app.py` becomes
/// `<output_dir>/src/app.py.md`.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    root: PathBuf,
    output_dir: PathBuf,
    template: String,
    excerpt_lines: usize,
}

impl TemplateGenerator {
    pub fn new(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: output_dir.into(),
            template: DEFAULT_TEMPLATE.to_string(),
            excerpt_lines: DEFAULT_EXCERPT_LINES,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_excerpt_lines(mut self, lines: usize) -> Self {
        self.excerpt_lines = lines;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn target_for(&self, source: &Path) -> PathBuf {
        let relative = source.strip_prefix(&self.root).unwrap_or(source);
        let mut name = relative.as_os_str().to_os_string();
        name.push(".md");
        self.output_dir.join(name)
    }

    fn variables(
        &self,
        source: &Path,
        text: &str,
        custom: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let relative = source.strip_prefix(&self.root).unwrap_or(source);
        let language = Language::from_path(source);

        let excerpt: Vec<&str> = text.lines().take(self.excerpt_lines).collect();

        let mut vars = BTreeMap::new();
        vars.insert(
            "file_name".to_string(),
            source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        vars.insert("relative_path".to_string(), normalize_path(relative));
        vars.insert(
            "language".to_string(),
            language.map_or("Unknown", |l| l.name()).to_string(),
        );
        vars.insert(
            "fence".to_string(),
            language.map_or("", |l| l.fence_tag()).to_string(),
        );
        vars.insert(
            "line_count".to_string(),
            count_lines(text.as_bytes()).to_string(),
        );
        vars.insert("excerpt".to_string(), excerpt.join("\n"));
        vars.insert("generated_at".to_string(), Utc::now().to_rfc3339());

        for (key, value) in custom {
            vars.insert(key.clone(), value.clone());
        }
        vars
    }
}

impl ContentGenerator for TemplateGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<Vec<GeneratedFile>> {
        let source = request.source;
        let data = std::fs::read(source)
            .with_context(|| format!("failed to read {}", source.display()))?;

        if is_binary_content(&data) {
            bail!("{} looks like a binary file", source.display());
        }

        let text = String::from_utf8_lossy(&data);
        let vars = self.variables(source, &text, request.custom_vars);
        let template = request.template.unwrap_or(&self.template);

        Ok(vec![GeneratedFile {
            name: "spec".to_string(),
            path: self.target_for(source),
            content: render(template, &vars),
        }])
    }
}

/// Substitutes `{{name}}` placeholders. Unknown names are left as written.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_and_keeps_unknown() {
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), "app".to_string());

        assert_eq!(
            render("# {{ name }} / {{missing}}", &vars),
            "# app / {{missing}}"
        );
    }

    #[test]
    fn excerpt_is_limited_to_configured_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("app.py");
        std::fs::write(&source, "one\ntwo\nthree\n").unwrap();

        let generator = TemplateGenerator::new(dir.path(), dir.path().join("specs"))
            .with_template("{{excerpt}}")
            .with_excerpt_lines(2);
        let vars = BTreeMap::new();
        let request = GenerationRequest {
            source: &source,
            template: None,
            custom_vars: &vars,
            backup_existing: false,
        };

        let files = generator.generate(&request).unwrap();
        assert_eq!(files[0].content, "one\ntwo");
    }

    #[test]
    fn target_mirrors_relative_path() {
        let generator = TemplateGenerator::new("/proj", "/proj/specs");
        assert_eq!(
            generator.target_for(Path::new("/proj/src/app.py")),
            PathBuf::from("/proj/specs/src/app.py.md")
        );
    }
}
