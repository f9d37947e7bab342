mod sections;

pub use sections::{CodeBlock, Heading, Sections, detect_sections};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::error::{Error, Result};
use sections::split_document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Replace,
    Append,
    Prepend,
    Intelligent,
}

impl MergeStrategy {
    pub const ALL: [MergeStrategy; 4] = [
        MergeStrategy::Replace,
        MergeStrategy::Append,
        MergeStrategy::Prepend,
        MergeStrategy::Intelligent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Replace => "replace",
            MergeStrategy::Append => "append",
            MergeStrategy::Prepend => "prepend",
            MergeStrategy::Intelligent => "intelligent",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        MergeStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| Error::InvalidStrategy(format!("unknown merge strategy {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeConflictKind {
    /// The same heading title sits at different nesting levels.
    HeadingLevel,
    /// Token overlap between the two texts is low.
    ContentDivergence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub kind: MergeConflictKind,
    pub severity: Severity,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergePreview {
    pub strategy: String,
    pub base_length: usize,
    pub new_length: usize,
    pub merged_length: usize,
    pub conflicts: Vec<MergeConflict>,
    pub has_conflicts: bool,
    pub merged_preview: String,
    /// Lines added and removed going from `base` to the merged text.
    pub insertions: usize,
    pub deletions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureChanges {
    pub code_blocks_before: usize,
    pub code_blocks_after: usize,
    pub code_block_count_changed: bool,
    pub frontmatter_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataDiff {
    pub headings_added: Vec<String>,
    pub headings_removed: Vec<String>,
    pub structure_changes: StructureChanges,
}

#[derive(Debug, Clone)]
pub struct ContentMerger {
    /// Below this token similarity the texts are reported as diverging.
    pub divergence_threshold: f64,
    /// Below this similarity the divergence is high severity.
    pub severe_divergence_threshold: f64,
    pub preview_chars: usize,
}

impl Default for ContentMerger {
    fn default() -> Self {
        Self {
            divergence_threshold: 0.5,
            severe_divergence_threshold: 0.2,
            preview_chars: 500,
        }
    }
}

impl ContentMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_sections(&self, text: &str) -> Sections {
        detect_sections(text)
    }

    pub fn merge(&self, base: &str, new: &str, strategy: MergeStrategy) -> String {
        match strategy {
            MergeStrategy::Replace => new.to_string(),
            MergeStrategy::Append => format!("{base}\n\n{new}"),
            MergeStrategy::Prepend => format!("{new}\n\n{base}"),
            MergeStrategy::Intelligent => intelligent_merge(base, new),
        }
    }

    pub fn merge_named(&self, base: &str, new: &str, strategy: &str) -> Result<String> {
        let strategy = strategy.parse::<MergeStrategy>()?;
        Ok(self.merge(base, new, strategy))
    }

    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = tokens(a);
        let b = tokens(b);

        if a.is_empty() && b.is_empty() {
            return 1.0;
        }

        let intersection = a.intersection(&b).count();
        let union = a.union(&b).count();
        intersection as f64 / union as f64
    }

    pub fn detect_conflicts(&self, base: &str, new: &str) -> Vec<MergeConflict> {
        let mut conflicts = heading_level_conflicts(base, new);

        let similarity = self.similarity(base, new);
        if similarity < self.divergence_threshold {
            let severity = if similarity < self.severe_divergence_threshold {
                Severity::High
            } else {
                Severity::Medium
            };
            conflicts.push(MergeConflict {
                kind: MergeConflictKind::ContentDivergence,
                severity,
                details: format!("content similarity {similarity:.2}"),
            });
        }

        conflicts
    }

    pub fn preview(&self, base: &str, new: &str, strategy: &str) -> MergePreview {
        let conflicts = self.detect_conflicts(base, new);
        let mut preview = MergePreview {
            strategy: strategy.to_string(),
            base_length: base.chars().count(),
            new_length: new.chars().count(),
            merged_length: 0,
            has_conflicts: !conflicts.is_empty(),
            conflicts,
            merged_preview: String::new(),
            insertions: 0,
            deletions: 0,
            error: None,
        };

        match self.merge_named(base, new, strategy) {
            Ok(merged) => {
                let (insertions, deletions) = line_changes(base, &merged);
                preview.merged_length = merged.chars().count();
                preview.merged_preview = merged.chars().take(self.preview_chars).collect();
                preview.insertions = insertions;
                preview.deletions = deletions;
            }
            Err(e) => {
                preview.error = Some(e.to_string());
                preview.has_conflicts = true;
            }
        }

        preview
    }

    pub fn metadata_diff(&self, base: &str, new: &str) -> MetadataDiff {
        let base_sections = detect_sections(base);
        let new_sections = detect_sections(new);

        let base_titles: BTreeSet<&str> =
            base_sections.headings.iter().map(|h| h.title.as_str()).collect();
        let new_titles: BTreeSet<&str> =
            new_sections.headings.iter().map(|h| h.title.as_str()).collect();

        let before = base_sections.code_blocks.len();
        let after = new_sections.code_blocks.len();

        MetadataDiff {
            headings_added: new_titles
                .difference(&base_titles)
                .map(|t| t.to_string())
                .collect(),
            headings_removed: base_titles
                .difference(&new_titles)
                .map(|t| t.to_string())
                .collect(),
            structure_changes: StructureChanges {
                code_blocks_before: before,
                code_blocks_after: after,
                code_block_count_changed: before != after,
                frontmatter_changed: base_sections.frontmatter != new_sections.frontmatter,
            },
        }
    }
}

/// Section union keyed by case-insensitive heading title.
///
/// Base sections keep their order; a base section whose title also appears
/// in `new` is emitted with the new heading and body. Sections only present
/// in `new` follow in their own order. Front-matter comes from `new` unless
/// it has none; text before the first heading is kept from both sides.
fn intelligent_merge(base: &str, new: &str) -> String {
    let base = split_document(base);
    let new = split_document(new);

    let mut blocks: Vec<String> = Vec::new();

    if let Some(frontmatter) = new.frontmatter.as_ref().or(base.frontmatter.as_ref()) {
        blocks.push(format!("---\n{frontmatter}\n---"));
    }

    blocks.extend(merge_preambles(&base.preamble, &new.preamble));

    let mut by_key: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (idx, section) in new.sections.iter().enumerate() {
        by_key.entry(section.key()).or_default().push_back(idx);
    }

    let mut used = vec![false; new.sections.len()];
    for section in &base.sections {
        match by_key.get_mut(&section.key()).and_then(VecDeque::pop_front) {
            Some(idx) => {
                used[idx] = true;
                blocks.push(new.sections[idx].render());
            }
            None => blocks.push(section.render()),
        }
    }

    for (section, used) in new.sections.iter().zip(used) {
        if !used {
            blocks.push(section.render());
        }
    }

    let mut merged = blocks.join("\n\n");
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged
}

fn merge_preambles(base: &str, new: &str) -> Vec<String> {
    if new.is_empty() || base.contains(new) {
        return (!base.is_empty()).then(|| base.to_string()).into_iter().collect();
    }
    if base.is_empty() || new.contains(base) {
        return vec![new.to_string()];
    }
    vec![base.to_string(), new.to_string()]
}

fn heading_level_conflicts(base: &str, new: &str) -> Vec<MergeConflict> {
    let levels = |text: &str| {
        let mut map: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for heading in detect_sections(text).headings {
            map.entry(heading.title.trim().to_lowercase())
                .or_default()
                .insert(heading.level);
        }
        map
    };

    let base_levels = levels(base);
    let new_levels = levels(new);

    base_levels
        .iter()
        .filter_map(|(title, before)| {
            let after = new_levels.get(title)?;
            (before != after).then(|| MergeConflict {
                kind: MergeConflictKind::HeadingLevel,
                severity: Severity::Medium,
                details: format!(
                    "heading {title:?} at level {} in existing content, {} in new content",
                    join_levels(before),
                    join_levels(after)
                ),
            })
        })
        .collect()
}

fn join_levels(levels: &BTreeSet<usize>) -> String {
    levels
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn line_changes(before: &str, after: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(before, after);
    diff.iter_all_changes()
        .fold((0, 0), |(ins, del), change| match change.tag() {
            ChangeTag::Insert => (ins + 1, del),
            ChangeTag::Delete => (ins, del + 1),
            ChangeTag::Equal => (ins, del),
        })
}
