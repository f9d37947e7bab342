use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: usize,
    pub title: String,
    /// 1-based line number in the original text.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sections {
    pub frontmatter: Option<String>,
    pub headings: Vec<Heading>,
    pub code_blocks: Vec<CodeBlock>,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineKind {
    Heading { level: usize, title: String },
    FenceOpen {
        language: Option<String>,
        marker: char,
        len: usize,
    },
    FenceClose,
    Code,
    Blank,
    Text,
}

pub(crate) struct Scanned<'a> {
    pub frontmatter: Option<String>,
    /// Number of lines consumed by the front-matter block.
    pub offset: usize,
    pub lines: Vec<(&'a str, LineKind)>,
}

pub(crate) fn scan(text: &str) -> Scanned<'_> {
    let all: Vec<&str> = text.lines().collect();
    let (frontmatter, offset) = split_frontmatter(&all);

    let mut fence: Option<(char, usize)> = None;
    let mut lines = Vec::with_capacity(all.len() - offset);

    for &line in &all[offset..] {
        let kind = match fence {
            Some((marker, len)) => {
                if is_fence_close(line, marker, len) {
                    fence = None;
                    LineKind::FenceClose
                } else {
                    LineKind::Code
                }
            }
            None => {
                if let Some((marker, len, language)) = fence_open(line) {
                    fence = Some((marker, len));
                    LineKind::FenceOpen {
                        language,
                        marker,
                        len,
                    }
                } else if let Some((level, title)) = atx_heading(line) {
                    LineKind::Heading { level, title }
                } else if line.trim().is_empty() {
                    LineKind::Blank
                } else {
                    LineKind::Text
                }
            }
        };
        lines.push((line, kind));
    }

    Scanned {
        frontmatter,
        offset,
        lines,
    }
}

/// Single pass over `text` collecting front-matter, headings, fenced code
/// and paragraphs. Headings inside code fences are code, not headings.
pub fn detect_sections(text: &str) -> Sections {
    let scanned = scan(text);
    let mut sections = Sections {
        frontmatter: scanned.frontmatter,
        ..Sections::default()
    };

    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Option<(Option<String>, Vec<&str>)> = None;

    let flush = |paragraph: &mut Vec<&str>, out: &mut Vec<String>| {
        if !paragraph.is_empty() {
            out.push(paragraph.join("\n"));
            paragraph.clear();
        }
    };

    for (idx, (line, kind)) in scanned.lines.into_iter().enumerate() {
        match kind {
            LineKind::Heading { level, title } => {
                flush(&mut paragraph, &mut sections.paragraphs);
                sections.headings.push(Heading {
                    level,
                    title,
                    line: scanned.offset + idx + 1,
                });
            }
            LineKind::FenceOpen { language, .. } => {
                flush(&mut paragraph, &mut sections.paragraphs);
                code = Some((language, Vec::new()));
            }
            LineKind::Code => {
                if let Some((_, body)) = code.as_mut() {
                    body.push(line);
                }
            }
            LineKind::FenceClose => {
                if let Some((language, body)) = code.take() {
                    sections.code_blocks.push(CodeBlock {
                        language,
                        content: body.join("\n"),
                    });
                }
            }
            LineKind::Blank => flush(&mut paragraph, &mut sections.paragraphs),
            LineKind::Text => paragraph.push(line.trim()),
        }
    }

    flush(&mut paragraph, &mut sections.paragraphs);
    if let Some((language, body)) = code {
        sections.code_blocks.push(CodeBlock {
            language,
            content: body.join("\n"),
        });
    }

    sections
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Document {
    pub frontmatter: Option<String>,
    pub preamble: String,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone)]
pub(crate) struct Section {
    pub title: String,
    pub heading_line: String,
    pub body: String,
}

impl Section {
    /// Sections match across documents by case-insensitive title.
    pub fn key(&self) -> String {
        self.title.trim().to_lowercase()
    }

    pub fn render(&self) -> String {
        if self.body.is_empty() {
            self.heading_line.clone()
        } else {
            format!("{}\n\n{}", self.heading_line, self.body)
        }
    }
}

pub(crate) fn split_document(text: &str) -> Document {
    let scanned = scan(text);
    let mut doc = Document {
        frontmatter: scanned.frontmatter,
        ..Document::default()
    };

    let mut preamble: Vec<&str> = Vec::new();
    let mut current: Option<(String, String, Vec<&str>)> = None;
    let mut open_fence: Option<(char, usize)> = None;

    for (line, kind) in scanned.lines {
        match &kind {
            LineKind::FenceOpen { marker, len, .. } => open_fence = Some((*marker, *len)),
            LineKind::FenceClose => open_fence = None,
            _ => {}
        }

        if let LineKind::Heading { title, .. } = kind {
            if let Some((title, heading_line, body)) = current.take() {
                doc.sections.push(Section {
                    title,
                    heading_line,
                    body: trim_blank_lines(&body),
                });
            }
            current = Some((title, line.trim_end().to_string(), Vec::new()));
            continue;
        }

        match current.as_mut() {
            Some((_, _, body)) => body.push(line),
            None => preamble.push(line),
        }
    }

    // An unterminated fence would swallow whatever gets merged after it.
    let closing = open_fence.map(|(marker, len)| marker.to_string().repeat(len));
    doc.preamble = trim_blank_lines(&preamble);
    match current {
        Some((title, heading_line, body)) => doc.sections.push(Section {
            title,
            heading_line,
            body: close_fence(trim_blank_lines(&body), closing.as_deref()),
        }),
        None => doc.preamble = close_fence(doc.preamble, closing.as_deref()),
    }

    doc
}

fn close_fence(body: String, closing: Option<&str>) -> String {
    match closing {
        Some(closing) => format!("{body}\n{closing}"),
        None => body,
    }
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

fn split_frontmatter(lines: &[&str]) -> (Option<String>, usize) {
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return (None, 0);
    }

    for (idx, line) in lines.iter().enumerate().skip(1) {
        let line = line.trim_end();
        if line == "---" || line == "..." {
            return (Some(lines[1..idx].join("\n")), idx + 1);
        }
    }

    (None, 0)
}

fn indent_ok(line: &str, trimmed: &str) -> bool {
    line.len() - trimmed.len() <= 3
}

fn fence_open(line: &str) -> Option<(char, usize, Option<String>)> {
    let trimmed = line.trim_start();
    if !indent_ok(line, trimmed) {
        return None;
    }

    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }

    let info = trimmed[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }

    let language = info.split_whitespace().next().map(str::to_string);
    Some((marker, len, language))
}

fn is_fence_close(line: &str, marker: char, len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= len && trimmed.chars().all(|c| c == marker)
}

fn atx_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    if !indent_ok(line, trimmed) {
        return None;
    }

    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }

    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    let title = rest.trim();
    let without_closing = title.trim_end_matches('#');
    let title = if without_closing.is_empty() || without_closing.ends_with([' ', '\t']) {
        without_closing.trim_end()
    } else {
        title
    };

    Some((level, title.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_carry_levels_and_lines() {
        let sections = detect_sections("# Title\n\nintro\n\n## Usage ##\n\nrun it\n");
        let headings: Vec<_> = sections
            .headings
            .iter()
            .map(|h| (h.level, h.title.as_str(), h.line))
            .collect();
        assert_eq!(headings, vec![(1, "Title", 1), (2, "Usage", 5)]);
        assert_eq!(sections.paragraphs, vec!["intro", "run it"]);
    }

    #[test]
    fn hashes_inside_fences_are_code() {
        let text = "```python\n# not a heading\nprint(1)\n```\n";
        let sections = detect_sections(text);
        assert!(sections.headings.is_empty());
        assert_eq!(sections.code_blocks.len(), 1);
        assert_eq!(sections.code_blocks[0].language.as_deref(), Some("python"));
        assert_eq!(sections.code_blocks[0].content, "# not a heading\nprint(1)");
    }

    #[test]
    fn frontmatter_only_when_leading() {
        let with = detect_sections("---\ntitle: x\n---\n# H\n");
        assert_eq!(with.frontmatter.as_deref(), Some("title: x"));
        assert_eq!(with.headings[0].line, 4);

        let without = detect_sections("text\n---\ntitle: x\n---\n");
        assert!(without.frontmatter.is_none());
    }

    #[test]
    fn unterminated_frontmatter_is_plain_text() {
        let sections = detect_sections("---\nno closing\n");
        assert!(sections.frontmatter.is_none());
    }

    #[test]
    fn hash_without_space_is_not_a_heading() {
        assert!(detect_sections("#hashtag\n").headings.is_empty());
        assert!(detect_sections("####### seven\n").headings.is_empty());
    }

    #[test]
    fn unclosed_fence_still_recorded() {
        let sections = detect_sections("```\nlet x = 1;\n");
        assert_eq!(sections.code_blocks.len(), 1);
        assert_eq!(sections.code_blocks[0].language, None);
    }

    #[test]
    fn split_closes_trailing_open_fence() {
        let doc = split_document("# A\n\n~~~~rust\nlet x = 1;\n");
        assert_eq!(doc.sections[0].body, "~~~~rust\nlet x = 1;\n~~~~");

        let doc = split_document("```\ncode\n```\n\n# B\n\ny\n");
        assert_eq!(doc.preamble, "```\ncode\n```");

        let doc = split_document("```\ncode");
        assert_eq!(doc.preamble, "```\ncode\n```");
    }

    #[test]
    fn split_keeps_preamble_and_bodies() {
        let doc = split_document("lead\n\n# A\n\nx\n\n## B\ny\n");
        assert_eq!(doc.preamble, "lead");
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].body, "x");
        assert_eq!(doc.sections[1].heading_line, "## B");
        assert_eq!(doc.sections[1].body, "y");
        assert_eq!(doc.sections[1].key(), "b");
    }
}
