//! Markdown to [`Document`] conversion.
//!
//! Only top-level structure matters here: every top-level markdown element
//! becomes one block. Headings keep their inline text, fenced code keeps its
//! language label, and fences labelled `mermaid` become diagram blocks.
//! Everything else keeps its raw source slice.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

use super::{Block, Document};

/// The fence label that marks a diagram block.
pub const DIAGRAM_LANGUAGE: &str = "mermaid";

/// Returns `true` when a fence info string labels a Mermaid diagram.
///
/// ## Examples
///
/// ```rust
/// use flint_lib::document::parse::is_diagram_language;
///
/// assert!(is_diagram_language("mermaid"));
/// assert!(is_diagram_language("  Mermaid "));
/// assert!(!is_diagram_language("rust"));
/// ```
pub fn is_diagram_language(language: &str) -> bool {
    language.trim().eq_ignore_ascii_case(DIAGRAM_LANGUAGE)
}

enum PendingKind {
    Heading(u8),
    Code(Option<String>),
    Other,
}

struct Pending {
    kind: PendingKind,
    start: usize,
    text: String,
}

impl Pending {
    fn open(tag: &Tag<'_>, start: usize) -> Self {
        let kind = match tag {
            Tag::Heading { level, .. } => PendingKind::Heading(heading_level(*level)),
            Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
                let language = info
                    .split_whitespace()
                    .next()
                    .map(str::to_string);
                PendingKind::Code(language)
            }
            Tag::CodeBlock(CodeBlockKind::Indented) => PendingKind::Code(None),
            _ => PendingKind::Other,
        };
        Self {
            kind,
            start,
            text: String::new(),
        }
    }

    fn close(self, raw: &str) -> Block {
        match self.kind {
            PendingKind::Heading(level) => Block::header(level, self.text.trim()),
            PendingKind::Code(Some(language)) if is_diagram_language(&language) => {
                Block::diagram(self.text.trim_end_matches('\n'))
            }
            PendingKind::Code(language) => {
                Block::fence(language.as_deref(), self.text.trim_end_matches('\n'))
            }
            PendingKind::Other => Block::paragraph(raw.trim_end()),
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Parses markdown into a flat, ordered [`Document`].
///
/// ## Examples
///
/// ```rust
/// use flint_lib::document::{parse_markdown, BlockKind};
///
/// let doc = parse_markdown("# Title\n\nText\n\n```mermaid\ngraph TD; A-->B\n```\n");
/// assert_eq!(doc.len(), 3);
/// assert_eq!(doc.blocks()[0].level(), Some(1));
/// assert_eq!(doc.blocks()[2].kind(), &BlockKind::Diagram);
/// ```
#[tracing::instrument(skip(source), fields(len = source.len()))]
pub fn parse_markdown(source: &str) -> Document {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;

    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut pending: Option<Pending> = None;

    for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    pending = Some(Pending::open(&tag, range.start));
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(open) = pending.take() {
                        let raw = &source[open.start..range.end];
                        blocks.push(open.close(raw));
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(open) = pending.as_mut() {
                    open.text.push_str(&text);
                }
            }
            Event::Rule if depth == 0 => {
                blocks.push(Block::paragraph(source[range].trim_end()));
            }
            _ => {}
        }
    }

    tracing::debug!(blocks = blocks.len(), "Parsed markdown document");
    Document::new(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BlockKind;

    #[test]
    fn test_headings_keep_level_and_text() {
        let doc = parse_markdown("# One\n\n### Three `code`\n");
        assert_eq!(doc.blocks()[0].level(), Some(1));
        assert_eq!(doc.blocks()[0].text(), "One");
        assert_eq!(doc.blocks()[1].level(), Some(3));
        assert_eq!(doc.blocks()[1].text(), "Three code");
    }

    #[test]
    fn test_mermaid_fences_become_diagrams() {
        let doc = parse_markdown("```Mermaid\ngraph TD\n    A-->B\n```\n");
        assert_eq!(doc.len(), 1);
        assert!(doc.blocks()[0].is_diagram());
        assert_eq!(doc.blocks()[0].text(), "graph TD\n    A-->B");
    }

    #[test]
    fn test_other_fences_keep_their_language() {
        let doc = parse_markdown("```rust title=\"x\"\nfn main() {}\n```\n\n```\nplain\n```\n");
        assert_eq!(
            doc.blocks()[0].kind(),
            &BlockKind::Fence {
                language: Some("rust".to_string())
            }
        );
        assert_eq!(doc.blocks()[0].text(), "fn main() {}");
        assert_eq!(doc.blocks()[1].kind(), &BlockKind::Fence { language: None });
    }

    #[test]
    fn test_nested_structure_is_one_block() {
        let doc = parse_markdown("- a\n- b\n  - c\n\n> quote\n\n---\n");
        assert_eq!(doc.len(), 3);
        assert!(doc.blocks()[0].text().contains("- b"));
        assert_eq!(doc.blocks()[1].text(), "> quote");
        assert_eq!(doc.blocks()[2].text(), "---");
    }

    #[test]
    fn test_empty_source_is_empty_document() {
        assert!(parse_markdown("").is_empty());
    }
}
