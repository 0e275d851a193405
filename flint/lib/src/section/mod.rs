//! Section Index: a derived view over the Document Tree.
//!
//! Each header owns the contiguous run of blocks that follows it, up to (but
//! not including) the next header whose level is less than or equal to its
//! own, or the end of the document.
//!
//! ## Examples
//!
//! ```rust
//! use flint_lib::document::{Block, Document};
//! use flint_lib::section::SectionIndex;
//!
//! let doc = Document::new(vec![
//!     Block::header(1, "A"),
//!     Block::header(2, "B"),
//!     Block::paragraph("b body"),
//!     Block::header(1, "C"),
//! ]);
//! let index = SectionIndex::build(&doc);
//! let a = doc.blocks()[0].id();
//! assert_eq!(index.subtree(a), Some(1..3));
//! ```

pub mod visibility;

use std::collections::HashMap;
use std::ops::Range;

use crate::document::{BlockId, Document};

pub use visibility::{COLLAPSED_ICON, EXPANDED_ICON, Visibility, clean_title};

/// A header and the extent of its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// The header block.
    pub header: BlockId,
    /// The header's position in document order.
    pub position: usize,
    /// The header level (1-6).
    pub level: u8,
    /// One past the last block of the subtree.
    pub end: usize,
}

impl Section {
    /// Positions of the blocks this header hides when collapsed.
    pub fn subtree(&self) -> Range<usize> {
        self.position + 1..self.end
    }
}

/// A table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub header: BlockId,
    pub level: u8,
    /// The title without any collapse icon.
    pub title: String,
}

/// Header positions, levels and subtree ranges for one document.
#[derive(Debug, Clone, Default)]
pub struct SectionIndex {
    sections: Vec<Section>,
    by_header: HashMap<BlockId, usize>,
}

impl SectionIndex {
    /// Builds the index in a single pass.
    pub fn build(doc: &Document) -> Self {
        let mut sections: Vec<Section> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        for (position, block) in doc.blocks().iter().enumerate() {
            let Some(level) = block.level() else {
                continue;
            };
            while let Some(&top) = open.last() {
                if sections[top].level < level {
                    break;
                }
                sections[top].end = position;
                open.pop();
            }
            open.push(sections.len());
            sections.push(Section {
                header: block.id(),
                position,
                level,
                end: doc.len(),
            });
        }

        let by_header = sections
            .iter()
            .enumerate()
            .map(|(i, section)| (section.header, i))
            .collect();
        Self {
            sections,
            by_header,
        }
    }

    pub fn section(&self, header: BlockId) -> Option<&Section> {
        self.by_header.get(&header).map(|&i| &self.sections[i])
    }

    /// The block positions belonging to a header's subtree.
    pub fn subtree(&self, header: BlockId) -> Option<Range<usize>> {
        self.section(header).map(Section::subtree)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Lists every header in document order.
    pub fn toc(&self, doc: &Document) -> Vec<TocEntry> {
        self.sections
            .iter()
            .filter_map(|section| {
                let block = doc.block_at(section.position)?;
                let title = block
                    .plain_title()
                    .map(str::to_string)
                    .unwrap_or_else(|| clean_title(block.text()));
                Some(TocEntry {
                    header: section.header,
                    level: section.level,
                    title,
                })
            })
            .collect()
    }
}
