//! The Document Tree.
//!
//! A [`Document`] is an ordered sequence of typed [`Block`]s. Blocks are owned
//! by the document for its whole lifetime; everything else (the section
//! state machine, the diagram pipeline, render commands) refers to them by
//! [`BlockId`] only.
//!
//! Identities come from a process-wide counter, so a header created by a
//! later load never compares equal to one from an earlier document.
//!
//! ## Examples
//!
//! ```rust
//! use flint_lib::document::{Block, Document};
//!
//! let doc = Document::new(vec![
//!     Block::header(1, "Intro"),
//!     Block::paragraph("Hello"),
//!     Block::diagram("graph TD; A-->B"),
//! ]);
//! assert_eq!(doc.len(), 3);
//! assert_eq!(doc.diagrams().count(), 1);
//! ```

pub mod parse;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub use parse::parse_markdown;

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, stable identity of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

impl BlockId {
    fn next() -> Self {
        Self(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block-{}", self.0)
    }
}

/// Identity of one loaded document; changes on every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    pub(crate) fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// The type of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// A heading, level 1-6.
    Header {
        /// The heading level.
        level: u8,
    },
    /// A code fence with an optional language label.
    Fence {
        /// The first token of the info string, if any.
        language: Option<String>,
    },
    /// A fence whose content is Mermaid source for the rendering service.
    Diagram,
    /// Paragraphs, lists, quotes, tables, rules and anything else.
    Other,
}

/// A node in the Document Tree.
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    kind: BlockKind,
    /// Display text: the title for headers, the code for fences and diagrams.
    text: String,
    /// Header title before any collapse icon was written.
    plain_title: Option<String>,
    /// Set while a collapsed ancestor header hides this block.
    hidden: bool,
}

impl Block {
    fn new(kind: BlockKind, text: String) -> Self {
        Self {
            id: BlockId::next(),
            kind,
            text,
            plain_title: None,
            hidden: false,
        }
    }

    /// Creates a header block. The level is clamped to 1-6.
    pub fn header<S: Into<String>>(level: u8, title: S) -> Self {
        Self::new(
            BlockKind::Header {
                level: level.clamp(1, 6),
            },
            title.into(),
        )
    }

    /// Creates a paragraph (or any other non-special) block.
    pub fn paragraph<S: Into<String>>(text: S) -> Self {
        Self::new(BlockKind::Other, text.into())
    }

    /// Creates a code fence.
    pub fn fence<S: Into<String>>(language: Option<&str>, code: S) -> Self {
        Self::new(
            BlockKind::Fence {
                language: language.map(str::to_string),
            },
            code.into(),
        )
    }

    /// Creates a Mermaid diagram fence.
    pub fn diagram<S: Into<String>>(source: S) -> Self {
        Self::new(BlockKind::Diagram, source.into())
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    /// The current display text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the heading level, or `None` for non-header blocks.
    pub fn level(&self) -> Option<u8> {
        match self.kind {
            BlockKind::Header { level } => Some(level),
            _ => None,
        }
    }

    pub fn is_header(&self) -> bool {
        self.level().is_some()
    }

    pub fn is_diagram(&self) -> bool {
        matches!(self.kind, BlockKind::Diagram)
    }

    /// Whether a collapsed ancestor currently hides this block.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// The cached pre-icon header title, once one has been recorded.
    pub fn plain_title(&self) -> Option<&str> {
        self.plain_title.as_deref()
    }

    /// Sets the hidden flag, returning `true` when it actually changed.
    pub(crate) fn set_hidden(&mut self, hidden: bool) -> bool {
        let changed = self.hidden != hidden;
        self.hidden = hidden;
        changed
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.text = text;
    }

    pub(crate) fn cache_plain_title(&mut self, title: String) {
        self.plain_title = Some(title);
    }
}

/// An ordered sequence of blocks produced by one load.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    path: Option<PathBuf>,
    blocks: Vec<Block>,
    positions: HashMap<BlockId, usize>,
}

impl Document {
    /// Creates a document from blocks in document order.
    pub fn new(blocks: Vec<Block>) -> Self {
        let positions = blocks
            .iter()
            .enumerate()
            .map(|(position, block)| (block.id, position))
            .collect();
        Self {
            id: DocumentId::next(),
            path: None,
            blocks,
            positions,
        }
    }

    /// Creates an empty document.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Parses markdown text into a document.
    pub fn from_markdown(source: &str) -> Self {
        parse_markdown(source)
    }

    /// Records the file this document was loaded from.
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the position of a block in document order.
    pub fn position(&self, id: BlockId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.position(id).map(|position| &self.blocks[position])
    }

    pub fn block_at(&self, position: usize) -> Option<&Block> {
        self.blocks.get(position)
    }

    pub(crate) fn block_at_mut(&mut self, position: usize) -> Option<&mut Block> {
        self.blocks.get_mut(position)
    }

    /// Iterates over the diagram blocks in document order.
    pub fn diagrams(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|block| block.is_diagram())
    }

    /// Iterates over the header blocks in document order.
    pub fn headers(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|block| block.is_header())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}
