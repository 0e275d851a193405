//! The Visibility State Machine.
//!
//! Each header is either expanded (the default) or collapsed. The collapsed
//! set records only each header's *own* state; whether a block is hidden is
//! derived from every enclosing header. Re-expanding an ancestor therefore
//! reveals only the descendants whose own headers are still expanded.
//!
//! Header text is rewritten as `icon + plain title`. The plain title is
//! cached the first time an icon is written so icons never accumulate.
//!
//! ## Examples
//!
//! ```rust
//! use flint_lib::document::{Block, Document};
//! use flint_lib::render::CommandQueue;
//! use flint_lib::section::Visibility;
//! use flint_lib::terminal::TerminalSize;
//!
//! let mut doc = Document::new(vec![
//!     Block::header(1, "Intro"),
//!     Block::paragraph("body"),
//! ]);
//! let mut target = CommandQueue::new(TerminalSize::new(80, 24));
//! let mut visibility = Visibility::attach(&mut doc);
//! let header = doc.blocks()[0].id();
//!
//! assert!(visibility.toggle(&mut doc, header, &mut target));
//! assert!(doc.blocks()[1].is_hidden());
//! assert_eq!(doc.blocks()[0].text(), "▶ Intro");
//! ```

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::{Section, SectionIndex, TocEntry};
use crate::document::{Block, BlockId, Document, DocumentId};
use crate::render::{Content, NodeRef, RenderCommand, RenderTarget, Slot};

/// Icon written in front of an expanded header.
pub const EXPANDED_ICON: &str = "▼ ";
/// Icon written in front of a collapsed header.
pub const COLLAPSED_ICON: &str = "▶ ";

lazy_static! {
    /// Leading icons, trailing setext/ATX markers and leading newlines.
    static ref TITLE_CLEANUP: Regex = Regex::new(r"^[▼▶]\s*|\s*[#=\-]+$|^\n+").unwrap();
}

/// Strips collapse icons and stray heading markers from a header's text.
///
/// ## Examples
///
/// ```rust
/// use flint_lib::section::clean_title;
///
/// assert_eq!(clean_title("▶ Install"), "Install");
/// assert_eq!(clean_title("Usage ##"), "Usage");
/// assert_eq!(clean_title("Plain"), "Plain");
/// ```
pub fn clean_title(text: &str) -> String {
    TITLE_CLEANUP.replace_all(text, "").into_owned()
}

/// Writes `icon + plain title` into a header block and returns the new text.
fn write_icon(block: &mut Block, expanded: bool) -> String {
    let plain = match block.plain_title() {
        Some(plain) => plain.to_string(),
        None => {
            let plain = clean_title(block.text());
            block.cache_plain_title(plain.clone());
            plain
        }
    };
    let icon = if expanded { EXPANDED_ICON } else { COLLAPSED_ICON };
    let text = format!("{icon}{plain}");
    block.set_text(text.clone());
    text
}

/// Collapsed/expanded state for the headers of one document.
#[derive(Debug, Clone)]
pub struct Visibility {
    document: DocumentId,
    index: SectionIndex,
    collapsed: HashSet<BlockId>,
}

impl Visibility {
    /// Indexes a freshly loaded document and writes the expanded icon into
    /// every header.
    pub fn attach(doc: &mut Document) -> Self {
        let index = SectionIndex::build(doc);
        for section in index.sections() {
            if let Some(block) = doc.block_at_mut(section.position) {
                // Parsed titles are already clean; keep them verbatim.
                if block.plain_title().is_none() {
                    block.cache_plain_title(block.text().to_string());
                }
                write_icon(block, true);
            }
        }
        Self {
            document: doc.id(),
            index,
            collapsed: HashSet::new(),
        }
    }

    /// The document this state belongs to.
    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn index(&self) -> &SectionIndex {
        &self.index
    }

    pub fn is_collapsed(&self, header: BlockId) -> bool {
        self.collapsed.contains(&header)
    }

    /// The currently collapsed headers.
    pub fn collapsed(&self) -> &HashSet<BlockId> {
        &self.collapsed
    }

    pub fn toc(&self, doc: &Document) -> Vec<TocEntry> {
        self.index.toc(doc)
    }

    /// Locates a header in the current tree, rejecting stale identities.
    fn locate(&self, doc: &Document, header: BlockId) -> Option<Section> {
        if doc.id() != self.document {
            return None;
        }
        let section = *self.index.section(header)?;
        (doc.position(header) == Some(section.position)).then_some(section)
    }

    /// Flips one header between collapsed and expanded.
    ///
    /// Returns `false` (and changes nothing) when the header is not part of
    /// the current document.
    #[tracing::instrument(skip(self, doc, target))]
    pub fn toggle<T: RenderTarget + ?Sized>(
        &mut self,
        doc: &mut Document,
        header: BlockId,
        target: &mut T,
    ) -> bool {
        let Some(section) = self.locate(doc, header) else {
            tracing::debug!("Header not in current document; ignoring toggle");
            return false;
        };

        let collapsing = self.collapsed.insert(header);
        if !collapsing {
            self.collapsed.remove(&header);
        }
        tracing::debug!(collapsing, level = section.level, "Toggled section");

        if let Some(block) = doc.block_at_mut(section.position) {
            let text = write_icon(block, !collapsing);
            target.apply(RenderCommand::Update {
                node: NodeRef::new(header, Slot::Body),
                content: Content::Text(text),
            });
        }

        self.refresh(doc, &section, target);
        true
    }

    /// Recomputes the hidden flag of every block in a section's subtree and
    /// emits a command for each block whose flag changed.
    fn refresh<T: RenderTarget + ?Sized>(
        &self,
        doc: &mut Document,
        section: &Section,
        target: &mut T,
    ) {
        let base = doc
            .block_at(section.position)
            .is_some_and(Block::is_hidden)
            || self.is_collapsed(section.header);

        // (level, hides its subtree) for the enclosing headers.
        let mut scopes: Vec<(u8, bool)> = vec![(section.level, base)];

        for position in section.subtree() {
            let Some(block) = doc.block_at_mut(position) else {
                break;
            };
            let level = block.level();
            if let Some(level) = level {
                while scopes.len() > 1 && scopes.last().is_some_and(|&(l, _)| l >= level) {
                    scopes.pop();
                }
            }
            let hidden = scopes.last().is_some_and(|&(_, hides)| hides);
            if block.set_hidden(hidden) {
                target.apply(RenderCommand::Collapse {
                    block: block.id(),
                    hidden,
                });
            }
            if let Some(level) = level {
                let hides = hidden || self.collapsed.contains(&block.id());
                scopes.push((level, hides));
            }
        }
    }

    /// Expands whatever collapsed headers hide `block`.
    ///
    /// Walks backward from the block (inclusive). A header covers its level
    /// and every deeper one; shallower levels keep being searched, so a
    /// level-3 header found first does not stop the search for its level-2
    /// ancestor. Returns the number of headers expanded.
    #[tracing::instrument(skip(self, doc, target))]
    pub fn ensure_visible<T: RenderTarget + ?Sized>(
        &mut self,
        doc: &mut Document,
        block: BlockId,
        target: &mut T,
    ) -> usize {
        if doc.id() != self.document {
            return 0;
        }
        let Some(start) = doc.position(block) else {
            tracing::debug!("Block not in current document; nothing to reveal");
            return 0;
        };

        // Levels strictly below this value are still uncovered.
        let mut ceiling = 7u8;
        let mut ancestors = Vec::new();
        for position in (0..=start).rev() {
            if ceiling == 1 {
                break;
            }
            let Some(candidate) = doc.block_at(position) else {
                continue;
            };
            if let Some(level) = candidate.level() {
                if level < ceiling {
                    ancestors.push(candidate.id());
                    ceiling = level;
                }
            }
        }

        let mut expanded = 0;
        for header in ancestors {
            if self.is_collapsed(header) && self.toggle(doc, header, target) {
                expanded += 1;
            }
        }
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::CommandQueue;
    use crate::terminal::TerminalSize;

    fn queue() -> CommandQueue {
        CommandQueue::new(TerminalSize::new(80, 40))
    }

    /// Levels `[1, 2, 3, 2]` with body blocks interleaved.
    fn scenario() -> Document {
        Document::new(vec![
            Block::header(1, "one"),     // 0
            Block::paragraph("p0"),      // 1
            Block::header(2, "two-a"),   // 2
            Block::paragraph("p1"),      // 3
            Block::header(3, "three"),   // 4
            Block::paragraph("p2"),      // 5
            Block::header(2, "two-b"),   // 6
            Block::paragraph("p3"),      // 7
            Block::diagram("graph TD"),  // 8
        ])
    }

    fn hidden_flags(doc: &Document) -> Vec<bool> {
        doc.blocks().iter().map(Block::is_hidden).collect()
    }

    fn id(doc: &Document, position: usize) -> BlockId {
        doc.blocks()[position].id()
    }

    #[test]
    fn test_attach_writes_expanded_icons() {
        let mut doc = scenario();
        Visibility::attach(&mut doc);
        assert_eq!(doc.blocks()[0].text(), "▼ one");
        assert_eq!(doc.blocks()[0].plain_title(), Some("one"));
        assert_eq!(doc.blocks()[1].text(), "p0");
    }

    #[test]
    fn test_collapsing_second_level_two_hides_until_end() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();

        let block = id(&doc, 6);
        assert!(visibility.toggle(&mut doc, block, &mut target));
        assert_eq!(
            hidden_flags(&doc),
            vec![false, false, false, false, false, false, false, true, true]
        );
        assert_eq!(doc.blocks()[6].text(), "▶ two-b");
    }

    #[test]
    fn test_collapsing_first_level_two_stops_at_sibling() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();

        let block = id(&doc, 2);
        visibility.toggle(&mut doc, block, &mut target);
        assert_eq!(
            hidden_flags(&doc),
            vec![false, false, false, true, true, true, false, false, false]
        );
    }

    #[test]
    fn test_double_toggle_restores_state() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();
        let block = id(&doc, 4);
        visibility.toggle(&mut doc, block, &mut target);

        let before_flags = hidden_flags(&doc);
        let before_set = visibility.collapsed().clone();
        for header in [0, 2, 4, 6] {
            let header = id(&doc, header);
            visibility.toggle(&mut doc, header, &mut target);
            visibility.toggle(&mut doc, header, &mut target);
            assert_eq!(hidden_flags(&doc), before_flags);
            assert_eq!(visibility.collapsed(), &before_set);
        }
    }

    #[test]
    fn test_toggle_only_changes_its_own_membership() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();
        let block = id(&doc, 4);
        visibility.toggle(&mut doc, block, &mut target);
        let block = id(&doc, 0);
        visibility.toggle(&mut doc, block, &mut target);

        assert!(visibility.is_collapsed(id(&doc, 0)));
        assert!(visibility.is_collapsed(id(&doc, 4)));
        assert!(!visibility.is_collapsed(id(&doc, 2)));
        assert!(!visibility.is_collapsed(id(&doc, 6)));
    }

    #[test]
    fn test_expanding_ancestor_keeps_collapsed_descendant_hidden() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();

        let block = id(&doc, 4);
        visibility.toggle(&mut doc, block, &mut target); // collapse three
        let block = id(&doc, 0);
        visibility.toggle(&mut doc, block, &mut target); // collapse one
        assert!(doc.blocks()[1..].iter().all(Block::is_hidden));

        let block = id(&doc, 0);
        visibility.toggle(&mut doc, block, &mut target); // expand one
        assert_eq!(
            hidden_flags(&doc),
            vec![false, false, false, false, false, true, false, false, false]
        );
    }

    #[test]
    fn test_descendant_expanded_while_ancestor_collapsed_is_preserved() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();

        let block = id(&doc, 4);
        visibility.toggle(&mut doc, block, &mut target); // collapse three
        let block = id(&doc, 2);
        visibility.toggle(&mut doc, block, &mut target); // collapse two-a
        let block = id(&doc, 4);
        visibility.toggle(&mut doc, block, &mut target); // expand three (still hidden)
        assert!(doc.blocks()[5].is_hidden());

        let block = id(&doc, 2);
        visibility.toggle(&mut doc, block, &mut target); // expand two-a
        assert!(!doc.blocks()[5].is_hidden());
    }

    #[test]
    fn test_icons_never_accumulate() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();
        for _ in 0..5 {
            let block = id(&doc, 0);
            visibility.toggle(&mut doc, block, &mut target);
        }
        assert_eq!(doc.blocks()[0].text(), "▶ one");
    }

    #[test]
    fn test_toggle_emits_update_and_collapse_commands() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();
        let header = id(&doc, 6);
        visibility.toggle(&mut doc, header, &mut target);

        let commands: Vec<_> = target.drain().collect();
        assert_eq!(
            commands[0],
            RenderCommand::Update {
                node: NodeRef::new(header, Slot::Body),
                content: Content::Text("▶ two-b".to_string()),
            }
        );
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn test_unknown_header_is_a_no_op() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();

        let stranger = Block::header(1, "elsewhere").id();
        assert!(!visibility.toggle(&mut doc, stranger, &mut target));
        let paragraph = id(&doc, 1);
        assert!(!visibility.toggle(&mut doc, paragraph, &mut target));
        assert!(target.is_empty());
        assert!(visibility.collapsed().is_empty());
    }

    #[test]
    fn test_stale_state_ignores_reloaded_document() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut reloaded = scenario();
        let mut target = queue();
        let header = id(&reloaded, 0);
        assert!(!visibility.toggle(&mut reloaded, header, &mut target));
        assert_eq!(visibility.ensure_visible(&mut reloaded, header, &mut target), 0);
    }

    #[test]
    fn test_ensure_visible_expands_only_ancestors() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();

        let block = id(&doc, 4);
        visibility.toggle(&mut doc, block, &mut target); // three
        let block = id(&doc, 2);
        visibility.toggle(&mut doc, block, &mut target); // two-a
        let block = id(&doc, 6);
        visibility.toggle(&mut doc, block, &mut target); // two-b (sibling)
        let block = id(&doc, 0);
        visibility.toggle(&mut doc, block, &mut target); // one

        let block = id(&doc, 5);
        let expanded = visibility.ensure_visible(&mut doc, block, &mut target);
        assert_eq!(expanded, 3);
        assert!(!doc.blocks()[5].is_hidden());
        assert!(visibility.is_collapsed(id(&doc, 6)));
        assert!(doc.blocks()[7].is_hidden());
    }

    #[test]
    fn test_ensure_visible_searches_past_deeper_headers() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();

        // Collapse the level-2 ancestor of p2; the nearer level-3 header is expanded.
        let block = id(&doc, 2);
        visibility.toggle(&mut doc, block, &mut target);
        assert!(doc.blocks()[5].is_hidden());

        let block = id(&doc, 5);
        assert_eq!(visibility.ensure_visible(&mut doc, block, &mut target), 1);
        assert!(!doc.blocks()[5].is_hidden());
    }

    #[test]
    fn test_ensure_visible_on_visible_block_changes_nothing() {
        let mut doc = scenario();
        let mut visibility = Visibility::attach(&mut doc);
        let mut target = queue();
        let block = id(&doc, 6);
        visibility.toggle(&mut doc, block, &mut target);
        target.drain().for_each(drop);

        let block = id(&doc, 3);
        assert_eq!(visibility.ensure_visible(&mut doc, block, &mut target), 0);
        assert!(target.is_empty());
        assert!(visibility.is_collapsed(id(&doc, 6)));
    }

    #[test]
    fn test_attach_keeps_titles_verbatim() {
        let mut doc = Document::new(vec![Block::header(2, "C#")]);
        let mut visibility = Visibility::attach(&mut doc);
        let header = id(&doc, 0);
        visibility.toggle(&mut doc, header, &mut queue());
        assert_eq!(doc.blocks()[0].text(), "▶ C#");
    }

    #[test]
    fn test_uncached_titles_are_cleaned_on_first_write() {
        let mut block = Block::header(1, "▼ Already decorated");
        assert_eq!(write_icon(&mut block, false), "▶ Already decorated");
        assert_eq!(block.plain_title(), Some("Already decorated"));
    }

    #[test]
    fn test_title_cleanup_strips_markers() {
        assert_eq!(clean_title("▼ Heading"), "Heading");
        assert_eq!(clean_title("Heading ==="), "Heading");
        assert_eq!(clean_title("\n\nHeading"), "Heading");
    }
}
