//! Testing utilities for code that drives a [`RenderTarget`].
//!
//! [`RecordingTarget`] records every command it receives and can replay them
//! into a simple model of the screen, so tests can assert on what is
//! currently mounted rather than on the exact command sequence.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::document::BlockId;
use crate::render::{Content, NodeRef, RenderCommand, RenderTarget, Slot};
use crate::terminal::TerminalSize;

/// The replayed state of one mounted node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub content: Content,
    pub hidden: bool,
}

/// A render target that captures commands for verification.
///
/// Clones share the same buffers, so a test can keep a handle while the
/// viewer owns another.
///
/// ## Examples
///
/// ```rust
/// use flint_lib::document::Block;
/// use flint_lib::render::{Content, NodeRef, RenderCommand, RenderTarget, Slot};
/// use flint_lib::testing::RecordingTarget;
///
/// let mut target = RecordingTarget::new();
/// let observer = target.clone();
/// let block = Block::paragraph("hi").id();
///
/// target.apply(RenderCommand::Mount {
///     node: NodeRef::new(block, Slot::Body),
///     content: Content::Text("hi".into()),
///     hidden: false,
/// });
///
/// let state = observer.node(block, Slot::Body).unwrap();
/// assert_eq!(state.content, Content::Text("hi".into()));
/// ```
#[derive(Debug, Clone)]
pub struct RecordingTarget {
    commands: Arc<Mutex<Vec<RenderCommand>>>,
    size: Arc<Mutex<TerminalSize>>,
    alive: Arc<AtomicBool>,
}

impl RecordingTarget {
    /// Creates a target reporting an 80x24 terminal.
    pub fn new() -> Self {
        Self::with_size(TerminalSize::FALLBACK)
    }

    pub fn with_size(size: TerminalSize) -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
            size: Arc::new(Mutex::new(size)),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_size(&self, size: TerminalSize) {
        *lock(&self.size) = size;
    }

    /// Simulates the hosting session going away.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// A copy of every command received so far.
    pub fn commands(&self) -> Vec<RenderCommand> {
        lock(&self.commands).clone()
    }

    /// Removes and returns every command received so far.
    pub fn take(&self) -> Vec<RenderCommand> {
        std::mem::take(&mut *lock(&self.commands))
    }

    pub fn len(&self) -> usize {
        lock(&self.commands).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.commands).is_empty()
    }

    /// Replays the recorded commands and returns the current state of a node.
    pub fn node(&self, block: BlockId, slot: Slot) -> Option<NodeState> {
        self.replay().0.remove(&NodeRef::new(block, slot))
    }

    /// Whether the last collapse command for `block` hid it.
    pub fn is_block_hidden(&self, block: BlockId) -> bool {
        self.replay().1.contains(&block)
    }

    /// Every image currently mounted.
    pub fn images(&self) -> Vec<(BlockId, Content)> {
        self.mounted_with(|c| matches!(c, Content::Image(_)))
    }

    /// Every error annotation currently mounted.
    pub fn errors(&self) -> Vec<(BlockId, Content)> {
        self.mounted_with(|c| matches!(c, Content::Error(_)))
    }

    /// Panics unless the node is mounted and visible.
    pub fn assert_visible(&self, block: BlockId, slot: Slot) {
        match self.node(block, slot) {
            Some(state) => assert!(!state.hidden, "{block} {slot:?} is mounted hidden"),
            None => panic!("{block} {slot:?} is not mounted"),
        }
    }

    /// Panics if the node is mounted.
    pub fn assert_absent(&self, block: BlockId, slot: Slot) {
        assert!(
            self.node(block, slot).is_none(),
            "{block} {slot:?} is still mounted"
        );
    }

    fn mounted_with(&self, filter: impl Fn(&Content) -> bool) -> Vec<(BlockId, Content)> {
        let mut found: Vec<_> = self
            .replay()
            .0
            .into_iter()
            .filter(|(_, state)| filter(&state.content))
            .map(|(node, state)| (node.block, state.content))
            .collect();
        found.sort_by_key(|(block, _)| *block);
        found
    }

    fn replay(&self) -> (HashMap<NodeRef, NodeState>, HashSet<BlockId>) {
        let mut nodes = HashMap::new();
        let mut hidden_blocks = HashSet::new();
        for command in lock(&self.commands).iter() {
            match command {
                RenderCommand::Clear => {
                    nodes.clear();
                    hidden_blocks.clear();
                }
                RenderCommand::Mount {
                    node,
                    content,
                    hidden,
                } => {
                    nodes.insert(
                        *node,
                        NodeState {
                            content: content.clone(),
                            hidden: *hidden,
                        },
                    );
                }
                RenderCommand::Remove { node } => {
                    nodes.remove(node);
                }
                RenderCommand::Update { node, content } => {
                    if let Some(state) = nodes.get_mut(node) {
                        state.content = content.clone();
                    }
                }
                RenderCommand::Reveal { node } => {
                    if let Some(state) = nodes.get_mut(node) {
                        state.hidden = false;
                    }
                }
                RenderCommand::Collapse { block, hidden } => {
                    if *hidden {
                        hidden_blocks.insert(*block);
                    } else {
                        hidden_blocks.remove(block);
                    }
                }
            }
        }
        (nodes, hidden_blocks)
    }
}

impl Default for RecordingTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTarget for RecordingTarget {
    fn apply(&mut self, command: RenderCommand) {
        lock(&self.commands).push(command);
    }

    fn terminal_size(&self) -> TerminalSize {
        *lock(&self.size)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Block;

    #[test]
    fn test_replay_tracks_reveal_and_remove() {
        let mut target = RecordingTarget::new();
        let block = Block::diagram("graph TD").id();
        let source = NodeRef::new(block, Slot::Source);
        let loading = NodeRef::new(block, Slot::Loading);

        target.apply(RenderCommand::Mount {
            node: loading,
            content: Content::Loading,
            hidden: false,
        });
        target.apply(RenderCommand::Mount {
            node: source,
            content: Content::Text("graph TD".into()),
            hidden: true,
        });
        assert!(target.node(block, Slot::Source).unwrap().hidden);

        target.apply(RenderCommand::Remove { node: loading });
        target.apply(RenderCommand::Reveal { node: source });
        target.assert_absent(block, Slot::Loading);
        target.assert_visible(block, Slot::Source);
    }

    #[test]
    fn test_clear_resets_the_model() {
        let mut target = RecordingTarget::new();
        let block = Block::paragraph("p").id();
        target.apply(RenderCommand::Collapse {
            block,
            hidden: true,
        });
        assert!(target.is_block_hidden(block));
        target.apply(RenderCommand::Clear);
        assert!(!target.is_block_hidden(block));
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let target = RecordingTarget::new();
        let observer = target.clone();
        target.close();
        target.set_size(TerminalSize::new(120, 50));
        assert!(!observer.is_alive());
        assert_eq!(observer.terminal_size(), TerminalSize::new(120, 50));
    }
}
