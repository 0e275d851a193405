//! The Render Target Adapter, modelled as a command queue.
//!
//! The core never touches a UI toolkit. It describes what should change as
//! [`RenderCommand`]s and hands them to a [`RenderTarget`] on the interactive
//! thread. Whatever draws the screen consumes those commands.
//!
//! Every block may own a handful of on-screen nodes, addressed by
//! [`NodeRef`]: its body, a language label, and for diagrams a loading
//! placeholder, the hidden source, the mounted image and an error note.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::document::BlockId;
use crate::terminal::TerminalSize;

/// A node slot within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Header text, paragraph text or fence code.
    Body,
    /// The language label above a fence.
    Label,
    /// The loading indicator shown while a diagram is acquired.
    Loading,
    /// The diagram source, hidden until a failure reveals it.
    Source,
    /// The rendered diagram bitmap.
    Image,
    /// The inline error annotation.
    Error,
}

/// Address of one on-screen node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub block: BlockId,
    pub slot: Slot,
}

impl NodeRef {
    pub fn new(block: BlockId, slot: Slot) -> Self {
        Self { block, slot }
    }
}

/// A rendered diagram ready to be mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramImage {
    /// Bitmap on disk.
    pub path: PathBuf,
    /// Native pixel width.
    pub pixel_width: u32,
    /// Native pixel height.
    pub pixel_height: u32,
    /// Maximum display height in terminal cells. Width auto-fits.
    pub max_height: u16,
    /// Whether the bitmap came straight from the cache.
    pub from_cache: bool,
}

/// What a node displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Code {
        language: Option<String>,
        code: String,
    },
    Loading,
    Image(DiagramImage),
    Error(String),
}

/// A single instruction for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    /// Drop everything; a new document is about to be mounted.
    Clear,
    /// Mount a node, optionally hidden.
    Mount {
        node: NodeRef,
        content: Content,
        hidden: bool,
    },
    /// Remove a previously mounted node.
    Remove { node: NodeRef },
    /// Replace a mounted node's content.
    Update { node: NodeRef, content: Content },
    /// Un-hide a node that was mounted hidden.
    Reveal { node: NodeRef },
    /// Apply or remove the collapsed flag on a whole block.
    Collapse { block: BlockId, hidden: bool },
}

/// The host runtime's side of the adapter.
///
/// Only ever called from the interactive thread.
pub trait RenderTarget {
    /// Applies one command.
    fn apply(&mut self, command: RenderCommand);

    /// The current terminal size in cells.
    fn terminal_size(&self) -> TerminalSize;

    /// Whether the hosting session is still alive. Results arriving after
    /// this turns `false` are discarded.
    fn is_alive(&self) -> bool {
        true
    }
}

/// A [`RenderTarget`] that buffers commands for a renderer to drain.
///
/// ## Examples
///
/// ```rust
/// use flint_lib::render::{CommandQueue, RenderCommand, RenderTarget};
///
/// let mut queue = CommandQueue::default();
/// queue.apply(RenderCommand::Clear);
/// assert_eq!(queue.drain().collect::<Vec<_>>(), vec![RenderCommand::Clear]);
/// assert!(queue.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct CommandQueue {
    commands: VecDeque<RenderCommand>,
    size: TerminalSize,
    alive: bool,
}

impl CommandQueue {
    pub fn new(size: TerminalSize) -> Self {
        Self {
            commands: VecDeque::new(),
            size,
            alive: true,
        }
    }

    /// Records a new terminal size, e.g. after a resize event.
    pub fn resize(&mut self, size: TerminalSize) {
        self.size = size;
    }

    /// Marks the session as torn down.
    pub fn close(&mut self) {
        self.alive = false;
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Removes and yields buffered commands in order.
    pub fn drain(&mut self) -> impl Iterator<Item = RenderCommand> + '_ {
        self.commands.drain(..)
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(TerminalSize::detect())
    }
}

impl RenderTarget for CommandQueue {
    fn apply(&mut self, command: RenderCommand) {
        if self.alive {
            self.commands.push_back(command);
        }
    }

    fn terminal_size(&self) -> TerminalSize {
        self.size
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
