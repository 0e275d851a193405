//! Collapsible markdown sections and asynchronous Mermaid diagrams for
//! terminal viewers.
//!
//! The library is the core of a terminal markdown viewer. It parses a
//! document into blocks, tracks which header sections are collapsed, and
//! renders Mermaid diagram fences into bitmaps fetched from a remote
//! service and cached on disk by content hash. It never draws anything
//! itself: every visible change is emitted as a
//! [`RenderCommand`](render::RenderCommand) for the host to apply.
//!
//! ## Modules
//!
//! - [`document`] - The Document Tree and the markdown parser adapter
//! - [`section`] - Section Index and the Visibility State Machine
//! - [`cache`] - Content-addressed diagram cache
//! - [`mermaid`] - Diagram Acquisition Pipeline
//! - [`render`] - Render commands and the render target trait
//! - [`terminal`] - Terminal size detection
//! - [`config`] - Viewer configuration
//! - [`viewer`] - Interactive-thread owner tying everything together
//! - [`error`] - Error types
//! - [`testing`] - Testing utilities for render targets

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod mermaid;
pub mod render;
pub mod section;
pub mod terminal;
pub mod viewer;

pub mod testing;

pub use config::ViewerConfig;
pub use document::{Block, BlockId, Document};
pub use error::{CacheError, DiagramError, LoadError};
pub use render::{RenderCommand, RenderTarget};
pub use viewer::{Navigation, Viewer};
