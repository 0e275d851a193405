//! The interactive-thread owner of a loaded document.
//!
//! A [`Viewer`] holds the Document Tree, the Visibility State Machine and the
//! per-diagram status table, and is the only thing that talks to the
//! [`RenderTarget`]. Diagram workers report back through the pipeline's
//! channel; [`Viewer::pump`] applies whatever has arrived without blocking.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use flint_lib::config::ViewerConfig;
//! use flint_lib::render::CommandQueue;
//! use flint_lib::viewer::Viewer;
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let mut viewer =
//!     Viewer::new(ViewerConfig::default(), CommandQueue::default(), runtime.handle().clone())
//!         .unwrap();
//! viewer.load("README.md").unwrap();
//!
//! // On every tick of the host event loop:
//! viewer.pump();
//! for command in viewer.target_mut().drain() {
//!     // draw it
//!     let _ = command;
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::runtime::Handle;
use url::Url;

use crate::config::ViewerConfig;
use crate::document::parse::DIAGRAM_LANGUAGE;
use crate::document::{Block, BlockId, BlockKind, Document};
use crate::error::{DiagramError, LoadError};
use crate::mermaid::{
    DiagramEvent, DiagramJob, DiagramPipeline, DiagramStatus, DiagramUpdate, SessionToken,
    max_display_height,
};
use crate::render::{Content, DiagramImage, NodeRef, RenderCommand, RenderTarget, Slot};
use crate::section::{TocEntry, Visibility};

/// Link schemes handed back to the shell instead of being loaded.
const EXTERNAL_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// Outcome of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// A new document was loaded.
    Loaded,
    /// The location is an external link for the shell to open.
    External(String),
    /// Nothing to navigate to.
    Unchanged,
}

/// Owns one document at a time and drives a render target.
pub struct Viewer<T: RenderTarget> {
    config: ViewerConfig,
    target: T,
    pipeline: DiagramPipeline,
    document: Document,
    visibility: Visibility,
    session: SessionToken,
    diagrams: HashMap<BlockId, DiagramStatus>,
    history: Vec<PathBuf>,
    forward: Vec<PathBuf>,
}

impl<T: RenderTarget> Viewer<T> {
    /// Creates a viewer with an empty document.
    ///
    /// Diagram workers are spawned on `runtime`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ViewerConfig, target: T, runtime: Handle) -> Result<Self, DiagramError> {
        let pipeline = DiagramPipeline::new(&config, runtime)?;
        let mut document = Document::empty();
        let visibility = Visibility::attach(&mut document);
        Ok(Self {
            config,
            target,
            pipeline,
            document,
            visibility,
            session: SessionToken::new(),
            diagrams: HashMap::new(),
            history: Vec::new(),
            forward: Vec::new(),
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn diagram_status(&self, block: BlockId) -> Option<&DiagramStatus> {
        self.diagrams.get(&block)
    }

    /// Whether every diagram of the current document reached a final state.
    pub fn is_settled(&self) -> bool {
        self.diagrams.values().all(DiagramStatus::is_terminal)
    }

    /// Reads, parses and opens a markdown file.
    ///
    /// ## Errors
    ///
    /// Returns [`LoadError::Io`] if the file cannot be read. The current
    /// document stays in place when that happens.
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.open(Document::from_markdown(&source).with_path(path));
        Ok(())
    }

    /// Replaces the current document.
    ///
    /// Results still in flight for the previous document are discarded, and
    /// its collapsed set and diagram states are dropped with it.
    pub fn open(&mut self, mut document: Document) {
        self.session.expire();
        self.session = SessionToken::new();
        self.diagrams.clear();
        self.visibility = Visibility::attach(&mut document);
        self.document = document;

        self.target.apply(RenderCommand::Clear);
        for block in self.document.blocks() {
            mount_block(&mut self.target, block);
        }

        for block in self.document.diagrams() {
            self.diagrams.insert(block.id(), DiagramStatus::Pending);
            let job = DiagramJob {
                document: self.document.id(),
                block: block.id(),
                source: block.text().to_string(),
            };
            self.pipeline.submit(job, &self.session);
        }

        tracing::info!(
            document = %self.document.id(),
            blocks = self.document.len(),
            diagrams = self.diagrams.len(),
            "Opened document"
        );
    }

    /// Collapses or expands a header. Returns `false` for unknown blocks.
    pub fn toggle(&mut self, header: BlockId) -> bool {
        self.visibility
            .toggle(&mut self.document, header, &mut self.target)
    }

    /// Handles a click on a block: headers toggle, anything else is ignored.
    pub fn activate(&mut self, block: BlockId) -> bool {
        if self.document.get(block).is_some_and(Block::is_header) {
            self.toggle(block)
        } else {
            false
        }
    }

    /// Expands whatever collapsed headers hide `block`.
    pub fn ensure_visible(&mut self, block: BlockId) -> usize {
        self.visibility
            .ensure_visible(&mut self.document, block, &mut self.target)
    }

    /// The table of contents of the current document.
    pub fn toc(&self) -> Vec<TocEntry> {
        self.visibility.toc(&self.document)
    }

    /// Reveals a block and returns its position for the host to scroll to.
    pub fn goto(&mut self, block: BlockId) -> Option<usize> {
        let position = self.document.position(block)?;
        self.ensure_visible(block);
        Some(position)
    }

    /// Applies every diagram result that has arrived. Never blocks.
    ///
    /// Returns the number of results applied to the current document.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.pipeline.try_next() {
            if self.apply_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits until every diagram of the current document is ready or
    /// failed, applying results as they arrive.
    pub async fn settle(&mut self) {
        while !self.is_settled() && self.target.is_alive() {
            match self.pipeline.next().await {
                Some(event) => {
                    self.apply_event(event);
                }
                None => break,
            }
        }
    }

    fn apply_event(&mut self, event: DiagramEvent) -> bool {
        if event.document != self.document.id() {
            tracing::debug!(block = %event.block, "Discarding result for a previous document");
            return false;
        }
        if !self.target.is_alive() {
            tracing::debug!(block = %event.block, "Render target closed; discarding result");
            return false;
        }
        let Some(status) = self.diagrams.get_mut(&event.block) else {
            return false;
        };

        let block = event.block;
        match event.update {
            DiagramUpdate::CacheHit => *status = DiagramStatus::CacheHit,
            DiagramUpdate::Fetching => *status = DiagramStatus::Fetching,
            DiagramUpdate::Ready(bitmap) => {
                let rows = self.target.terminal_size().rows;
                let max_height =
                    max_display_height(rows, self.config.height_fraction, self.config.min_height);
                self.target.apply(RenderCommand::Remove {
                    node: NodeRef::new(block, Slot::Loading),
                });
                self.target.apply(RenderCommand::Mount {
                    node: NodeRef::new(block, Slot::Image),
                    content: Content::Image(DiagramImage {
                        path: bitmap.path,
                        pixel_width: bitmap.width,
                        pixel_height: bitmap.height,
                        max_height,
                        from_cache: bitmap.from_cache,
                    }),
                    hidden: false,
                });
                tracing::debug!(%block, max_height, "Mounted diagram");
                *status = DiagramStatus::Ready;
            }
            DiagramUpdate::Failed(err) => {
                let message = err.to_string();
                self.target.apply(RenderCommand::Remove {
                    node: NodeRef::new(block, Slot::Loading),
                });
                self.target.apply(RenderCommand::Reveal {
                    node: NodeRef::new(block, Slot::Source),
                });
                self.target.apply(RenderCommand::Mount {
                    node: NodeRef::new(block, Slot::Error),
                    content: Content::Error(format!("Error: {message}")),
                    hidden: false,
                });
                *status = DiagramStatus::Failed(message);
            }
        }
        true
    }

    /// Follows a link.
    ///
    /// `http`, `https` and `mailto` links are returned to the caller as
    /// [`Navigation::External`]. Anything else is treated as a file path,
    /// resolved against the current document's directory, and loaded. The
    /// current document is pushed onto the back stack and the forward stack
    /// is cleared.
    ///
    /// ## Errors
    ///
    /// Returns [`LoadError`] if the file cannot be read; history is left
    /// untouched in that case.
    pub fn go(&mut self, location: &str) -> Result<Navigation, LoadError> {
        let path = match Url::parse(location) {
            Ok(url) if EXTERNAL_SCHEMES.contains(&url.scheme()) => {
                tracing::debug!(%location, "External link");
                return Ok(Navigation::External(location.to_string()));
            }
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .unwrap_or_else(|_| PathBuf::from(location)),
            _ => self.resolve(location),
        };

        let current = self.document.path().map(Path::to_path_buf);
        self.load(&path)?;
        if let Some(current) = current {
            if current != path {
                self.history.push(current);
                self.forward.clear();
            }
        }
        Ok(Navigation::Loaded)
    }

    /// Returns to the previous document.
    ///
    /// ## Errors
    ///
    /// Returns [`LoadError`] if the previous file can no longer be read.
    pub fn back(&mut self) -> Result<Navigation, LoadError> {
        let Some(previous) = self.history.pop() else {
            return Ok(Navigation::Unchanged);
        };
        let current = self.document.path().map(Path::to_path_buf);
        if let Err(err) = self.load(&previous) {
            self.history.push(previous);
            return Err(err);
        }
        self.forward.extend(current);
        Ok(Navigation::Loaded)
    }

    /// Re-opens the document left by [`Viewer::back`].
    ///
    /// ## Errors
    ///
    /// Returns [`LoadError`] if the file can no longer be read.
    pub fn forward(&mut self) -> Result<Navigation, LoadError> {
        let Some(next) = self.forward.pop() else {
            return Ok(Navigation::Unchanged);
        };
        let current = self.document.path().map(Path::to_path_buf);
        if let Err(err) = self.load(&next) {
            self.forward.push(next);
            return Err(err);
        }
        self.history.extend(current);
        Ok(Navigation::Loaded)
    }

    pub fn can_go_back(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_go_forward(&self) -> bool {
        !self.forward.is_empty()
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = PathBuf::from(location);
        if path.is_absolute() {
            return path;
        }
        match self.document.path().and_then(Path::parent) {
            Some(dir) => dir.join(path),
            None => path,
        }
    }
}

impl<T: RenderTarget> Drop for Viewer<T> {
    fn drop(&mut self) {
        self.session.expire();
    }
}

/// Emits the initial mount commands for one block.
fn mount_block<T: RenderTarget + ?Sized>(target: &mut T, block: &Block) {
    let id = block.id();
    let mut mount = |slot: Slot, content: Content, hidden: bool| {
        target.apply(RenderCommand::Mount {
            node: NodeRef::new(id, slot),
            content,
            hidden,
        });
    };

    match block.kind() {
        BlockKind::Header { .. } | BlockKind::Other => {
            mount(Slot::Body, Content::Text(block.text().to_string()), false);
        }
        BlockKind::Fence { language } => {
            if let Some(language) = language {
                mount(Slot::Label, Content::Text(language.clone()), false);
            }
            mount(
                Slot::Body,
                Content::Code {
                    language: language.clone(),
                    code: block.text().to_string(),
                },
                false,
            );
        }
        BlockKind::Diagram => {
            mount(Slot::Label, Content::Text(DIAGRAM_LANGUAGE.to_string()), false);
            mount(Slot::Loading, Content::Loading, false);
            mount(
                Slot::Source,
                Content::Code {
                    language: Some(DIAGRAM_LANGUAGE.to_string()),
                    code: block.text().to_string(),
                },
                true,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::EXPANDED_ICON;
    use crate::testing::RecordingTarget;
    use tempfile::TempDir;

    fn viewer() -> (Viewer<RecordingTarget>, RecordingTarget) {
        let target = RecordingTarget::new();
        let config = ViewerConfig::builder()
            .service_url("http://127.0.0.1:9")
            .cache_dir(std::env::temp_dir().join("flint-viewer-tests"))
            .build();
        let viewer = Viewer::new(config, target.clone(), Handle::current()).unwrap();
        (viewer, target)
    }

    #[tokio::test]
    async fn test_open_mounts_every_block() {
        let (mut viewer, target) = viewer();
        viewer.open(Document::new(vec![
            Block::header(1, "Title"),
            Block::fence(Some("rust"), "fn main() {}"),
            Block::paragraph("text"),
        ]));
        let blocks: Vec<_> = viewer.document().blocks().iter().map(Block::id).collect();

        assert_eq!(target.commands()[0], RenderCommand::Clear);
        let title = target.node(blocks[0], Slot::Body).unwrap();
        assert_eq!(title.content, Content::Text(format!("{EXPANDED_ICON}Title")));
        let label = target.node(blocks[1], Slot::Label).unwrap();
        assert_eq!(label.content, Content::Text("rust".into()));
        target.assert_visible(blocks[2], Slot::Body);
        assert!(viewer.is_settled());
    }

    #[tokio::test]
    async fn test_diagrams_mount_placeholder_and_hidden_source() {
        let (mut viewer, target) = viewer();
        viewer.open(Document::new(vec![Block::diagram("graph TD; A-->B")]));
        let id = viewer.document().blocks()[0].id();

        target.assert_visible(id, Slot::Loading);
        assert!(target.node(id, Slot::Source).unwrap().hidden);
        assert_eq!(
            target.node(id, Slot::Label).unwrap().content,
            Content::Text("mermaid".into())
        );
        assert_eq!(viewer.diagram_status(id), Some(&DiagramStatus::Pending));
    }

    #[tokio::test]
    async fn test_activate_only_toggles_headers() {
        let (mut viewer, target) = viewer();
        viewer.open(Document::new(vec![
            Block::header(1, "A"),
            Block::paragraph("body"),
        ]));
        let header = viewer.document().blocks()[0].id();
        let body = viewer.document().blocks()[1].id();

        assert!(!viewer.activate(body));
        assert!(viewer.activate(header));
        assert!(target.is_block_hidden(body));
        assert!(viewer.visibility().is_collapsed(header));
    }

    #[tokio::test]
    async fn test_goto_reveals_nested_block() {
        let (mut viewer, target) = viewer();
        viewer.open(Document::new(vec![
            Block::header(1, "A"),
            Block::header(2, "B"),
            Block::paragraph("deep"),
        ]));
        let ids: Vec<_> = viewer.document().blocks().iter().map(Block::id).collect();
        viewer.toggle(ids[1]);
        viewer.toggle(ids[0]);
        assert!(target.is_block_hidden(ids[2]));

        assert_eq!(viewer.goto(ids[2]), Some(2));
        assert!(!target.is_block_hidden(ids[2]));
        assert!(viewer.visibility().collapsed().is_empty());
    }

    #[tokio::test]
    async fn test_stale_header_ids_are_ignored() {
        let (mut viewer, _target) = viewer();
        viewer.open(Document::new(vec![Block::header(1, "old")]));
        let old = viewer.document().blocks()[0].id();
        viewer.open(Document::new(vec![Block::header(1, "new")]));

        assert!(!viewer.toggle(old));
        assert_eq!(viewer.goto(old), None);
    }

    #[tokio::test]
    async fn test_external_links_are_not_loaded() {
        let (mut viewer, target) = viewer();
        let nav = viewer.go("https://example.com/page").unwrap();
        assert_eq!(nav, Navigation::External("https://example.com/page".into()));
        let nav = viewer.go("mailto:someone@example.com").unwrap();
        assert!(matches!(nav, Navigation::External(_)));
        assert!(target.is_empty());
    }

    #[tokio::test]
    async fn test_history_moves_back_and_forward() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A\n").unwrap();
        std::fs::write(dir.path().join("b.md"), "# B\n").unwrap();
        let (mut viewer, _target) = viewer();

        viewer.load(dir.path().join("a.md")).unwrap();
        assert_eq!(viewer.go("b.md").unwrap(), Navigation::Loaded);
        assert_eq!(viewer.document().path(), Some(dir.path().join("b.md").as_path()));
        assert!(viewer.can_go_back());

        assert_eq!(viewer.back().unwrap(), Navigation::Loaded);
        assert_eq!(viewer.document().path(), Some(dir.path().join("a.md").as_path()));
        assert!(viewer.can_go_forward());

        assert_eq!(viewer.forward().unwrap(), Navigation::Loaded);
        assert_eq!(viewer.document().path(), Some(dir.path().join("b.md").as_path()));
        assert!(!viewer.can_go_forward());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_document_and_history() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A\n").unwrap();
        let (mut viewer, _target) = viewer();
        viewer.load(dir.path().join("a.md")).unwrap();
        let before = viewer.document().id();

        let err = viewer.go("missing.md").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert_eq!(viewer.document().id(), before);
        assert!(!viewer.can_go_back());
        assert_eq!(viewer.back().unwrap(), Navigation::Unchanged);
    }
}
