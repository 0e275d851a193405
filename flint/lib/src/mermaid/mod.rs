//! Diagram Acquisition Pipeline.
//!
//! Every diagram block in a loaded document becomes a [`DiagramJob`]. Jobs
//! run on a bounded pool of tokio tasks: each looks the source up in the
//! [`DiagramCache`], fetches it from the rendering service on a miss,
//! stores the bitmap and reads its dimensions. Progress is reported as
//! [`DiagramEvent`]s over a channel that the interactive thread drains with
//! [`DiagramPipeline::try_next`] or awaits with [`DiagramPipeline::next`].
//!
//! Workers never touch the render target. They only produce events; the
//! viewer applies them on the interactive thread after checking that the
//! document they belong to is still the current one.
//!
//! ## Lifecycle of one diagram
//!
//! ```text
//! Pending ─┬─> CacheHit ─────────────┬─> Ready
//!          └─> Fetching ─> (store) ──┤
//!                                    └─> Failed
//! ```

pub mod fetch;
pub mod sizing;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::cache::{CacheKey, DiagramCache};
use crate::config::ViewerConfig;
use crate::document::{BlockId, DocumentId};
use crate::error::{CacheError, DiagramError};

pub use fetch::MermaidInkClient;
pub use sizing::max_display_height;

/// Where a diagram is in its acquisition lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramStatus {
    /// Submitted, not yet picked up by a worker.
    Pending,
    /// Found in the cache; dimensions are being read.
    CacheHit,
    /// Being requested from the rendering service.
    Fetching,
    /// Mounted as an image.
    Ready,
    /// Fell back to the source text with this message.
    Failed(String),
}

impl DiagramStatus {
    /// `Ready` and `Failed` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DiagramStatus::Ready | DiagramStatus::Failed(_))
    }
}

/// A diagram to acquire.
#[derive(Debug, Clone)]
pub struct DiagramJob {
    pub document: DocumentId,
    pub block: BlockId,
    pub source: String,
}

/// A decoded bitmap on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBitmap {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub from_cache: bool,
}

/// Progress reported by a worker.
#[derive(Debug)]
pub enum DiagramUpdate {
    CacheHit,
    Fetching,
    Ready(DiagramBitmap),
    Failed(DiagramError),
}

/// A progress report for one block of one document.
#[derive(Debug)]
pub struct DiagramEvent {
    pub document: DocumentId,
    pub block: BlockId,
    pub update: DiagramUpdate,
}

/// Liveness flag shared between a loaded document and its workers.
///
/// Expiring the token makes workers that have not started their request
/// give up, and makes workers that already fetched drop their result.
#[derive(Debug, Clone)]
pub struct SessionToken(Arc<AtomicBool>);

impl SessionToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn expire(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded worker pool acquiring diagram bitmaps.
#[derive(Debug)]
pub struct DiagramPipeline {
    runtime: Handle,
    client: Arc<MermaidInkClient>,
    cache: Arc<DiagramCache>,
    permits: Arc<Semaphore>,
    tx: UnboundedSender<DiagramEvent>,
    rx: UnboundedReceiver<DiagramEvent>,
}

impl DiagramPipeline {
    /// Creates a pipeline that spawns its workers on `runtime`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ViewerConfig, runtime: Handle) -> Result<Self, DiagramError> {
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            client: Arc::new(MermaidInkClient::new(config)?),
            cache: Arc::new(DiagramCache::new(&config.cache_dir)),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            tx,
            rx,
        })
    }

    pub fn cache(&self) -> &DiagramCache {
        &self.cache
    }

    /// Queues a job. Returns immediately.
    pub fn submit(&self, job: DiagramJob, session: &SessionToken) {
        tracing::debug!(block = %job.block, document = %job.document, "Submitting diagram");
        let worker = Worker {
            client: Arc::clone(&self.client),
            cache: Arc::clone(&self.cache),
            tx: self.tx.clone(),
            session: session.clone(),
        };
        let permits = Arc::clone(&self.permits);
        self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            worker.run(job).await;
        });
    }

    /// Returns the next event if one is ready, without blocking.
    pub fn try_next(&mut self) -> Option<DiagramEvent> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<DiagramEvent> {
        self.rx.recv().await
    }
}

/// State carried by one acquisition task.
struct Worker {
    client: Arc<MermaidInkClient>,
    cache: Arc<DiagramCache>,
    tx: UnboundedSender<DiagramEvent>,
    session: SessionToken,
}

impl Worker {
    #[tracing::instrument(skip_all, fields(block = %job.block))]
    async fn run(self, job: DiagramJob) {
        if !self.session.is_active() {
            tracing::debug!("Session expired before start; dropping job");
            return;
        }

        let key = CacheKey::for_request(&job.source, self.client.options());
        let result = match self.cache.get(&key) {
            Some(path) => {
                tracing::debug!(%key, "Diagram cache hit");
                self.send(&job, DiagramUpdate::CacheHit);
                read_bitmap(path, true).await
            }
            None => {
                tracing::debug!(%key, "Diagram cache miss");
                self.send(&job, DiagramUpdate::Fetching);
                match self.client.fetch(&job.source).await {
                    Ok(bytes) => {
                        if !self.session.is_active() {
                            tracing::debug!("Session expired during fetch; discarding result");
                            return;
                        }
                        self.store_and_read(key, bytes).await
                    }
                    Err(err) => Err(err),
                }
            }
        };

        let update = match result {
            Ok(bitmap) => DiagramUpdate::Ready(bitmap),
            Err(err) => {
                tracing::warn!(error = %err, "Diagram acquisition failed");
                DiagramUpdate::Failed(err)
            }
        };
        self.send(&job, update);
    }

    async fn store_and_read(
        &self,
        key: CacheKey,
        bytes: Vec<u8>,
    ) -> Result<DiagramBitmap, DiagramError> {
        let cache = Arc::clone(&self.cache);
        let path = tokio::task::spawn_blocking(move || store(&cache, &key, &bytes))
            .await
            .map_err(|e| DiagramError::Interrupted(e.to_string()))??;
        read_bitmap(path, false).await
    }

    fn send(&self, job: &DiagramJob, update: DiagramUpdate) {
        let event = DiagramEvent {
            document: job.document,
            block: job.block,
            update,
        };
        if self.tx.send(event).is_err() {
            tracing::trace!("Pipeline receiver dropped");
        }
    }
}

/// Writes the bitmap to the cache, or to a per-key file under the system
/// temp directory when the cache cannot be written.
///
/// The fallback reuses one file per key, so repeated failures overwrite
/// rather than accumulate.
fn store(cache: &DiagramCache, key: &CacheKey, bytes: &[u8]) -> Result<PathBuf, DiagramError> {
    match cache.put(key, bytes) {
        Ok(path) => Ok(path),
        Err(err) => {
            tracing::warn!(error = %err, "Diagram cache unavailable; using a temporary file");
            fallback_cache()
                .put(key, bytes)
                .map_err(|CacheError::Write { source, .. }| DiagramError::Storage(source))
        }
    }
}

fn fallback_cache() -> DiagramCache {
    DiagramCache::new(std::env::temp_dir().join("flint"))
}

async fn read_bitmap(path: PathBuf, from_cache: bool) -> Result<DiagramBitmap, DiagramError> {
    tokio::task::spawn_blocking(move || -> Result<DiagramBitmap, DiagramError> {
        let (width, height) = dimensions(&path)?;
        Ok(DiagramBitmap {
            path,
            width,
            height,
            from_cache,
        })
    })
    .await
    .map_err(|e| DiagramError::Interrupted(e.to_string()))?
}

fn dimensions(path: &Path) -> Result<(u32, u32), DiagramError> {
    image::image_dimensions(path).map_err(|e| DiagramError::Decode(e.to_string()))
}
