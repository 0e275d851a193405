//! Viewer configuration.
//!
//! Everything the diagram pipeline needs is passed in explicitly when the
//! viewer is built; nothing is discovered from global state at call time.
//!
//! ## Examples
//!
//! ```rust
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use flint_lib::config::{DiagramTheme, ViewerConfig};
//!
//! let config = ViewerConfig::builder()
//!     .cache_dir(PathBuf::from("/tmp/flint-cache"))
//!     .timeout(Duration::from_secs(3))
//!     .theme(DiagramTheme::Dark)
//!     .build();
//!
//! assert_eq!(config.timeout, Duration::from_secs(3));
//! assert_eq!(config.service_url, "https://mermaid.ink");
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Default remote rendering service.
pub const DEFAULT_SERVICE_URL: &str = "https://mermaid.ink";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of diagrams acquired concurrently.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default share of the terminal height a diagram may occupy.
pub const DEFAULT_HEIGHT_FRACTION: f32 = 0.6;

/// Default floor for a diagram's maximum display height, in cells.
pub const DEFAULT_MIN_HEIGHT: u16 = 30;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "FLINT_CACHE_DIR";

/// Built-in Mermaid themes understood by the rendering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramTheme {
    Default,
    Dark,
    Forest,
    Neutral,
}

impl DiagramTheme {
    /// Returns the theme name used in the request query string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramTheme::Default => "default",
            DiagramTheme::Dark => "dark",
            DiagramTheme::Forest => "forest",
            DiagramTheme::Neutral => "neutral",
        }
    }
}

/// Optional rendering parameters sent to the service.
///
/// Non-default options are part of the cache key, so two variants of the
/// same diagram never share a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderOptions {
    /// Output scale factor (`&scale=N`).
    pub scale: Option<u32>,
    /// Mermaid theme (`&theme=NAME`).
    pub theme: Option<DiagramTheme>,
}

impl RenderOptions {
    pub fn is_default(&self) -> bool {
        self.scale.is_none() && self.theme.is_none()
    }

    /// The request query string, without the leading `?`.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use flint_lib::config::RenderOptions;
    ///
    /// assert_eq!(RenderOptions::default().query(), "bgColor=transparent");
    /// let scaled = RenderOptions { scale: Some(2), theme: None };
    /// assert_eq!(scaled.query(), "bgColor=transparent&scale=2");
    /// ```
    pub fn query(&self) -> String {
        let mut query = String::from("bgColor=transparent");
        if let Some(scale) = self.scale {
            query.push_str(&format!("&scale={scale}"));
        }
        if let Some(theme) = self.theme {
            query.push_str(&format!("&theme={}", theme.as_str()));
        }
        query
    }
}

/// Configuration for a [`Viewer`](crate::viewer::Viewer) and its diagram pipeline.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Root directory of the content-addressed diagram cache.
    pub cache_dir: PathBuf,
    /// Base URL of the remote rendering service.
    pub service_url: String,
    /// Per-request network timeout.
    pub timeout: Duration,
    /// Maximum number of diagrams acquired at the same time.
    pub max_concurrent: usize,
    /// Share of the terminal height a diagram may occupy.
    pub height_fraction: f32,
    /// Floor for the maximum display height, in cells.
    pub min_height: u16,
    /// Extra parameters sent with every render request.
    pub render_options: RenderOptions,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            height_fraction: DEFAULT_HEIGHT_FRACTION,
            min_height: DEFAULT_MIN_HEIGHT,
            render_options: RenderOptions::default(),
        }
    }
}

impl ViewerConfig {
    pub fn builder() -> ViewerConfigBuilder {
        ViewerConfigBuilder::default()
    }
}

/// Resolves the cache root: `$FLINT_CACHE_DIR`, then the platform cache
/// directory, then `./.cache/flint`.
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("flint")
}

/// Builder for [`ViewerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ViewerConfigBuilder {
    config: ViewerConfig,
}

impl ViewerConfigBuilder {
    pub fn cache_dir(mut self, dir: PathBuf) -> Self {
        self.config.cache_dir = dir;
        self
    }

    pub fn service_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.service_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the worker pool size (minimum 1).
    pub fn max_concurrent(mut self, workers: usize) -> Self {
        self.config.max_concurrent = workers.max(1);
        self
    }

    /// Sets the height fraction, clamped to `0.0..=1.0`.
    pub fn height_fraction(mut self, fraction: f32) -> Self {
        self.config.height_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn min_height(mut self, cells: u16) -> Self {
        self.config.min_height = cells;
        self
    }

    /// Sets the scale factor (minimum 1).
    pub fn scale(mut self, scale: u32) -> Self {
        self.config.render_options.scale = Some(scale.max(1));
        self
    }

    pub fn theme(mut self, theme: DiagramTheme) -> Self {
        self.config.render_options.theme = Some(theme);
        self
    }

    pub fn build(self) -> ViewerConfig {
        self.config
    }
}
