//! HTTP client for the mermaid.ink rendering service.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE};

use crate::config::{RenderOptions, ViewerConfig};
use crate::error::DiagramError;

/// Fetches PNG renderings of Mermaid source from a mermaid.ink compatible
/// service.
///
/// The source is URL-safe base64 encoded into the path:
/// `{base}/img/{encoded}?bgColor=transparent`.
#[derive(Debug, Clone)]
pub struct MermaidInkClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    options: RenderOptions,
}

impl MermaidInkClient {
    /// Builds a client from the viewer configuration.
    ///
    /// ## Errors
    ///
    /// Returns [`DiagramError::Transport`] if the HTTP client cannot be
    /// initialised (for example when no TLS backend is available).
    pub fn new(config: &ViewerConfig) -> Result<Self, DiagramError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DiagramError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.service_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            options: config.render_options,
        })
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// The request URL for a diagram.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use flint_lib::config::ViewerConfig;
    /// use flint_lib::mermaid::fetch::MermaidInkClient;
    ///
    /// let client = MermaidInkClient::new(&ViewerConfig::default()).unwrap();
    /// let url = client.image_url("graph TD; A-->B\n");
    /// assert!(url.starts_with("https://mermaid.ink/img/"));
    /// assert!(url.ends_with("?bgColor=transparent"));
    /// ```
    pub fn image_url(&self, source: &str) -> String {
        let encoded = URL_SAFE.encode(source.trim());
        format!("{}/img/{}?{}", self.base_url, encoded, self.options.query())
    }

    /// Requests the bitmap for `source`.
    ///
    /// Only a `200 OK` response counts as success; any other status, a
    /// transport failure or the timeout elapsing is an error.
    #[tracing::instrument(skip(self, source), fields(source_len = source.len()))]
    pub async fn fetch(&self, source: &str) -> Result<Vec<u8>, DiagramError> {
        let url = self.image_url(source);
        tracing::info!(url_len = url.len(), "Requesting diagram");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(status = status.as_u16(), "Rendering service returned error status");
            return Err(DiagramError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        tracing::debug!(len = bytes.len(), "Received diagram bitmap");
        Ok(bytes.to_vec())
    }

    fn classify(&self, err: reqwest::Error) -> DiagramError {
        if err.is_timeout() {
            tracing::warn!(timeout = ?self.timeout, "Diagram request timed out");
            DiagramError::Timeout(self.timeout)
        } else {
            tracing::warn!(error = %err, "Diagram request failed");
            DiagramError::Transport(err.to_string())
        }
    }
}
