//! Error types for the flint library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while acquiring a diagram bitmap.
///
/// Every variant renders to a short, human-readable message which is shown
/// verbatim in the inline error annotation beneath the diagram source.
#[derive(Debug, Error)]
pub enum DiagramError {
    /// The rendering service did not answer within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The rendering service answered with something other than `200 OK`.
    #[error("rendering service returned status {0}")]
    Status(u16),

    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Transport(String),

    /// The bitmap could not be written anywhere on disk.
    #[error("failed to store diagram: {0}")]
    Storage(#[from] std::io::Error),

    /// The bitmap could not be decoded to read its dimensions.
    #[error("failed to read diagram image: {0}")]
    Decode(String),

    /// A blocking worker was cancelled or panicked.
    #[error("diagram worker interrupted: {0}")]
    Interrupted(String),
}

/// Errors raised by the content-addressed diagram cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to create the cache directory or write an entry.
    #[error("failed to write cache entry {path}: {source}")]
    Write {
        /// The entry (or directory) being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised when loading a document from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The path that was being read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_includes_code() {
        assert_eq!(
            DiagramError::Status(503).to_string(),
            "rendering service returned status 503"
        );
    }

    #[test]
    fn test_timeout_message_includes_duration() {
        let msg = DiagramError::Timeout(Duration::from_secs(5)).to_string();
        assert!(msg.contains("5s"));
    }

    #[test]
    fn test_io_errors_convert_to_storage() {
        let err: DiagramError = std::io::Error::other("disk full").into();
        assert!(matches!(err, DiagramError::Storage(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
