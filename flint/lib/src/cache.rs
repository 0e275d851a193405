//! Content-addressed on-disk cache for rendered diagrams.
//!
//! Entries are named `mermaid_<hash>.png`, where the hash is XXH64 of the
//! trimmed diagram source. Entries are never invalidated; identical source
//! always maps to the same file.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use xxhash_rust::xxh64::xxh64;

use crate::config::RenderOptions;
use crate::error::CacheError;

/// Stable key derived from diagram source.
///
/// ## Examples
///
/// ```rust
/// use flint_lib::cache::CacheKey;
///
/// let a = CacheKey::for_source("graph TD; A-->B\n");
/// let b = CacheKey::for_source("  graph TD; A-->B");
/// assert_eq!(a, b);
/// assert!(a.file_name().starts_with("mermaid_"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Hashes the source with surrounding whitespace removed.
    pub fn for_source(source: &str) -> Self {
        Self(xxh64(source.trim().as_bytes(), 0))
    }

    /// Hashes the source together with any non-default render options.
    ///
    /// Default options produce the same key as [`CacheKey::for_source`].
    pub fn for_request(source: &str, options: &RenderOptions) -> Self {
        if options.is_default() {
            return Self::for_source(source);
        }
        let tagged = format!("{}\n%%{}", source.trim(), options.query());
        Self(xxh64(tagged.as_bytes(), 0))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The entry's file name within the cache root.
    pub fn file_name(&self) -> String {
        format!("mermaid_{:016x}.png", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A directory of rendered diagram bitmaps.
#[derive(Debug, Clone)]
pub struct DiagramCache {
    root: PathBuf,
}

impl DiagramCache {
    /// Uses `root` as the cache directory. Nothing is created until the
    /// first write.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Returns the entry's path when it exists.
    pub fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.is_file().then_some(path)
    }

    /// Writes an entry atomically and returns its path.
    ///
    /// The bytes go to a temporary file in the cache directory which is then
    /// renamed into place, so readers never observe a partial bitmap.
    ///
    /// ## Errors
    ///
    /// Returns [`CacheError::Write`] if the directory cannot be created or
    /// the entry cannot be written.
    #[tracing::instrument(skip(self, bytes), fields(key = %key, len = bytes.len()))]
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CacheError::Write { path, source }
        };

        std::fs::create_dir_all(&self.root).map_err(write_err(&self.root))?;

        let target = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(write_err(&self.root))?;
        tmp.write_all(bytes).map_err(write_err(&target))?;
        tmp.flush().map_err(write_err(&target))?;
        tmp.persist(&target)
            .map_err(|e| CacheError::Write {
                path: target.clone(),
                source: e.error,
            })?;

        tracing::debug!(path = %target.display(), "Stored diagram in cache");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagramTheme;
    use tempfile::TempDir;

    #[test]
    fn test_key_ignores_surrounding_whitespace() {
        assert_eq!(
            CacheKey::for_source("\n graph TD; A-->B \n"),
            CacheKey::for_source("graph TD; A-->B")
        );
        assert_ne!(
            CacheKey::for_source("graph TD; A-->B"),
            CacheKey::for_source("graph TD; A-->C")
        );
    }

    #[test]
    fn test_options_change_the_key() {
        let source = "graph TD; A-->B";
        let default = CacheKey::for_request(source, &RenderOptions::default());
        assert_eq!(default, CacheKey::for_source(source));

        let dark = RenderOptions {
            scale: None,
            theme: Some(DiagramTheme::Dark),
        };
        assert_ne!(CacheKey::for_request(source, &dark), default);
    }

    #[test]
    fn test_file_name_is_fixed_width_hex() {
        let name = CacheKey(0xab).file_name();
        assert_eq!(name, "mermaid_00000000000000ab.png");
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = DiagramCache::new(dir.path().join("nested"));
        let key = CacheKey::for_source("graph LR; X-->Y");

        assert!(cache.get(&key).is_none());
        let path = cache.put(&key, b"png-bytes").unwrap();
        assert_eq!(cache.get(&key), Some(path.clone()));
        assert_eq!(std::fs::read(path).unwrap(), b"png-bytes");
    }

    #[test]
    fn test_put_overwrites_existing_entry() {
        let dir = TempDir::new().unwrap();
        let cache = DiagramCache::new(dir.path());
        let key = CacheKey::for_source("graph LR; X-->Y");

        cache.put(&key, b"first").unwrap();
        let path = cache.put(&key, b"second").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_put_fails_when_root_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let cache = DiagramCache::new(&blocker);

        let err = cache.put(&CacheKey::for_source("x"), b"bytes").unwrap_err();
        assert!(matches!(err, CacheError::Write { .. }));
    }
}
