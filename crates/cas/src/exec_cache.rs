//! Execution Cache: an on-disk key-value map from a task's cache-key digest
//! to its cached execution result.
//!
//! The cache is generic over the stored value so this crate does not need to
//! depend on `batchforge-core`'s `ExecutionResult` type; callers pass the hex
//! digest of their own [stable-serialized key](https://docs.rs/serde_json)
//! (`batchforge_core::ExecutionCacheKey::digest`) and a `Serialize +
//! DeserializeOwned` value.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// An on-disk execution cache rooted at `<cache_dir>/exec/`.
#[derive(Debug, Clone)]
pub struct ExecutionCache {
    root: PathBuf,
    /// Whether entries are gzip-compressed on disk.
    compress: bool,
}

impl ExecutionCache {
    /// Open (without yet creating) a cache rooted at `cache_dir`. Entries
    /// live under `<cache_dir>/exec/<digest>`.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: cache_dir.into().join("exec"),
            compress: true,
        }
    }

    /// Disable gzip compression — useful for tests that want to eyeball the
    /// stored JSON.
    #[must_use]
    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    /// Look up `digest`. Any failure to read or decode the entry — a
    /// truncated write, a format this binary no longer understands — is
    /// treated as a miss rather than an error.
    pub fn get<T: DeserializeOwned>(&self, digest: &str) -> Option<T> {
        let path = self.entry_path(digest);
        let raw = std::fs::read(&path).ok()?;

        let json = if self.compress {
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf).ok()?;
            buf
        } else {
            raw
        };

        match serde_json::from_slice(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(digest, error = %e, "execution cache entry failed to decode, treating as miss");
                None
            }
        }
    }

    /// Store `value` under `digest`, atomically (temp file + rename).
    ///
    /// # Errors
    /// Returns an error if serialization or the atomic write fails.
    pub fn set<T: Serialize>(&self, digest: &str, value: &T) -> crate::error::Result<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| crate::error::Error::io("create_dir_all", &self.root, e))?;

        let json = serde_json::to_vec(value)?;
        let bytes = if self.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&json)
                .map_err(|e| crate::error::Error::io("gzip", self.entry_path(digest), e))?;
            encoder
                .finish()
                .map_err(|e| crate::error::Error::io("gzip finish", self.entry_path(digest), e))?
        } else {
            json
        };

        let path = self.entry_path(digest);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| crate::error::Error::io("write", &tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| crate::error::Error::io("rename", &path, e))?;
        Ok(())
    }

    /// Remove `digest`'s entry, if present. A no-op otherwise.
    ///
    /// # Errors
    /// Returns an error if the entry exists but cannot be removed.
    pub fn clear(&self, digest: &str) -> crate::error::Result<()> {
        let path = self.entry_path(digest);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| crate::error::Error::io("remove_file", &path, e))?;
        }
        Ok(())
    }

    /// The root directory entries are stored under, for diagnostics.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: String,
        count: u32,
    }

    #[test]
    fn set_then_get_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let cache = ExecutionCache::new(tmp.path());
        let sample = Sample {
            value: "hello".into(),
            count: 3,
        };
        cache.set("digest-a", &sample).unwrap();
        let loaded: Sample = cache.get("digest-a").unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn get_on_missing_digest_is_none() {
        let tmp = TempDir::new().unwrap();
        let cache = ExecutionCache::new(tmp.path());
        let loaded: Option<Sample> = cache.get("missing");
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupted_entry_is_treated_as_miss_not_error() {
        let tmp = TempDir::new().unwrap();
        let cache = ExecutionCache::new(tmp.path());
        std::fs::create_dir_all(cache.root()).unwrap();
        std::fs::write(cache.root().join("digest-a"), b"not valid gzip json").unwrap();
        let loaded: Option<Sample> = cache.get("digest-a");
        assert!(loaded.is_none());
    }

    #[test]
    fn clear_removes_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = ExecutionCache::new(tmp.path());
        let sample = Sample {
            value: "x".into(),
            count: 1,
        };
        cache.set("digest-a", &sample).unwrap();
        cache.clear("digest-a").unwrap();
        let loaded: Option<Sample> = cache.get("digest-a");
        assert!(loaded.is_none());
    }

    #[test]
    fn clear_on_missing_digest_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let cache = ExecutionCache::new(tmp.path());
        assert!(cache.clear("never-existed").is_ok());
    }

    #[test]
    fn uncompressed_mode_stores_plain_json() {
        let tmp = TempDir::new().unwrap();
        let cache = ExecutionCache::new(tmp.path()).without_compression();
        let sample = Sample {
            value: "plain".into(),
            count: 7,
        };
        cache.set("digest-b", &sample).unwrap();
        let raw = std::fs::read(cache.root().join("digest-b")).unwrap();
        assert!(serde_json::from_slice::<Sample>(&raw).is_ok());
    }
}
