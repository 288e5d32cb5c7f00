//! Archive Store: fetches and caches repository archives, exposing each as a
//! local zip path shared across tasks by refcount.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Identifies a repository at a specific revision, and optionally a sub-path,
/// for archive fetch/caching purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ArchiveKey {
    /// Server-assigned repository id.
    pub repo_id: String,
    /// Tip commit OID the archive should reflect.
    pub oid: String,
    /// Sub-path requested, or "" for the whole repository.
    pub path: String,
}

impl ArchiveKey {
    fn path_hash(&self) -> String {
        hex::encode(Sha256::digest(self.path.as_bytes()))
    }

    /// Filename this archive is cached under: `<repo-id>-<oid>-<path-hash>.zip`.
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}-{}-{}.zip", self.repo_id, self.oid, &self.path_hash()[..16])
    }
}

/// Fetches a single archive's bytes. Implemented by an HTTP client against the
/// remote API collaborator; an in-memory double is used in tests.
#[async_trait::async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download the archive for `key`, returning its raw zip bytes.
    async fn fetch(&self, key: &ArchiveKey) -> Result<Vec<u8>>;
}

#[derive(Default)]
struct InFlight {
    /// (repo, path) keys currently being downloaded, each behind a notifying lock.
    downloads: HashMap<ArchiveKey, Arc<Mutex<()>>>,
    refcounts: HashMap<ArchiveKey, usize>,
}

/// Caches repository archives on disk, deduplicating concurrent fetches of the
/// same `(repo, path)` and refcounting releases for optional cleanup.
pub struct ArchiveStore<F: ArchiveFetcher> {
    cache_dir: PathBuf,
    fetcher: F,
    clean_archives: bool,
    state: Mutex<InFlight>,
}

impl<F: ArchiveFetcher> ArchiveStore<F> {
    /// Create a store rooted at `cache_dir`. When `clean_archives` is true,
    /// archives are deleted once their last referencing task releases them.
    pub fn new(cache_dir: impl Into<PathBuf>, fetcher: F, clean_archives: bool) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
            clean_archives,
            state: Mutex::new(InFlight::default()),
        }
    }

    fn archive_path(&self, key: &ArchiveKey) -> PathBuf {
        self.cache_dir.join(key.filename())
    }

    /// Check out an archive reference for `key`. Registers a reference but does
    /// not fetch until [`ArchiveRef::ensure`] is called.
    pub async fn checkout(self: &Arc<Self>, key: ArchiveKey) -> ArchiveRef<F> {
        {
            let mut state = self.state.lock().await;
            *state.refcounts.entry(key.clone()).or_insert(0) += 1;
        }
        ArchiveRef {
            store: Arc::clone(self),
            key,
        }
    }

    async fn ensure(&self, key: &ArchiveKey) -> Result<PathBuf> {
        let path = self.archive_path(key);
        if path.exists() {
            return Ok(path);
        }

        let lock = {
            let mut state = self.state.lock().await;
            Arc::clone(
                state
                    .downloads
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        let _guard = lock.lock().await;
        // Another waiter may have completed the download while we awaited the lock.
        if path.exists() {
            self.forget_inflight(key).await;
            return Ok(path);
        }

        let result = self.download(key, &path).await;
        self.forget_inflight(key).await;
        result.map(|()| path)
    }

    async fn forget_inflight(&self, key: &ArchiveKey) {
        let mut state = self.state.lock().await;
        state.downloads.remove(key);
    }

    async fn download(&self, key: &ArchiveKey, dest: &Path) -> Result<()> {
        tracing::debug!(repo = %key.repo_id, path = %key.path, "downloading archive");
        let bytes = self.fetcher.fetch(key).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io("create_dir_all", parent, e))?;
        }

        let tmp = dest.with_extension("zip.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::io("write", tmp.clone(), e))?;
        tokio::fs::rename(&tmp, dest)
            .await
            .map_err(|e| Error::io("rename", dest, e))?;
        Ok(())
    }

    async fn release(&self, key: &ArchiveKey) -> Result<()> {
        let should_delete = {
            let mut state = self.state.lock().await;
            match state.refcounts.get_mut(key) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    state.refcounts.remove(key);
                    self.clean_archives
                }
                None => false,
            }
        };

        if should_delete {
            let path = self.archive_path(key);
            if path.exists() {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| Error::io("remove_file", path, e))?;
            }
        }
        Ok(())
    }
}

/// A checked-out handle to an archive. Call [`ensure`](Self::ensure) to fetch
/// (or reuse an already-fetched) local zip path; drop or call
/// [`release`](Self::release) when the task is done with it.
pub struct ArchiveRef<F: ArchiveFetcher> {
    store: Arc<ArchiveStore<F>>,
    key: ArchiveKey,
}

impl<F: ArchiveFetcher> ArchiveRef<F> {
    /// Fetch the archive if necessary and return its local path. Idempotent:
    /// subsequent calls return immediately once the archive is on disk.
    pub async fn ensure(&self) -> Result<PathBuf> {
        self.store.ensure(&self.key).await
    }

    /// Release this reference, decrementing the archive's refcount.
    ///
    /// # Errors
    /// Returns an error if file cleanup fails when the last reference is released.
    pub async fn release(self) -> Result<()> {
        self.store.release(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingFetcher {
        calls: AtomicUsize,
        payload: Vec<u8>,
    }

    #[async_trait::async_trait]
    impl ArchiveFetcher for CountingFetcher {
        async fn fetch(&self, _key: &ArchiveKey) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    fn key() -> ArchiveKey {
        ArchiveKey {
            repo_id: "repo-1".into(),
            oid: "deadbeef".into(),
            path: String::new(),
        }
    }

    #[tokio::test]
    async fn ensure_downloads_once_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            payload: b"zipbytes".to_vec(),
        };
        let store = Arc::new(ArchiveStore::new(tmp.path(), fetcher, true));

        let archive_ref = store.checkout(key()).await;
        let path1 = archive_ref.ensure().await.unwrap();
        let path2 = archive_ref.ensure().await.unwrap();
        assert_eq!(path1, path2);
        assert_eq!(store.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_without_clean_archives_keeps_the_file() {
        let tmp = TempDir::new().unwrap();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            payload: b"zipbytes".to_vec(),
        };
        let store = Arc::new(ArchiveStore::new(tmp.path(), fetcher, false));
        let archive_ref = store.checkout(key()).await;
        let path = archive_ref.ensure().await.unwrap();
        archive_ref.release().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn release_with_clean_archives_deletes_when_refcount_hits_zero() {
        let tmp = TempDir::new().unwrap();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            payload: b"zipbytes".to_vec(),
        };
        let store = Arc::new(ArchiveStore::new(tmp.path(), fetcher, true));
        let archive_ref = store.checkout(key()).await;
        let path = archive_ref.ensure().await.unwrap();
        archive_ref.release().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn shared_checkout_is_not_deleted_until_last_release() {
        let tmp = TempDir::new().unwrap();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            payload: b"zipbytes".to_vec(),
        };
        let store = Arc::new(ArchiveStore::new(tmp.path(), fetcher, true));
        let ref1 = store.checkout(key()).await;
        let ref2 = store.checkout(key()).await;
        let path = ref1.ensure().await.unwrap();

        ref1.release().await.unwrap();
        assert!(path.exists(), "one reference remains");

        ref2.release().await.unwrap();
        assert!(!path.exists(), "last reference released");
    }
}
