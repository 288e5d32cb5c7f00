//! Adapter erasing [`ArchiveStore`]'s fetcher type parameter so the
//! scheduler can hold one resolver handle regardless of which
//! [`ArchiveFetcher`] backs it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use batchforge_cas::{ArchiveFetcher, ArchiveKey, ArchiveRef, ArchiveStore, Error as CasError};
use tokio::sync::Mutex;

/// Checks out, fetches, and releases archives on behalf of the scheduler,
/// without exposing the underlying [`ArchiveStore`]'s fetcher type.
#[async_trait::async_trait]
pub trait ArchiveResolver: Send + Sync {
    /// Ensure `key`'s archive is present on disk and return its local path.
    /// Holds a reference on the archive until [`release`](Self::release) is
    /// called for the same key.
    async fn ensure(&self, key: &ArchiveKey) -> Result<PathBuf, CasError>;

    /// Release the reference taken by a prior [`ensure`](Self::ensure) call.
    async fn release(&self, key: &ArchiveKey) -> Result<(), CasError>;
}

/// [`ArchiveResolver`] backed by a concrete [`ArchiveStore`].
pub struct CasArchiveResolver<F: ArchiveFetcher> {
    store: Arc<ArchiveStore<F>>,
    checked_out: Mutex<HashMap<ArchiveKey, ArchiveRef<F>>>,
}

impl<F: ArchiveFetcher> CasArchiveResolver<F> {
    /// Wrap `store` for use as an [`ArchiveResolver`].
    #[must_use]
    pub fn new(store: Arc<ArchiveStore<F>>) -> Self {
        Self {
            store,
            checked_out: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl<F: ArchiveFetcher + 'static> ArchiveResolver for CasArchiveResolver<F> {
    async fn ensure(&self, key: &ArchiveKey) -> Result<PathBuf, CasError> {
        let archive_ref = self.store.checkout(key.clone()).await;
        let path = archive_ref.ensure().await?;
        self.checked_out.lock().await.insert(key.clone(), archive_ref);
        Ok(path)
    }

    async fn release(&self, key: &ArchiveKey) -> Result<(), CasError> {
        let archive_ref = self.checked_out.lock().await.remove(key);
        if let Some(archive_ref) = archive_ref {
            archive_ref.release().await?;
        }
        Ok(())
    }
}
