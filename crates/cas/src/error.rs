//! Errors raised by the archive store and execution cache.

use std::path::PathBuf;

/// Errors from this crate's storage layers.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// An I/O operation against the on-disk store failed.
    #[error("{operation} failed for {path:?}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path the operation targeted, if known.
        path: Option<PathBuf>,
        /// Name of the failing operation, for diagnostics.
        operation: String,
    },

    /// A stored blob failed its content hash re-verification on load.
    #[error("blob integrity check failed: expected {expected}, computed {computed}")]
    Integrity {
        /// The blob id the caller asked for.
        expected: String,
        /// The digest actually computed from the bytes on disk.
        computed: String,
    },

    /// A value failed structural validation (e.g. a malformed `BlobId`).
    #[error("{0}")]
    Validation(String),

    /// Archive download failed: network error, non-2xx status, or a response
    /// missing the expected `Content-Type`/`Content-Disposition` headers.
    #[error("failed to fetch archive for {repository} at {path:?}: {reason}")]
    Fetch {
        /// Repository the archive belongs to.
        repository: String,
        /// Sub-path requested, if any.
        path: Option<String>,
        /// Human-readable failure reason.
        reason: String,
    },

    /// JSON (de)serialization of a cache entry failed.
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Validation`] error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn io(operation: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
            operation: operation.to_string(),
        }
    }
}

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
