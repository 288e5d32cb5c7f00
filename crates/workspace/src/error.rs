//! Errors raised while materializing or tearing down a task's workspace.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the bind and volume workspace strategies.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Extracting the fetched archive into the workspace root failed.
    #[error("failed to extract archive into {path}: {message}")]
    #[diagnostic(
        code(batchforge::workspace::extract_failed),
        help("the archive may be corrupt; a re-fetch will drop and re-download it")
    )]
    Extract {
        /// Workspace-relative destination the extraction targeted.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// An I/O operation on the workspace directory failed.
    #[error("{operation} failed for {path:?}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path the operation targeted, if known.
        path: Option<PathBuf>,
        /// Name of the failing operation.
        operation: String,
    },

    /// The volume-backed strategy could not create or remove its named
    /// docker volume.
    #[error(transparent)]
    Container(#[from] batchforge_container::Error),

    /// A git operation against the workspace failed (init, add, or commit
    /// of the base commit).
    #[error(transparent)]
    Vcs(#[from] batchforge_vcs::Error),
}

impl Error {
    pub(crate) fn io(operation: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
            operation: operation.to_string(),
        }
    }
}
