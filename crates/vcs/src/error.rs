//! Errors raised shelling out to `git` inside a workspace.

/// Errors from this crate's git CLI wrapper.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// The `git` binary could not be spawned.
    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    /// `git <args>` exited non-zero.
    #[error("git {args} failed: {stderr}")]
    CommandFailed {
        /// The arguments git was invoked with, joined for display.
        args: String,
        /// Captured stderr.
        stderr: String,
    },
}

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
