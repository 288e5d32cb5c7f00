//! Errors raised by the container runtime abstraction.

/// Errors from launching or querying the external container runtime.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// The runtime binary could not be located or its `version` probe failed.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// `image inspect` failed to resolve the image to a content id.
    #[error("failed to inspect image {image:?}: {reason}")]
    ImageInspect {
        /// The image reference that was inspected.
        image: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The runtime binary could not be spawned at all (not found, permissions, etc).
    #[error("failed to spawn container runtime: {0}")]
    Spawn(#[source] std::io::Error),

    /// `volume create`/`volume rm` failed.
    #[error("volume operation failed for {volume:?}: {reason}")]
    Volume {
        /// Volume name.
        volume: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The container exited with a non-zero status.
    #[error("container exited with status {code}")]
    NonZeroExit {
        /// Process exit code.
        code: i32,
    },

    /// The run was killed because its deadline elapsed.
    #[error("container killed: deadline exceeded")]
    Timeout,

    /// The run was killed because the caller cancelled it.
    #[error("container killed: cancelled")]
    Killed,
}

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
