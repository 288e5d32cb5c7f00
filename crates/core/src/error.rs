//! Top-level error taxonomy for the batch execution engine.
//!
//! Every operation-specific error raised by a lower-level crate is folded
//! into one of the variants below via `#[from]`, so callers at the executor
//! boundary match on a single enum while `miette::Diagnostic` still carries
//! the original source chain through to a rendered report.

/// Errors that can terminate a task or step.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// A task's YAML/JSON spec failed to parse or was structurally invalid.
    #[error("config error: {0}")]
    Config(String),

    /// A templated expression referenced an undefined value or used a
    /// function incorrectly.
    #[error("template error: {0}")]
    Template(String),

    /// Archive fetch, refcounting, or extraction failed.
    #[error(transparent)]
    Fetch(#[from] batchforge_cas::Error),

    /// Workspace materialization (bind or volume strategy) failed.
    #[error(transparent)]
    Workspace(#[from] batchforge_workspace::Error),

    /// A git operation inside a task's workspace failed.
    #[error(transparent)]
    Vcs(#[from] batchforge_vcs::Error),

    /// The container runtime rejected or could not run a step.
    #[error(transparent)]
    Container(#[from] batchforge_container::Error),

    /// A step's command exited non-zero and the task's error policy is not
    /// `skip_errors`.
    #[error("step {index} failed with exit code {code}")]
    Step {
        /// Index of the failing step.
        index: usize,
        /// Exit code reported by the container runtime.
        code: i32,
    },

    /// A step exceeded its deadline and was killed. Message wording is
    /// fixed exactly, since downstream tests assert against it literally.
    #[error("execution in {repository} failed: Timeout reached. Execution took longer than {duration_ms}ms.")]
    Timeout {
        /// Display name of the task's repository.
        repository: String,
        /// The configured deadline, in milliseconds.
        duration_ms: u64,
    },

    /// A task was cancelled before completion.
    #[error("task cancelled")]
    Cancel,

    /// A changeset spec or its `published` rule set failed validation, e.g.
    /// two tasks produced a changeset on the same branch of the same
    /// repository.
    #[error("validation error: {0}")]
    Validation(String),

    /// Uploading a produced changeset spec to the remote batch-changes API
    /// failed. The API client itself is out of scope; this variant only
    /// carries the failure through the executor's error accounting.
    #[error("upload error: {0}")]
    Upload(String),
}

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
