//! Error taxonomy for the task scheduler.
//!
//! Every leaf-crate error composed in [`batchforge_core::Error`] is
//! re-exposed here via `#[from]`, plus the two failure modes that only arise
//! once tasks are actually scheduled: a missing/unresponsive container
//! runtime at startup, and a worker task panicking inside the join set.

/// Errors the scheduler can surface, either from one task or from startup.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// Everything the Step Runner, Workspace Creator, Archive Store, or
    /// Diff Grouper / Changeset Spec Builder can raise.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] batchforge_core::Error),

    /// The configured container runtime binary is missing or did not
    /// respond to `version` at startup.
    #[error("container runtime preflight failed: {0}")]
    #[diagnostic(
        code(batchforge::executor::preflight_failed),
        help("confirm the configured container runtime binary is installed and on PATH")
    )]
    Preflight(String),

    /// A worker task panicked instead of returning a result.
    #[error("worker task panicked: {0}")]
    TaskPanic(String),

    /// `add_task` was called after `start`, or `start`/`wait` was called
    /// more than once.
    #[error("executor already started")]
    AlreadyStarted,

    /// `wait` was called before `start`.
    #[error("executor has not been started")]
    NotStarted,

    /// Several tasks failed while `skip_errors` was set.
    #[error("{} task(s) failed", .0.len())]
    Multi(Vec<Error>),
}

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
