//! Container runtime abstraction for the batch execution engine.
//!
//! The step runner never shells out to a container engine directly; it talks
//! to the [`ContainerRuntime`] trait, implemented by [`CliContainerRuntime`]
//! against a real `docker`-compatible binary and by
//! [`mock::MockContainerRuntime`] for tests. This keeps the daemon lifecycle
//! and the exact CLI invocation isolated behind one seam.

pub mod cli;
pub mod error;
pub mod mock;
pub mod runtime;

pub use cli::CliContainerRuntime;
pub use error::{Error, Result};
pub use mock::MockContainerRuntime;
pub use runtime::{ContainerRuntime, MountSource, RunOutcome, RunSpec};
