//! The `ContainerRuntime` trait: the one seam between the step runner and
//! whatever container engine is actually installed on the host.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Where a workspace lives for the duration of a `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// A host directory, bind-mounted into the container.
    Bind(PathBuf),
    /// A named container-engine volume.
    Volume(String),
}

/// One invocation of a container: run `command` inside `image`, with `mount`
/// made available at `container_mount_path`, working directory `workdir`
/// (typically `container_mount_path` plus the task's sub-path), and `env`
/// injected via `-e KEY=VAL`.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Image reference to run.
    pub image: String,
    /// Where the workspace is materialized.
    pub mount: MountSource,
    /// In-container path the mount is attached at.
    pub container_mount_path: String,
    /// In-container working directory for the command.
    pub workdir: String,
    /// Environment variables to inject.
    pub env: Vec<(String, String)>,
    /// Shell command, run as `/bin/sh -c '<command>'`.
    pub command: String,
    /// Additional mounts beyond `mount`, each attached at its paired
    /// in-container path. Used by the volume workspace strategy's
    /// short-lived setup and diff-extraction containers, which need both
    /// the task's volume and a host-side scratch directory attached at
    /// once.
    pub extra_mounts: Vec<(MountSource, String)>,
}

/// What came back from a `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Process exit code. Meaningless if `timed_out` or `killed` is set.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
    /// Set if the deadline elapsed before the process exited.
    pub timed_out: bool,
    /// Set if the caller's cancellation signal fired before the process exited.
    pub cancelled: bool,
}

impl RunOutcome {
    /// Whether the container exited normally with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == 0
    }
}

/// Abstraction over an external container engine CLI. Implemented by
/// [`crate::cli::CliContainerRuntime`] against a real binary and by
/// [`crate::mock::MockContainerRuntime`] for tests.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Probe that the runtime is installed and responsive. Called once at
    /// startup by the caller; implementations should not cache the result.
    async fn version(&self) -> Result<String>;

    /// Resolve `image` to its content id (`image inspect --format {{.Id}}`).
    async fn image_id(&self, image: &str) -> Result<String>;

    /// Run one container to completion, or until `deadline` elapses, or
    /// until `cancel` is signalled — whichever comes first. On timeout or
    /// cancellation the container is killed and the corresponding flag is
    /// set on the returned [`RunOutcome`] rather than raising an error;
    /// callers distinguish `TimeoutError` from `CancelError`.
    async fn run(
        &self,
        spec: RunSpec,
        deadline: Option<Duration>,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<RunOutcome>;

    /// Create a named volume. A no-op if it already exists.
    async fn volume_create(&self, name: &str) -> Result<()>;

    /// Remove a named volume. A no-op if it does not exist.
    async fn volume_remove(&self, name: &str) -> Result<()>;
}
