//! The [`Workspace`] trait: the seam between the two materialization
//! strategies and everything downstream that needs a running task's file
//! changes and final diff.

use batchforge_container::MountSource;
use batchforge_vcs::StepChanges;

use crate::error::Result;

/// Conventional in-container path every step mounts a task's workspace at.
pub const WORKSPACE_MOUNT_PATH: &str = "/workspace";

/// A materialized, mutable working directory for one task, backed by either
/// a host bind-mount ([`crate::bind::BindWorkspace`]) or a named container
/// volume ([`crate::volume::VolumeWorkspace`]).
#[async_trait::async_trait]
pub trait Workspace: Send + Sync {
    /// Where this workspace lives, for attaching to a step's [`batchforge_container::RunSpec`].
    fn mount_source(&self) -> MountSource;

    /// In-container path the workspace is attached at. Always
    /// [`WORKSPACE_MOUNT_PATH`] for both strategies.
    fn container_mount_path(&self) -> &str {
        WORKSPACE_MOUNT_PATH
    }

    /// Write `files` (workspace-relative path, content) into the workspace,
    /// outside any step container, creating parent directories as needed.
    async fn write_files(&self, files: &[(String, Vec<u8>)]) -> Result<()>;

    /// File changes observed since the workspace's base commit.
    async fn changes(&self) -> Result<StepChanges>;

    /// The final unified diff against the workspace's base commit.
    async fn diff(&self) -> Result<String>;

    /// Tear down the workspace. Idempotent; safe to call after a prior
    /// failure partway through setup.
    async fn destroy(&self) -> Result<()>;
}
