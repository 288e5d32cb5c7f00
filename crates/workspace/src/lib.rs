//! Workspace Creator: materializes a mutable working directory for a task
//! from its fetched archive, using one of two strategies.

pub mod bind;
pub mod creator;
pub mod error;
pub mod extract;
pub mod mode;
pub mod volume;
pub mod handle;

pub use bind::BindWorkspace;
pub use creator::create;
pub use error::{Error, Result};
pub use mode::WorkspaceMode;
pub use volume::VolumeWorkspace;
pub use handle::{WORKSPACE_MOUNT_PATH, Workspace};
