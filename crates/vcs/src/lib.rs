//! Git CLI wrapper used only inside task workspaces: initializing the
//! synthetic base commit, capturing per-step file changes, and producing the
//! final unified diff.

pub mod changes;
pub mod error;
pub mod git;

pub use changes::StepChanges;
pub use error::{Error, Result};
