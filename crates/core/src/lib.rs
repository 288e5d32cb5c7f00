//! Data model, template engine, diff grouper, and changeset spec builder for
//! the batch execution engine.
//!
//! This crate holds everything about a task's shape and post-execution
//! transformation that does not itself touch a filesystem, container
//! runtime, or git checkout; those live in [`batchforge_workspace`],
//! [`batchforge_container`], and [`batchforge_vcs`] respectively and are
//! driven by `batchforge-executor`.

pub mod cache_key;
pub mod changeset_builder;
pub mod diff_grouper;
pub mod error;
pub mod model;
pub mod template;
pub mod validation;

pub use cache_key::ExecutionCacheKey;
pub use changeset_builder::{build_spec, resolve_published, AUTO_AUTHOR_EMAIL, AUTO_AUTHOR_NAME};
pub use error::{Error, Result};
pub use model::{
    BatchChangeAttributes, ChangesetSpec, ChangesetTemplate, Commit, ExecutionResult, Group,
    OutputFormat, OutputSpec, OutputValue, Published, PublishedRule, PublishedState, Repository,
    Step, StepChanges, StepEnv, StepResult, Task, TransformChanges,
};
pub use template::{ChangesetTemplateContext, StepContext, Value};
pub use validation::validate_distinct_head_refs;
