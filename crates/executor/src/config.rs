//! Scheduler configuration: a plain, validated struct the
//! caller builds and hands to [`crate::task_executor::TaskExecutor`]. This
//! crate never discovers or parses config files itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use batchforge_cas::ExecutionCache;
use batchforge_container::ContainerRuntime;
use batchforge_workspace::WorkspaceMode;

use crate::archive::ArchiveResolver;

/// Default per-task deadline: 60 minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Configuration for one [`crate::task_executor::TaskExecutor`] run.
pub struct ExecutorOpts {
    /// Number of workers drawing from the task queue concurrently. Defaults
    /// to the number of logical CPUs.
    pub parallelism: usize,
    /// Per-task deadline. A task whose steps have not all completed by this
    /// point is killed and reported as [`batchforge_core::Error::Timeout`].
    pub timeout: Duration,
    /// Execution result cache, shared across all tasks in this run.
    pub cache: Arc<ExecutionCache>,
    /// Archive resolver, shared across all tasks in this run.
    pub archives: Arc<dyn ArchiveResolver>,
    /// Container runtime used to run every step.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Workspace materialization strategy.
    pub workspace_mode: WorkspaceMode,
    /// If true, each task's cache entry is cleared before it is looked up,
    /// forcing a fresh run.
    pub clear_cache: bool,
    /// If true, per-step stdout/stderr log files are retained after a
    /// successful run instead of being deleted.
    pub keep_logs: bool,
    /// Root directory for host-side scratch space (workspace extraction,
    /// step logs). Falls back to [`crate::paths::temp_dir`]'s resolution
    /// chain when unset.
    pub temp_dir: Option<PathBuf>,
    /// If true, the first task error cancels every other in-flight and
    /// queued task; `wait` returns that one error. If false, every task
    /// runs to completion and `wait` returns the aggregate of all errors
    /// alongside every successfully produced changeset spec.
    pub skip_errors: bool,
    /// If true, a changeset template that leaves the commit author fields
    /// empty gets a well-known default author/email instead of
    /// leaving them unset for the server to assign.
    pub auto_author_details: bool,
}

impl ExecutorOpts {
    /// Effective parallelism: `parallelism` if nonzero, otherwise the number
    /// of logical CPUs (minimum 1).
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        } else {
            self.parallelism
        }
    }

    /// Effective per-task deadline: `timeout` unless it is zero, in which
    /// case [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub const fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// Effective scratch directory, resolved through [`crate::paths::temp_dir`].
    #[must_use]
    pub fn effective_temp_dir(&self) -> PathBuf {
        crate::paths::temp_dir(self.temp_dir.as_ref())
    }
}
