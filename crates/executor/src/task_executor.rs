//! Task Executor: the scheduler that drives one run of the batch execution
//! engine.
//!
//! Tasks are held in an arena (`Vec<(TaskId, Task)>`) until [`TaskExecutor::start`]
//! drains it into a bounded-parallelism `Semaphore` + `JoinSet` dispatch: a
//! permit is acquired inside each spawned future, results are drained via
//! `join_next`, and the first failure (when `skip_errors` is false) aborts
//! every other in-flight task.
//!
//! Per task this drives: cache lookup, the Step Runner, the Diff Grouper, and
//! the Changeset Spec Builder, reporting every status transition on the
//! shared [`EventBus`] along the way.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use batchforge_core::{
    build_spec, diff_grouper, validate_distinct_head_refs, ChangesetSpec, ChangesetTemplateContext,
    ExecutionCacheKey, ExecutionResult, Task,
};
use batchforge_events::{EventBus, EventReceiver, StatusEvent, TaskId, TaskState};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorOpts;
use crate::error::{Error, Result};
use crate::step_runner::{self, StepRunnerConfig};

/// Everything one run of the scheduler produced.
#[derive(Debug, Default)]
pub struct ExecutorResult {
    /// Every changeset spec produced by every task, in completion order.
    pub specs: Vec<ChangesetSpec>,
    /// Each task's step-log directory, whether or not it was kept.
    pub log_paths: Vec<PathBuf>,
    /// The run's aggregate error, if any task (or cross-task validation)
    /// failed.
    pub error: Option<Error>,
}

/// Drives a batch of [`Task`]s to completion.
///
/// Queue tasks with [`add_task`](Self::add_task), call [`start`](Self::start)
/// once, then [`wait`](Self::wait) for the aggregate result. Subscribe to
/// [`subscribe`](Self::subscribe) at any point beforehand to observe status
/// transitions as they happen.
pub struct TaskExecutor {
    opts: Arc<ExecutorOpts>,
    events: Arc<EventBus>,
    tasks: SyncMutex<Vec<(TaskId, Task)>>,
    next_id: AtomicU64,
    started: AtomicBool,
    cancel: CancellationToken,
    handle: AsyncMutex<Option<tokio::task::JoinHandle<ExecutorResult>>>,
}

impl TaskExecutor {
    /// Build a scheduler for one run, configured by `opts`.
    #[must_use]
    pub fn new(opts: ExecutorOpts) -> Self {
        Self {
            opts: Arc::new(opts),
            events: Arc::new(EventBus::new()),
            tasks: SyncMutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handle: AsyncMutex::new(None),
        }
    }

    /// Queue `task`, returning the id it is reported under on the status
    /// channel.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyStarted`] if called after
    /// [`start`](Self::start).
    pub fn add_task(&self, task: Task) -> Result<TaskId> {
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).push((id, task));
        Ok(id)
    }

    /// Subscribe to this run's status channel. Safe to call before or after
    /// [`start`](Self::start); events sent before a given subscription are
    /// not replayed.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Cancel every queued and in-flight task. Safe to call before `start`,
    /// in which case the run completes with every task cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Preflight the container runtime and begin running every queued task
    /// with bounded parallelism.
    ///
    /// # Errors
    /// Returns [`Error::Preflight`] if the configured container runtime does
    /// not respond to `version`, or [`Error::AlreadyStarted`] if this
    /// executor has already been started.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        self.opts.runtime.version().await.map_err(|e| Error::Preflight(e.to_string()))?;

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let opts = Arc::clone(&self.opts);
        let events = Arc::clone(&self.events);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(run_all(tasks, opts, events, cancel));
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Wait for every task to finish, be cancelled, or be aborted, and
    /// return the run's aggregate result.
    ///
    /// # Errors
    /// Returns [`Error::NotStarted`] if [`start`](Self::start) was never
    /// called (or this is a second call after the first already consumed the
    /// result), or [`Error::TaskPanic`] if the scheduler's own driver task
    /// panicked.
    pub async fn wait(&self) -> Result<ExecutorResult> {
        let handle = self.handle.lock().await.take().ok_or(Error::NotStarted)?;
        handle.await.map_err(|e| Error::TaskPanic(e.to_string()))
    }
}

/// What one successfully completed task contributes to the run.
struct TaskOutcome {
    specs: Vec<ChangesetSpec>,
    log_dir: PathBuf,
}

/// Reports this task's lifecycle transitions onto the shared event bus,
/// tracking its own last-reported state so every `StatusEvent` carries both
/// ends of the transition. The Step Runner never touches task
/// status itself; its `on_step_start` callback calls back into this.
struct StatusReporter {
    task_id: TaskId,
    repository: String,
    path: String,
    sender: Option<batchforge_events::EventSender>,
    state: SyncMutex<TaskState>,
}

impl StatusReporter {
    fn new(task_id: TaskId, repository: String, path: String, sender: Option<batchforge_events::EventSender>) -> Self {
        Self {
            task_id,
            repository,
            path,
            sender,
            state: SyncMutex::new(TaskState::Queued),
        }
    }

    fn transition(&self, new_state: TaskState, message: Option<String>) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let old_state = *guard;
        *guard = new_state;
        if let Some(sender) = &self.sender {
            let _ = sender.send(StatusEvent::new(self.task_id, self.repository.clone(), self.path.clone(), old_state, new_state, message));
        }
    }
}

/// Run every queued task with bounded parallelism, fail-fast unless
/// `opts.skip_errors` is set.
async fn run_all(
    tasks: Vec<(TaskId, Task)>,
    opts: Arc<ExecutorOpts>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
) -> ExecutorResult {
    let semaphore = Arc::new(Semaphore::new(opts.effective_parallelism().max(1)));
    let mut join_set = JoinSet::new();

    for (task_id, task) in tasks {
        let semaphore = Arc::clone(&semaphore);
        let opts = Arc::clone(&opts);
        let events = Arc::clone(&events);
        let task_cancel = cancel.child_token();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = run_task(task_id, task, opts, events, task_cancel).await;
            (task_id, result)
        });
    }

    let mut specs = Vec::new();
    let mut log_paths = Vec::new();
    let mut collected_errors = Vec::new();
    let mut first_error = None;

    while let Some(joined) = join_set.join_next().await {
        let outcome = match joined {
            Ok((_, result)) => result,
            Err(join_err) => Err(Error::TaskPanic(join_err.to_string())),
        };

        match outcome {
            Ok(outcome) => {
                specs.extend(outcome.specs);
                log_paths.push(outcome.log_dir);
            }
            Err(e) => {
                tracing::warn!(error = %e, "task failed");
                if opts.skip_errors {
                    collected_errors.push(e);
                } else if first_error.is_none() {
                    first_error = Some(e);
                    cancel.cancel();
                    join_set.abort_all();
                }
            }
        }
    }

    let error = if opts.skip_errors {
        if !collected_errors.is_empty() {
            if collected_errors.len() == 1 {
                collected_errors.into_iter().next()
            } else {
                Some(Error::Multi(collected_errors))
            }
        } else {
            validate_distinct_head_refs(&specs).err().map(Error::Core)
        }
    } else if let Some(e) = first_error {
        Some(e)
    } else {
        validate_distinct_head_refs(&specs).err().map(Error::Core)
    };

    ExecutorResult { specs, log_paths, error }
}

/// Run one task start to finish, reporting its status transitions.
async fn run_task(
    task_id: TaskId,
    task: Task,
    opts: Arc<ExecutorOpts>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
) -> std::result::Result<TaskOutcome, Error> {
    let reporter = Arc::new(StatusReporter::new(
        task_id,
        task.repository.name.clone(),
        task.path.clone(),
        events.sender(),
    ));
    reporter.transition(TaskState::Initializing, None);

    let result = run_task_inner(task_id, &task, &opts, &cancel, &reporter).await.map_err(Error::Core);

    match &result {
        Ok(_) => reporter.transition(TaskState::Done, None),
        Err(e) => {
            let final_state = if cancel.is_cancelled() { TaskState::Cancelled } else { TaskState::Errored };
            reporter.transition(final_state, Some(e.to_string()));
        }
    }

    result
}

/// The per-task algorithm: cache key, cache lookup, Step Runner, Diff
/// Grouper, Changeset Spec Builder.
async fn run_task_inner(
    task_id: TaskId,
    task: &Task,
    opts: &ExecutorOpts,
    cancel: &CancellationToken,
    reporter: &Arc<StatusReporter>,
) -> batchforge_core::Result<TaskOutcome> {
    let mut image_ids = Vec::with_capacity(task.steps.len());
    for step in &task.steps {
        let id = opts.runtime.image_id(&step.container).await.map_err(batchforge_core::Error::from)?;
        image_ids.push(id);
    }

    let key = ExecutionCacheKey {
        repository_id: task.repository.id.clone(),
        default_branch_oid: task.repository.default_branch_oid.clone(),
        base_ref_oid: task.repository.default_branch_oid.clone(),
        path: task.path.clone(),
        steps: task.steps.clone(),
        template: task.template.clone(),
        batch_change_attributes: task.batch_change_attributes.clone(),
        transform: task.transform.clone(),
        image_ids,
    };
    let digest = key
        .digest()
        .map_err(|e| batchforge_core::Error::Config(format!("failed to compute cache key: {e}")))?;

    if opts.clear_cache {
        opts.cache.clear(&digest).map_err(batchforge_core::Error::from)?;
    }

    let log_dir = opts.effective_temp_dir().join(format!("task-{task_id}")).join("logs");

    let execution_result = match opts.cache.get::<ExecutionResult>(&digest) {
        Some(cached) => cached,
        None => {
            reporter.transition(TaskState::Preparing, None);

            let archive_path = opts.archives.ensure(&task.archive_key).await.map_err(batchforge_core::Error::from)?;

            let reporter_for_steps = Arc::clone(reporter);
            let on_step_start: Arc<dyn Fn(usize) + Send + Sync> = Arc::new(move |index| {
                reporter_for_steps.transition(TaskState::Step { index }, None);
            });

            let step_config = StepRunnerConfig {
                workspace_mode: opts.workspace_mode,
                runtime: Arc::clone(&opts.runtime),
                deadline: tokio::time::Instant::now() + opts.effective_timeout(),
                total_timeout: opts.effective_timeout(),
                cancel: cancel.clone(),
                keep_logs: opts.keep_logs,
                log_root: log_dir.clone(),
                on_step_start,
            };

            let run_result = step_runner::run(task, &archive_path, &step_config).await;
            let release_result = opts.archives.release(&task.archive_key).await;

            let result = run_result?;
            release_result.map_err(batchforge_core::Error::from)?;

            opts.cache.set(&digest, &result).map_err(batchforge_core::Error::from)?;
            result
        }
    };

    reporter.transition(TaskState::Finalizing, None);

    let context = ChangesetTemplateContext {
        repository: &task.repository,
        batch_change_name: &task.batch_change_attributes.name,
        batch_change_description: &task.batch_change_attributes.description,
        outputs: &execution_result.outputs,
        changed_files: &execution_result.changed_files,
        path: &task.path,
    };

    let groups = task.transform.as_ref().map_or(&[][..], |t| t.groups.as_slice());
    diff_grouper::validate_branches(&task.template.branch, groups)?;
    let buckets = diff_grouper::group(&execution_result.diff, &task.template.branch, groups, &task.repository.name);

    let mut specs = Vec::with_capacity(buckets.len());
    for (branch, diff) in buckets {
        if diff.is_empty() {
            continue;
        }
        let spec = build_spec(
            &task.template,
            &context,
            &task.repository,
            &branch,
            &diff,
            &task.repository.default_branch_oid,
            opts.auto_author_details,
        )?;
        specs.push(spec);
    }

    Ok(TaskOutcome { specs, log_dir })
}
