//! Step Runner: executes one task's steps in order inside its workspace,
//! expanding templates, capturing per-step file changes, and evaluating
//! named outputs.
//!
//! This module owns the workspace for the task's whole lifetime: it is
//! created at the top of [`run`] and destroyed on every exit path, success
//! or failure alike, via the `defer`-style guard in [`run`]'s body.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use batchforge_container::{ContainerRuntime, RunSpec};
use batchforge_core::template::{StepContext, expand};
use batchforge_core::{Error, ExecutionResult, OutputFormat, OutputValue, Result, Step, StepResult, Task};
use batchforge_vcs::StepChanges;
use batchforge_workspace::{Workspace, WorkspaceMode};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything the Step Runner needs beyond the task itself: how to
/// materialize a workspace, where to run steps, and how to behave at the
/// deadline/cancellation boundary. Built fresh per task by the Task
/// Executor.
pub struct StepRunnerConfig {
    /// Workspace materialization strategy.
    pub workspace_mode: WorkspaceMode,
    /// Container runtime every step runs in.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Absolute deadline for the whole task (all steps combined).
    pub deadline: Instant,
    /// The configured total timeout, reported verbatim in the timeout error
    /// message regardless of how much of it was already consumed.
    pub total_timeout: Duration,
    /// Cancellation token; cancelling it aborts the in-flight step.
    pub cancel: CancellationToken,
    /// Whether to keep per-step log files after a successful run.
    pub keep_logs: bool,
    /// Root directory per-step stdout/stderr logs are written under.
    pub log_root: PathBuf,
    /// Called with the zero-based index right before that step starts
    /// running, so the Task Executor can report the `Step { index }`
    /// status transition without the Step Runner touching task status
    /// itself.
    pub on_step_start: Arc<dyn Fn(usize) + Send + Sync>,
}

/// Run every step of `task` inside a freshly materialized workspace,
/// producing its [`ExecutionResult`]. The workspace is destroyed on every
/// exit path.
///
/// # Errors
/// Returns an error if workspace materialization, template expansion, a
/// step's container, or output parsing fails; or if the task's deadline or
/// cancellation token fires mid-step.
pub async fn run(
    task: &Task,
    archive_path: &Path,
    config: &StepRunnerConfig,
) -> Result<ExecutionResult> {
    let workspace = batchforge_workspace::create(
        config.workspace_mode,
        archive_path,
        &task.path,
        task.only_fetch_workspace,
        &task.additional_files,
        Arc::clone(&config.runtime),
    )
    .await?;

    let outcome = run_steps(task, workspace.as_ref(), config).await;
    let destroy_result = workspace.destroy().await;

    if outcome.is_ok() && !config.keep_logs {
        let _ = tokio::fs::remove_dir_all(&config.log_root).await;
    }

    let (diff, changed_files, outputs) = outcome?;
    destroy_result?;

    Ok(ExecutionResult {
        diff,
        changed_files,
        outputs,
    })
}

async fn run_steps(
    task: &Task,
    workspace: &dyn Workspace,
    config: &StepRunnerConfig,
) -> Result<(String, StepChanges, HashMap<String, OutputValue>)> {
    let mut outputs: HashMap<String, OutputValue> = HashMap::new();
    let mut previous: Option<StepResult> = None;

    for (index, step) in task.steps.iter().enumerate() {
        let step_context = build_context(task, &outputs, previous.as_ref(), None);
        if let Some(condition) = &step.if_condition {
            let expanded = expand(condition, &step_context.to_value())?;
            if expanded != "true" {
                continue;
            }
        }

        (config.on_step_start)(index);
        let result = run_one_step(task, step, index, workspace, config, &outputs, previous.as_ref()).await?;
        for (name, value) in result.outputs.clone() {
            outputs.insert(name, value);
        }
        previous = Some(result);
    }

    let diff = workspace.diff().await?;
    let changed_files = StepChanges::from_unified_diff(&diff);
    Ok((diff, changed_files, outputs))
}

#[allow(clippy::too_many_arguments)]
async fn run_one_step(
    task: &Task,
    step: &Step,
    index: usize,
    workspace: &dyn Workspace,
    config: &StepRunnerConfig,
    outputs: &HashMap<String, OutputValue>,
    previous: Option<&StepResult>,
) -> Result<StepResult> {
    let expand_context = build_context(task, outputs, previous, None).to_value();

    let run_command = expand(&step.run, &expand_context)?;

    let mut env = Vec::new();
    if let Some(step_env) = &step.env {
        for (name, value) in step_env.pairs() {
            env.push((name, expand(&value, &expand_context)?));
        }
    }

    let mut files = Vec::with_capacity(step.files.len());
    for (path, content) in &step.files {
        let expanded = expand(content, &expand_context)?;
        files.push((path.clone(), expanded.into_bytes()));
    }
    if !files.is_empty() {
        workspace.write_files(&files).await?;
    }

    let workdir = if task.path.is_empty() {
        workspace.container_mount_path().to_string()
    } else {
        format!("{}/{}", workspace.container_mount_path(), task.path)
    };

    let spec = RunSpec {
        image: step.container.clone(),
        mount: workspace.mount_source(),
        container_mount_path: workspace.container_mount_path().to_string(),
        workdir,
        env,
        command: run_command,
        extra_mounts: Vec::new(),
    };

    let remaining = config.deadline.saturating_duration_since(Instant::now());
    let run_outcome = config.runtime.run(spec, Some(remaining), &config.cancel).await?;

    write_step_logs(config, index, &run_outcome.stdout, &run_outcome.stderr).await;

    if run_outcome.timed_out {
        return Err(Error::Timeout {
            repository: task.repository.name.clone(),
            duration_ms: u64::try_from(config.total_timeout.as_millis()).unwrap_or(u64::MAX),
        });
    }
    if run_outcome.cancelled {
        return Err(Error::Cancel);
    }
    if run_outcome.exit_code != 0 {
        return Err(Error::Step {
            index,
            code: run_outcome.exit_code,
        });
    }

    let files_changed = workspace.changes().await?;
    let stdout = String::from_utf8_lossy(&run_outcome.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&run_outcome.stderr).into_owned();

    let output_context =
        build_context(task, outputs, previous, Some((&files_changed, stdout.as_str(), stderr.as_str())))
            .to_value();

    let mut step_outputs = HashMap::with_capacity(step.outputs.len());
    for (name, spec) in &step.outputs {
        let expanded = expand(&spec.value, &output_context)?;
        let value = parse_output(&expanded, spec.format)?;
        step_outputs.insert(name.clone(), value);
    }

    Ok(StepResult {
        index,
        files: files_changed,
        stdout: run_outcome.stdout,
        stderr: run_outcome.stderr,
        outputs: step_outputs,
    })
}

fn parse_output(expanded: &str, format: OutputFormat) -> Result<OutputValue> {
    match format {
        OutputFormat::Text => Ok(OutputValue::Text(expanded.to_string())),
        OutputFormat::Json => serde_json::from_str(expanded)
            .map(OutputValue::Structured)
            .map_err(|e| Error::Template(format!("output failed to parse as json: {e}"))),
        OutputFormat::Yaml => serde_yaml::from_str::<serde_json::Value>(expanded)
            .map(OutputValue::Structured)
            .map_err(|e| Error::Template(format!("output failed to parse as yaml: {e}"))),
    }
}

fn build_context<'a>(
    task: &'a Task,
    outputs: &'a HashMap<String, OutputValue>,
    previous: Option<&'a StepResult>,
    current: Option<(&'a StepChanges, &'a str, &'a str)>,
) -> StepContext<'a> {
    StepContext {
        repository: &task.repository,
        batch_change_name: &task.batch_change_attributes.name,
        batch_change_description: &task.batch_change_attributes.description,
        previous_step: previous.map(|r| {
            (
                &r.files,
                std::str::from_utf8(&r.stdout).unwrap_or_default(),
                std::str::from_utf8(&r.stderr).unwrap_or_default(),
            )
        }),
        current_step: current,
        outputs,
        path: &task.path,
    }
}

async fn write_step_logs(config: &StepRunnerConfig, index: usize, stdout: &[u8], stderr: &[u8]) {
    if tokio::fs::create_dir_all(&config.log_root).await.is_err() {
        return;
    }
    let stdout_path = config.log_root.join(format!("step-{index}.stdout.log"));
    let stderr_path = config.log_root.join(format!("step-{index}.stderr.log"));
    if let Err(e) = tokio::fs::write(&stdout_path, stdout).await {
        tracing::debug!(error = %e, "failed to write step stdout log");
    }
    if let Err(e) = tokio::fs::write(&stderr_path, stderr).await {
        tracing::debug!(error = %e, "failed to write step stderr log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchforge_container::{MockContainerRuntime, RunOutcome};
    use batchforge_core::{BatchChangeAttributes, ChangesetTemplate, Repository, StepEnv};
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_repository() -> Repository {
        Repository {
            id: "repo-1".to_string(),
            name: "github.com/acme/widgets".to_string(),
            default_branch: "main".to_string(),
            default_branch_oid: "deadbeef".to_string(),
            search_result_paths: None,
        }
    }

    fn sample_task(steps: Vec<Step>) -> Task {
        Task {
            repository: sample_repository(),
            path: String::new(),
            steps,
            template: ChangesetTemplate::default(),
            batch_change_attributes: BatchChangeAttributes {
                name: "my-batch-change".to_string(),
                description: String::new(),
            },
            transform: None,
            archive_key: batchforge_cas::ArchiveKey {
                repo_id: "repo-1".to_string(),
                oid: "deadbeef".to_string(),
                path: String::new(),
            },
            only_fetch_workspace: false,
            additional_files: HashMap::new(),
        }
    }

    fn write_sample_zip(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default();
        zip.start_file("README.md", opts).unwrap();
        zip.write_all(b"hello\n").unwrap();
        zip.finish().unwrap();
    }

    fn config(runtime: Arc<dyn ContainerRuntime>, log_root: PathBuf) -> StepRunnerConfig {
        StepRunnerConfig {
            workspace_mode: WorkspaceMode::Bind,
            runtime,
            deadline: Instant::now() + Duration::from_secs(60),
            total_timeout: Duration::from_secs(60),
            cancel: CancellationToken::new(),
            keep_logs: false,
            log_root,
            on_step_start: Arc::new(|_| {}),
        }
    }

    #[tokio::test]
    async fn runs_a_single_step_and_produces_a_diff() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(MockContainerRuntime::with_handler(|_spec| {
                Ok(RunOutcome {
                    exit_code: 0,
                    stdout: b"ok".to_vec(),
                    stderr: Vec::new(),
                    timed_out: false,
                    cancelled: false,
                })
            }));

        let step = Step {
            run: "echo hi".to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
            if_condition: None,
        };
        let task = sample_task(vec![step]);
        let logs = tmp.path().join("logs");
        let result = run(&task, &archive_path, &config(runtime, logs)).await.unwrap();
        assert!(result.diff.is_empty());
    }

    #[tokio::test]
    async fn if_condition_false_skips_the_step() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let mock = Arc::new(MockContainerRuntime::always_succeeds());
        let runtime: Arc<dyn ContainerRuntime> = Arc::clone(&mock) as Arc<dyn ContainerRuntime>;
        let step = Step {
            run: "touch should-not-run".to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
            if_condition: Some("false".to_string()),
        };
        let task = sample_task(vec![step]);
        let logs = tmp.path().join("logs");
        run(&task, &archive_path, &config(runtime, logs)).await.unwrap();
        assert_eq!(mock.run_count(), 0);
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_step_error() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockContainerRuntime::with_handler(|_| {
            Ok(RunOutcome {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: b"boom".to_vec(),
                timed_out: false,
                cancelled: false,
            })
        }));
        let step = Step {
            run: "false".to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
            if_condition: None,
        };
        let task = sample_task(vec![step]);
        let logs = tmp.path().join("logs");
        let err = run(&task, &archive_path, &config(runtime, logs)).await.unwrap_err();
        assert!(matches!(err, Error::Step { index: 0, code: 1 }));
    }

    #[tokio::test]
    async fn timed_out_outcome_surfaces_timeout_error_with_configured_duration() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockContainerRuntime::with_handler(|_| {
            Ok(RunOutcome {
                exit_code: -1,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: true,
                cancelled: false,
            })
        }));
        let step = Step {
            run: "sleep 100".to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
            if_condition: None,
        };
        let task = sample_task(vec![step]);
        let logs = tmp.path().join("logs");
        let mut cfg = config(runtime, logs);
        cfg.total_timeout = Duration::from_millis(100);
        let err = run(&task, &archive_path, &cfg).await.unwrap_err();
        match err {
            Error::Timeout { duration_ms, .. } => assert_eq!(duration_ms, 100),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn templated_outputs_feed_the_next_step() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockContainerRuntime::with_handler(|spec| {
            if spec.command.contains("modified-") {
                assert!(spec.command.contains("modified-README.md"));
            }
            Ok(RunOutcome {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: false,
                cancelled: false,
            })
        }));

        let step1 = Step {
            run: "echo first".to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::from([("README.md".to_string(), "changed\n".to_string())]),
            outputs: BTreeMap::new(),
            if_condition: None,
        };
        let step2 = Step {
            run: r#"touch modified-${{ join previous_step.modified_files " " }}"#.to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
            if_condition: None,
        };
        let task = sample_task(vec![step1, step2]);
        let logs = tmp.path().join("logs");
        run(&task, &archive_path, &config(runtime, logs)).await.unwrap();
    }

    #[tokio::test]
    async fn env_vars_are_templated_before_reaching_the_container() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockContainerRuntime::with_handler(|spec| {
            assert!(spec.env.iter().any(|(k, v)| k == "REPO" && v == "github.com/acme/widgets"));
            Ok(RunOutcome {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: false,
                cancelled: false,
            })
        }));
        let step = Step {
            run: "echo $REPO".to_string(),
            container: "alpine:3.20".to_string(),
            env: Some(StepEnv::List(vec!["REPO=${{ repository.name }}".to_string()])),
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
            if_condition: None,
        };
        let task = sample_task(vec![step]);
        let logs = tmp.path().join("logs");
        run(&task, &archive_path, &config(runtime, logs)).await.unwrap();
    }

    #[tokio::test]
    async fn json_output_parses_into_structured_value() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockContainerRuntime::always_succeeds());
        let step = Step {
            run: "echo hi".to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::from([(
                "count".to_string(),
                batchforge_core::OutputSpec {
                    value: "3".to_string(),
                    format: OutputFormat::Json,
                },
            )]),
            if_condition: None,
        };
        let task = sample_task(vec![step]);
        let logs = tmp.path().join("logs");
        let result = run(&task, &archive_path, &config(runtime, logs)).await.unwrap();
        assert_eq!(result.outputs.get("count"), Some(&OutputValue::Structured(serde_json::json!(3))));
    }

    #[tokio::test]
    async fn malformed_json_output_is_a_fatal_template_error() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockContainerRuntime::always_succeeds());
        let step = Step {
            run: "echo hi".to_string(),
            container: "alpine:3.20".to_string(),
            env: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::from([(
                "bad".to_string(),
                batchforge_core::OutputSpec {
                    value: "{not json".to_string(),
                    format: OutputFormat::Json,
                },
            )]),
            if_condition: None,
        };
        let task = sample_task(vec![step]);
        let logs = tmp.path().join("logs");
        let err = run(&task, &archive_path, &config(runtime, logs)).await.unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }
}
