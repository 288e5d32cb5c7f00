//! Shells out to an external container runtime binary (default `docker`),
//! using exactly these sub-commands:
//!
//! ```text
//! <bin> version
//! <bin> image inspect --format {{.Id}} <image>
//! <bin> run --rm -v <src>:<dst>:rw --workdir <dst> [-e KEY=VAL ...] <image> /bin/sh -c '<run>'
//! <bin> volume create <name>
//! <bin> volume rm <name>
//! ```
//!
//! Wraps an external CLI tool behind a small async function module: spawn
//! with `tokio::process::Command`, capture output, map a non-zero exit to a
//! crate-local error carrying stderr.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::runtime::{ContainerRuntime, MountSource, RunOutcome, RunSpec};

/// Runs containers by shelling out to a Docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct CliContainerRuntime {
    /// Name or path of the runtime binary, e.g. `"docker"` or `"podman"`.
    binary: String,
}

impl CliContainerRuntime {
    /// Use the given binary (looked up on `PATH` if not absolute).
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for CliContainerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

fn mount_arg(mount: &MountSource, dst: &str) -> String {
    match mount {
        MountSource::Bind(host) => format!("{}:{}:rw", host.display(), dst),
        MountSource::Volume(name) => format!("{name}:{dst}:rw"),
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for CliContainerRuntime {
    #[tracing::instrument(name = "container_version", skip(self), fields(binary = %self.binary))]
    async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("version")
            .output()
            .await
            .map_err(Error::Spawn)?;

        if !output.status.success() {
            return Err(Error::Unavailable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[tracing::instrument(name = "container_image_id", skip(self), fields(image))]
    async fn image_id(&self, image: &str) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(["image", "inspect", "--format", "{{.Id}}", image])
            .output()
            .await
            .map_err(Error::Spawn)?;

        if !output.status.success() {
            return Err(Error::ImageInspect {
                image: image.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    #[tracing::instrument(
        name = "container_run",
        skip(self, spec, cancel),
        fields(image = %spec.image, workdir = %spec.workdir)
    )]
    async fn run(
        &self,
        spec: RunSpec,
        deadline: Option<Duration>,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<RunOutcome> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(mount_arg(&spec.mount, &spec.container_mount_path))
            .arg("--workdir")
            .arg(&spec.workdir);
        for (mount, dst) in &spec.extra_mounts {
            cmd.arg("-v").arg(mount_arg(mount, dst));
        }
        for (key, value) in &spec.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&spec.image)
            .arg("/bin/sh")
            .arg("-c")
            .arg(&spec.command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(Error::Spawn)?;
        run_to_completion(&mut child, deadline, cancel).await
    }

    #[tracing::instrument(name = "container_volume_create", skip(self))]
    async fn volume_create(&self, name: &str) -> Result<()> {
        let output = Command::new(&self.binary)
            .args(["volume", "create", name])
            .output()
            .await
            .map_err(Error::Spawn)?;
        if !output.status.success() {
            return Err(Error::Volume {
                volume: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(name = "container_volume_remove", skip(self))]
    async fn volume_remove(&self, name: &str) -> Result<()> {
        let output = Command::new(&self.binary)
            .args(["volume", "rm", name])
            .output()
            .await
            .map_err(Error::Spawn)?;
        if !output.status.success() {
            tracing::warn!(
                volume = %name,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "volume rm failed; treating as best-effort cleanup"
            );
        }
        Ok(())
    }
}

/// Drive a spawned child to completion, racing its exit against `deadline`
/// and `cancel`. Whichever fires first kills the process with SIGKILL.
async fn run_to_completion(
    child: &mut Child,
    deadline: Option<Duration>,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<RunOutcome> {
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let wait_and_capture = async {
        let stdout_task = async {
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stdout).await;
            }
        };
        let stderr_task = async {
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stderr).await;
            }
        };
        let (status, (), ()) = tokio::join!(child.wait(), stdout_task, stderr_task);
        status
    };

    let timeout_fut = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        status = wait_and_capture => {
            let status = status.map_err(Error::Spawn)?;
            Ok(RunOutcome {
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
                timed_out: false,
                cancelled: false,
            })
        }
        () = timeout_fut => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Ok(RunOutcome { exit_code: -1, stdout, stderr, timed_out: true, cancelled: false })
        }
        () = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Ok(RunOutcome { exit_code: -1, stdout, stderr, timed_out: false, cancelled: true })
        }
    }
}
