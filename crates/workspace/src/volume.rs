//! Named-volume workspace strategy: contents are copied into a container
//! volume by a short-lived container, and every git operation against the
//! workspace is likewise run inside a short-lived container with the volume
//! mounted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use batchforge_container::{ContainerRuntime, MountSource, RunSpec};
use batchforge_vcs::{StepChanges, git};

use crate::error::{Error, Result};
use crate::extract;
use crate::handle::{WORKSPACE_MOUNT_PATH, Workspace};

/// Image the volume strategy uses for its setup, status, and diff
/// containers. Any image with a `git` binary and `/bin/sh` works; this one
/// is small and widely cached.
const GIT_HELPER_IMAGE: &str = "alpine/git:latest";

const SCRATCH_MOUNT_PATH: &str = "/src";

/// A workspace materialized as a named container-engine volume.
pub struct VolumeWorkspace {
    name: String,
    base_commit: String,
    runtime: Arc<dyn ContainerRuntime>,
}

impl VolumeWorkspace {
    /// Extract `archive_path` into a scratch host directory, copy it into a
    /// freshly created volume, and record the synthetic base commit, all via
    /// short-lived containers.
    pub async fn create(
        archive_path: &Path,
        sub_path: &str,
        only_fetch_workspace: bool,
        additional_files: &HashMap<String, Vec<u8>>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        let scratch = tempfile::tempdir().map_err(|e| Error::io("mkdtemp", "<tmp>", e))?;
        extract::extract(archive_path, scratch.path(), sub_path, only_fetch_workspace, additional_files)?;

        let name = format!("batchforge-ws-{}", uuid::Uuid::new_v4());
        runtime.volume_create(&name).await?;

        let setup_command = format!(
            "cp -a {SCRATCH_MOUNT_PATH}/. {WORKSPACE_MOUNT_PATH}/ && cd {WORKSPACE_MOUNT_PATH} && \
             git init --quiet && git add -A && \
             git -c user.name={author_name} -c user.email={author_email} commit --quiet --allow-empty -m \"{message}\" && \
             git rev-parse HEAD",
            author_name = git::ROOT_COMMIT_AUTHOR_NAME,
            author_email = git::ROOT_COMMIT_AUTHOR_EMAIL,
            message = git::ROOT_COMMIT_MESSAGE,
        );

        let outcome = Self::run_setup(&runtime, &name, scratch.path(), setup_command).await?;
        let base_commit = String::from_utf8_lossy(&outcome.stdout).trim().to_string();
        if base_commit.len() != 40 {
            return Err(Error::Extract {
                path: Path::new(WORKSPACE_MOUNT_PATH).to_path_buf(),
                message: format!("unexpected base commit output: {base_commit:?}"),
            });
        }

        Ok(Self {
            name,
            base_commit,
            runtime,
        })
    }

    async fn run_git(
        runtime: &Arc<dyn ContainerRuntime>,
        volume: &str,
        command: String,
    ) -> Result<batchforge_container::RunOutcome> {
        let cancel = tokio_util::sync::CancellationToken::new();
        let spec = RunSpec {
            image: GIT_HELPER_IMAGE.to_string(),
            mount: MountSource::Volume(volume.to_string()),
            container_mount_path: WORKSPACE_MOUNT_PATH.to_string(),
            workdir: WORKSPACE_MOUNT_PATH.to_string(),
            env: Vec::new(),
            command,
            extra_mounts: Vec::new(),
        };
        let outcome = runtime.run(spec, None, &cancel).await?;
        if !outcome.success() {
            return Err(Error::Extract {
                path: Path::new(WORKSPACE_MOUNT_PATH).to_path_buf(),
                message: String::from_utf8_lossy(&outcome.stderr).into_owned(),
            });
        }
        Ok(outcome)
    }

    /// A setup container that both copies the scratch extraction into the
    /// volume and attaches the scratch directory at [`SCRATCH_MOUNT_PATH`].
    async fn run_setup(
        runtime: &Arc<dyn ContainerRuntime>,
        volume: &str,
        scratch: &Path,
        command: String,
    ) -> Result<batchforge_container::RunOutcome> {
        let cancel = tokio_util::sync::CancellationToken::new();
        let spec = RunSpec {
            image: GIT_HELPER_IMAGE.to_string(),
            mount: MountSource::Volume(volume.to_string()),
            container_mount_path: WORKSPACE_MOUNT_PATH.to_string(),
            workdir: WORKSPACE_MOUNT_PATH.to_string(),
            env: Vec::new(),
            command,
            extra_mounts: vec![(MountSource::Bind(scratch.to_path_buf()), SCRATCH_MOUNT_PATH.to_string())],
        };
        let outcome = runtime.run(spec, None, &cancel).await?;
        if !outcome.success() {
            return Err(Error::Extract {
                path: Path::new(WORKSPACE_MOUNT_PATH).to_path_buf(),
                message: String::from_utf8_lossy(&outcome.stderr).into_owned(),
            });
        }
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl Workspace for VolumeWorkspace {
    fn mount_source(&self) -> MountSource {
        MountSource::Volume(self.name.clone())
    }

    async fn write_files(&self, files: &[(String, Vec<u8>)]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let scratch = tempfile::tempdir().map_err(|e| Error::io("mkdtemp", "<tmp>", e))?;
        let mut copy_commands = Vec::with_capacity(files.len());
        for (index, (rel_path, content)) in files.iter().enumerate() {
            let scratch_name = format!("file-{index}");
            let scratch_path = scratch.path().join(&scratch_name);
            tokio::fs::write(&scratch_path, content)
                .await
                .map_err(|e| Error::io("write", &scratch_path, e))?;

            let dest = format!("{WORKSPACE_MOUNT_PATH}/{rel_path}");
            copy_commands.push(format!(
                "mkdir -p \"$(dirname '{dest}')\" && cp '{SCRATCH_MOUNT_PATH}/{scratch_name}' '{dest}'"
            ));
        }

        let command = copy_commands.join(" && ");
        Self::run_setup(&self.runtime, &self.name, scratch.path(), command).await?;
        Ok(())
    }

    async fn changes(&self) -> Result<StepChanges> {
        let outcome = Self::run_git(&self.runtime, &self.name, "git status --porcelain".to_string()).await?;
        Ok(StepChanges::from_porcelain(&String::from_utf8_lossy(&outcome.stdout)))
    }

    async fn diff(&self) -> Result<String> {
        // Stage before diffing: `git diff <base>` alone only compares
        // tracked files, so a step that creates a new file would otherwise
        // be silently dropped from the result.
        let command = format!("git add -A && git diff --cached {}", self.base_commit);
        let outcome = Self::run_git(&self.runtime, &self.name, command).await?;
        Ok(String::from_utf8_lossy(&outcome.stdout).into_owned())
    }

    async fn destroy(&self) -> Result<()> {
        self.runtime.volume_remove(&self.name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchforge_container::{MockContainerRuntime, RunOutcome};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_sample_zip(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default();
        zip.start_file("README.md", opts).unwrap();
        zip.write_all(b"hello\n").unwrap();
        zip.finish().unwrap();
    }

    const FAKE_SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    #[tokio::test]
    async fn create_uses_setup_containers_extra_mount_and_records_base_commit() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);

        let sha = &FAKE_SHA[..40];
        let runtime = Arc::new(MockContainerRuntime::with_handler(move |spec| {
            assert_eq!(spec.extra_mounts.len(), 1);
            Ok(RunOutcome {
                exit_code: 0,
                stdout: sha.as_bytes().to_vec(),
                stderr: Vec::new(),
                timed_out: false,
                cancelled: false,
            })
        }));

        let ws = VolumeWorkspace::create(&archive_path, "", false, &HashMap::new(), runtime)
            .await
            .unwrap();
        assert_eq!(ws.base_commit, sha);
    }

    #[tokio::test]
    async fn write_files_attaches_a_scratch_mount_and_copies_into_the_volume() {
        let runtime = Arc::new(MockContainerRuntime::with_handler(|spec| {
            assert_eq!(spec.extra_mounts.len(), 1);
            assert!(spec.command.contains(SCRATCH_MOUNT_PATH));
            assert!(spec.command.contains("nested/dir/file.txt"));
            Ok(RunOutcome {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: false,
                cancelled: false,
            })
        }));
        let ws = VolumeWorkspace {
            name: "batchforge-ws-test".to_string(),
            base_commit: FAKE_SHA.to_string(),
            runtime,
        };
        ws.write_files(&[("nested/dir/file.txt".to_string(), b"content".to_vec())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn destroy_removes_the_volume() {
        let runtime = Arc::new(MockContainerRuntime::always_succeeds());
        let ws = VolumeWorkspace {
            name: "batchforge-ws-test".to_string(),
            base_commit: FAKE_SHA.to_string(),
            runtime: runtime.clone(),
        };
        ws.destroy().await.unwrap();
    }
}
