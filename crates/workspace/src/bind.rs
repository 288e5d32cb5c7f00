//! Bind-mount workspace strategy: a fresh host temp directory, unzipped in
//! place and bind-mounted into every step's container.

use std::collections::HashMap;
use std::path::Path;

use batchforge_container::MountSource;
use batchforge_vcs::{StepChanges, git};
use tempfile::TempDir;

use crate::error::Result;
use crate::extract;
use crate::handle::Workspace;

/// A workspace materialized as a host temp directory.
pub struct BindWorkspace {
    dir: TempDir,
    base_commit: String,
}

impl BindWorkspace {
    /// Unzip `archive_path` into a fresh temp directory, write
    /// `additional_files`, and record the synthetic base commit.
    pub async fn create(
        archive_path: &Path,
        sub_path: &str,
        only_fetch_workspace: bool,
        additional_files: &HashMap<String, Vec<u8>>,
    ) -> Result<Self> {
        let dir = tempfile::tempdir().map_err(|e| crate::error::Error::io("mkdtemp", "<tmp>", e))?;
        extract::extract(archive_path, dir.path(), sub_path, only_fetch_workspace, additional_files)?;

        git::init(dir.path()).await?;
        git::add_all(dir.path()).await?;
        let base_commit = git::commit_root(dir.path()).await?;

        Ok(Self { dir, base_commit })
    }

    /// Host path files are written to and where step containers bind-mount from.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

#[async_trait::async_trait]
impl Workspace for BindWorkspace {
    fn mount_source(&self) -> MountSource {
        MountSource::Bind(self.dir.path().to_path_buf())
    }

    async fn write_files(&self, files: &[(String, Vec<u8>)]) -> Result<()> {
        for (rel_path, content) in files {
            let dest = self.dir.path().join(rel_path);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| crate::error::Error::io("create_dir_all", parent, e))?;
            }
            tokio::fs::write(&dest, content)
                .await
                .map_err(|e| crate::error::Error::io("write", &dest, e))?;
        }
        Ok(())
    }

    async fn changes(&self) -> Result<StepChanges> {
        let status = git::status_porcelain(self.dir.path()).await?;
        Ok(StepChanges::from_porcelain(&status))
    }

    async fn diff(&self) -> Result<String> {
        Ok(git::diff_against(self.dir.path(), &self.base_commit).await?)
    }

    async fn destroy(&self) -> Result<()> {
        // `TempDir` removes its directory on drop; nothing to do eagerly.
        Ok(())
    }
}
