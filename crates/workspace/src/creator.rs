//! Factory that materializes a [`Workspace`] using the resolved
//! [`WorkspaceMode`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use batchforge_container::ContainerRuntime;

use crate::bind::BindWorkspace;
use crate::error::Result;
use crate::mode::WorkspaceMode;
use crate::volume::VolumeWorkspace;
use crate::handle::Workspace;

/// Materialize a task's workspace from its fetched archive.
///
/// `sub_path` and `only_fetch_workspace` mirror the task's own fields:
/// when set, only files under `sub_path` (plus `additional_files`) are
/// extracted rather than the whole archive.
pub async fn create(
    mode: WorkspaceMode,
    archive_path: &Path,
    sub_path: &str,
    only_fetch_workspace: bool,
    additional_files: &HashMap<String, Vec<u8>>,
    runtime: Arc<dyn ContainerRuntime>,
) -> Result<Box<dyn Workspace>> {
    match mode.resolve() {
        WorkspaceMode::Bind => {
            let ws = BindWorkspace::create(archive_path, sub_path, only_fetch_workspace, additional_files)
                .await?;
            Ok(Box::new(ws))
        }
        WorkspaceMode::Volume => {
            let ws = VolumeWorkspace::create(
                archive_path,
                sub_path,
                only_fetch_workspace,
                additional_files,
                runtime,
            )
            .await?;
            Ok(Box::new(ws))
        }
        WorkspaceMode::Auto => unreachable!("resolve() never returns Auto"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchforge_container::MockContainerRuntime;
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

    #[tokio::test]
    async fn bind_mode_produces_a_bind_mount_workspace() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("a.zip");
        write_sample_zip(&archive_path);
        let runtime = Arc::new(MockContainerRuntime::always_succeeds());

        let ws = create(WorkspaceMode::Bind, &archive_path, "", false, &HashMap::new(), runtime)
            .await
            .unwrap();
        assert!(matches!(
            ws.mount_source(),
            batchforge_container::MountSource::Bind(_)
        ));
    }
}
