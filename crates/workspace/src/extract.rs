//! Shared zip-extraction helper used by both workspace strategies.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Extract `archive_path`'s entries into `dest`. When `only_fetch_workspace`
/// is set and `sub_path` is non-empty, entries outside `sub_path` are
/// skipped — the task only needs its own sub-tree plus whatever the caller
/// separately supplies via `additional_files`. `additional_files` is always
/// written regardless of `sub_path` (root-level files a task needs, e.g.
/// ignore files, fetched once by the caller).
pub fn extract(
    archive_path: &Path,
    dest: &Path,
    sub_path: &str,
    only_fetch_workspace: bool,
    additional_files: &HashMap<String, Vec<u8>>,
) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| Error::io("create_dir_all", dest, e))?;

    let file = std::fs::File::open(archive_path)
        .map_err(|e| Error::io("open archive", archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::Extract {
        path: dest.to_path_buf(),
        message: e.to_string(),
    })?;

    let filter_prefix = (only_fetch_workspace && !sub_path.is_empty()).then(|| format!("{sub_path}/"));

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| Error::Extract {
            path: dest.to_path_buf(),
            message: e.to_string(),
        })?;
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let name_str = name.to_string_lossy();
        if let Some(prefix) = filter_prefix.as_deref() {
            if !name_str.starts_with(prefix) {
                continue;
            }
        }

        let out_path = dest.join(&name);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| Error::io("create_dir_all", &out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("create_dir_all", parent, e))?;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).map_err(|e| Error::io("read zip entry", &out_path, e))?;
        std::fs::write(&out_path, &buf).map_err(|e| Error::io("write", &out_path, e))?;
    }

    for (rel_path, contents) in additional_files {
        let out_path = dest.join(rel_path);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("create_dir_all", parent, e))?;
        }
        std::fs::write(&out_path, contents).map_err(|e| Error::io("write", &out_path, e))?;
    }

    Ok(())
}
