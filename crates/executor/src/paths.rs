//! Directory resolution for the scheduler's temp and cache roots.
//!
//! Resolution order:
//! 1. Explicit override passed by the caller (e.g. `ExecutorOpts::temp_dir`).
//! 2. The `BATCHFORGE_TMP_DIR` / `BATCHFORGE_CACHE_DIR` environment variable.
//! 3. The OS-standard cache directory, joined with `batchforge`.
//! 4. A home-relative fallback, `~/.batchforge`.

use std::path::PathBuf;

/// Resolve the scratch directory used for host-side workspace extraction
/// (the bind strategy's temp dirs, the volume strategy's scratch mounts).
#[must_use]
pub fn temp_dir(explicit: Option<&PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.clone();
    }
    if let Ok(dir) = std::env::var("BATCHFORGE_TMP_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    std::env::temp_dir().join("batchforge")
}

/// Resolve the root directory the Archive Store and Execution Cache persist
/// under.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BATCHFORGE_CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::cache_dir().map_or_else(
        || home_fallback().join(".batchforge"),
        |base| base.join("batchforge"),
    )
}

fn home_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins_over_everything() {
        let explicit = PathBuf::from("/explicit/scratch");
        assert_eq!(temp_dir(Some(&explicit)), explicit);
    }

    #[test]
    fn cache_dir_is_never_empty() {
        assert!(!cache_dir().as_os_str().is_empty());
    }
}
