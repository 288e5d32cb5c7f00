//! Thin async wrapper over the `git` CLI, used only inside task workspaces.
//! One small function per subcommand, each mapping a non-zero exit to a
//! crate error carrying stderr.

use std::path::Path;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Author recorded on the workspace's synthetic root commit, so later `git
/// diff` invocations have a stable base regardless of what the archive
/// itself contained.
pub const ROOT_COMMIT_AUTHOR_NAME: &str = "batch-changes";
/// Email paired with [`ROOT_COMMIT_AUTHOR_NAME`].
pub const ROOT_COMMIT_AUTHOR_EMAIL: &str = "batch-changes@localhost";
/// Commit message recorded on the workspace's synthetic root commit.
pub const ROOT_COMMIT_MESSAGE: &str = "batch-changes: base";

async fn run(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .await
        .map_err(Error::Spawn)?;

    if !output.status.success() {
        return Err(Error::CommandFailed {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `git init` in `dir`.
pub async fn init(dir: &Path) -> Result<()> {
    run(dir, &["init", "--quiet"]).await.map(|_| ())
}

/// `git add -A` in `dir`.
pub async fn add_all(dir: &Path) -> Result<()> {
    run(dir, &["add", "-A"]).await.map(|_| ())
}

/// Record the workspace's root commit with the well-known author, returning
/// its OID.
pub async fn commit_root(dir: &Path) -> Result<String> {
    run(
        dir,
        &[
            "-c",
            &format!("user.name={ROOT_COMMIT_AUTHOR_NAME}"),
            "-c",
            &format!("user.email={ROOT_COMMIT_AUTHOR_EMAIL}"),
            "commit",
            "--quiet",
            "--allow-empty",
            "-m",
            ROOT_COMMIT_MESSAGE,
        ],
    )
    .await?;
    rev_parse_head(dir).await
}

/// `git rev-parse HEAD`, trimmed.
pub async fn rev_parse_head(dir: &Path) -> Result<String> {
    Ok(run(dir, &["rev-parse", "HEAD"]).await?.trim().to_string())
}

/// `git status --porcelain`, raw (caller parses with
/// [`crate::StepChanges::from_porcelain`]).
pub async fn status_porcelain(dir: &Path) -> Result<String> {
    run(dir, &["status", "--porcelain"]).await
}

/// Stage every change (including new, untracked files) and diff the index
/// against `base`. Staging first is required: `git diff <base>` alone only
/// compares tracked files, so a step that creates a new file would
/// otherwise vanish from the result.
pub async fn diff_against(dir: &Path, base: &str) -> Result<String> {
    add_all(dir).await?;
    run(dir, &["diff", "--cached", base]).await
}
