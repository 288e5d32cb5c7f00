//! `StepChanges`: the four disjoint file-change lists derived from `git
//! status --porcelain` after a step, and from re-scanning a unified diff for
//! the cumulative view.

use serde::{Deserialize, Serialize};

/// File-change lists for one step, or cumulative across a whole task.
/// The four lists are disjoint and ordered as they were observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepChanges {
    /// Files with content changes.
    pub modified: Vec<String>,
    /// Newly created files (including previously untracked ones).
    pub added: Vec<String>,
    /// Removed files.
    pub deleted: Vec<String>,
    /// Renamed files — only the new name is recorded.
    pub renamed: Vec<String>,
}

impl StepChanges {
    /// Whether every list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
            && self.added.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
    }

    /// Parse the output of `git status --porcelain` (v1, unstaged or staged)
    /// into a [`StepChanges`]. Rename lines (`R  old -> new`) yield only the
    /// new path.
    #[must_use]
    pub fn from_porcelain(output: &str) -> Self {
        let mut changes = Self::default();
        for line in output.lines() {
            if line.len() < 3 {
                continue;
            }
            let status = &line[..2];
            let rest = line[3..].trim();

            if status.contains('R') {
                let new_name = rest.split(" -> ").next_back().unwrap_or(rest);
                changes.renamed.push(new_name.to_string());
            } else if status == "??" || status.contains('A') {
                changes.added.push(rest.to_string());
            } else if status.contains('D') {
                changes.deleted.push(rest.to_string());
            } else if status.contains('M') {
                changes.modified.push(rest.to_string());
            }
        }
        changes
    }

    /// Re-derive the cumulative change lists by scanning a unified diff's
    /// per-file headers, rather than trusting any single
    /// step's porcelain output, which only reflects that step's delta.
    #[must_use]
    pub fn from_unified_diff(diff: &str) -> Self {
        let mut changes = Self::default();
        let mut lines = diff.lines().peekable();

        while let Some(line) = lines.next() {
            let Some(header) = line.strip_prefix("diff --git ") else {
                continue;
            };
            let Some((old_path, new_path)) = parse_diff_git_header(header) else {
                continue;
            };

            let mut is_new = false;
            let mut is_deleted = false;
            let mut is_rename = false;

            while let Some(next) = lines.peek() {
                if next.starts_with("diff --git ") {
                    break;
                }
                if next.starts_with("new file mode") {
                    is_new = true;
                } else if next.starts_with("deleted file mode") {
                    is_deleted = true;
                } else if next.starts_with("rename from") || next.starts_with("rename to") {
                    is_rename = true;
                } else if next.starts_with("--- ") || next.starts_with("+++ ") {
                    lines.next();
                    continue;
                }
                lines.next();
            }

            if is_rename {
                changes.renamed.push(new_path);
            } else if is_new {
                changes.added.push(new_path);
            } else if is_deleted {
                changes.deleted.push(old_path);
            } else {
                changes.modified.push(new_path);
            }
        }

        changes
    }
}

/// Parse `a/old/path b/new/path` from a `diff --git` header, stripping the
/// conventional `a/`/`b/` prefixes.
fn parse_diff_git_header(header: &str) -> Option<(String, String)> {
    let mut parts = header.splitn(2, " b/");
    let a_part = parts.next()?;
    let b_part = parts.next()?;
    let old = a_part.strip_prefix("a/").unwrap_or(a_part);
    Some((old.to_string(), b_part.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porcelain_parses_modified_added_deleted() {
        let output = " M src/main.rs\n?? new_file.txt\nA  staged_new.txt\n D removed.txt\n";
        let changes = StepChanges::from_porcelain(output);
        assert_eq!(changes.modified, vec!["src/main.rs"]);
        assert_eq!(changes.added, vec!["new_file.txt", "staged_new.txt"]);
        assert_eq!(changes.deleted, vec!["removed.txt"]);
    }

    #[test]
    fn porcelain_rename_keeps_only_new_name() {
        let output = "R  old_name.txt -> new_name.txt\n";
        let changes = StepChanges::from_porcelain(output);
        assert_eq!(changes.renamed, vec!["new_name.txt"]);
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn unified_diff_identifies_added_file() {
        let diff = "diff --git a/README.md b/README.md\n\
new file mode 100644\n\
index 0000000..abcdef0\n\
--- /dev/null\n\
+++ b/README.md\n\
@@ -0,0 +1 @@\n\
+hello\n";
        let changes = StepChanges::from_unified_diff(diff);
        assert_eq!(changes.added, vec!["README.md"]);
    }

    #[test]
    fn unified_diff_identifies_modified_and_deleted() {
        let diff = "diff --git a/main.go b/main.go\n\
index 111..222 100644\n\
--- a/main.go\n\
+++ b/main.go\n\
@@ -1 +1 @@\n\
-old\n\
+new\n\
diff --git a/old.txt b/old.txt\n\
deleted file mode 100644\n\
index 333..0000000\n\
--- a/old.txt\n\
+++ /dev/null\n\
@@ -1 +0,0 @@\n\
-gone\n";
        let changes = StepChanges::from_unified_diff(diff);
        assert_eq!(changes.modified, vec!["main.go"]);
        assert_eq!(changes.deleted, vec!["old.txt"]);
    }

    #[test]
    fn empty_changes_reports_is_empty() {
        assert!(StepChanges::default().is_empty());
    }
}
