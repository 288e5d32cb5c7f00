//! Diff Grouper: partitions one task's final unified diff into per-branch
//! diffs by directory prefix.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::model::Group;

/// One file's hunk lines within a parsed unified diff, kept verbatim so
/// buckets can be re-serialized byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileDiff {
    /// The path used for group matching: the new path, or the old path for
    /// a deleted file.
    match_path: String,
    /// The full `diff --git ...` block for this file, including its header.
    text: String,
}

/// Split `diff` into one [`FileDiff`] per `diff --git a/X b/Y` block.
fn parse_file_diffs(diff: &str) -> Vec<FileDiff> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String, String)> = None; // (old, new, text)

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some((old, new, text)) = current.take() {
                blocks.push((old, new, text));
            }
            let (old, new) = parse_diff_git_header(rest);
            current = Some((old, new, format!("{line}\n")));
            continue;
        }
        if let Some((_, _, text)) = current.as_mut() {
            text.push_str(line);
            text.push('\n');
        }
    }
    if let Some((old, new, text)) = current.take() {
        blocks.push((old, new, text));
    }

    blocks
        .into_iter()
        .map(|(old, new, text)| {
            let deleted = text.contains("\ndeleted file mode") || text.contains("+++ /dev/null");
            let match_path = if deleted { old } else { new };
            FileDiff { match_path, text }
        })
        .collect()
}

fn parse_diff_git_header(rest: &str) -> (String, String) {
    match rest.split_once(" b/") {
        Some((a, b)) => (
            a.strip_prefix("a/").unwrap_or(a).to_string(),
            b.to_string(),
        ),
        None => (String::new(), String::new()),
    }
}

/// Validate that `default_branch` and every `groups` branch are pairwise
/// distinct.
///
/// # Errors
/// Returns [`Error::Validation`] naming the first duplicate branch found.
pub fn validate_branches(default_branch: &str, groups: &[Group]) -> Result<(), Error> {
    let mut seen = vec![default_branch.to_string()];
    for group in groups {
        if seen.contains(&group.branch) {
            return Err(Error::Validation(format!(
                "branch {:?} is used by more than one group (or the default branch)",
                group.branch
            )));
        }
        seen.push(group.branch.clone());
    }
    Ok(())
}

/// Split `diff` into a `branch -> diff text` mapping. `default_branch` and
/// every group's branch always appear as a key, even with an empty diff.
/// `repository_name` restricts groups whose `repository` field is set.
#[must_use]
pub fn group(
    diff: &str,
    default_branch: &str,
    groups: &[Group],
    repository_name: &str,
) -> BTreeMap<String, String> {
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    buckets.insert(default_branch.to_string(), Vec::new());
    for rule in groups {
        buckets.entry(rule.branch.clone()).or_default();
    }

    let applicable: Vec<&Group> = groups
        .iter()
        .filter(|g| g.repository.as_deref().is_none_or(|r| r == repository_name))
        .collect();

    for file_diff in parse_file_diffs(diff) {
        // Last matching rule in declaration order wins.
        let branch = applicable
            .iter()
            .rev()
            .find(|rule| file_diff.match_path.starts_with(&rule.directory))
            .map_or(default_branch, |rule| rule.branch.as_str());
        buckets.entry(branch.to_string()).or_default().push(file_diff.text);
    }

    buckets
        .into_iter()
        .map(|(branch, texts)| (branch, texts.concat()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = "diff --git a/crates/foo/src/lib.rs b/crates/foo/src/lib.rs\n\
index 1111111..2222222 100644\n\
--- a/crates/foo/src/lib.rs\n\
+++ b/crates/foo/src/lib.rs\n\
@@ -1 +1 @@\n\
-old\n\
+new\n\
diff --git a/crates/bar/src/lib.rs b/crates/bar/src/lib.rs\n\
index 3333333..4444444 100644\n\
--- a/crates/bar/src/lib.rs\n\
+++ b/crates/bar/src/lib.rs\n\
@@ -1 +1 @@\n\
-old\n\
+new\n\
diff --git a/README.md b/README.md\n\
index 5555555..6666666 100644\n\
--- a/README.md\n\
+++ b/README.md\n\
@@ -1 +1 @@\n\
-old\n\
+new\n";

    fn group_rule(directory: &str, branch: &str) -> Group {
        Group {
            directory: directory.to_string(),
            branch: branch.to_string(),
            repository: None,
        }
    }

    #[test]
    fn files_outside_any_group_go_to_default_branch() {
        let buckets = group(SAMPLE_DIFF, "main", &[], "acme/widgets");
        assert_eq!(buckets.len(), 1);
        assert!(buckets["main"].contains("README.md"));
        assert!(buckets["main"].contains("crates/foo"));
    }

    #[test]
    fn matching_group_buckets_its_files() {
        let groups = vec![group_rule("crates/foo", "foo-branch")];
        let buckets = group(SAMPLE_DIFF, "main", &groups, "acme/widgets");
        assert!(buckets["foo-branch"].contains("crates/foo"));
        assert!(!buckets["foo-branch"].contains("crates/bar"));
        assert!(buckets["main"].contains("crates/bar"));
        assert!(buckets["main"].contains("README.md"));
    }

    #[test]
    fn last_matching_rule_in_declaration_order_wins() {
        let groups = vec![
            group_rule("crates", "crates-branch"),
            group_rule("crates/foo", "foo-branch"),
        ];
        let buckets = group(SAMPLE_DIFF, "main", &groups, "acme/widgets");
        assert!(buckets["foo-branch"].contains("crates/foo"));
        assert!(buckets["crates-branch"].contains("crates/bar"));
        assert!(!buckets["crates-branch"].contains("crates/foo"));
    }

    #[test]
    fn empty_buckets_still_appear() {
        let groups = vec![group_rule("nonexistent/dir", "unused-branch")];
        let buckets = group(SAMPLE_DIFF, "main", &groups, "acme/widgets");
        assert_eq!(buckets["unused-branch"], "");
    }

    #[test]
    fn repository_scoped_rule_ignored_for_other_repositories() {
        let mut rule = group_rule("crates/foo", "foo-branch");
        rule.repository = Some("other/repo".to_string());
        let buckets = group(SAMPLE_DIFF, "main", &[rule], "acme/widgets");
        assert!(buckets["main"].contains("crates/foo"));
    }

    #[test]
    fn validate_branches_rejects_duplicate_with_default() {
        let groups = vec![group_rule("crates/foo", "main")];
        let err = validate_branches("main", &groups).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn validate_branches_rejects_duplicate_across_groups() {
        let groups = vec![group_rule("a", "shared"), group_rule("b", "shared")];
        let err = validate_branches("main", &groups).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn validate_branches_accepts_pairwise_distinct() {
        let groups = vec![group_rule("a", "branch-a"), group_rule("b", "branch-b")];
        assert!(validate_branches("main", &groups).is_ok());
    }
}
