//! Builders for the two template context shapes: [`StepContext`]
//! for step-time expansion, [`ChangesetTemplateContext`] for post-execution
//! expansion of the changeset template.

use std::collections::BTreeMap;

use batchforge_vcs::StepChanges;

use crate::model::{OutputValue, Repository};
use crate::template::value::Value;

fn output_value_to_value(value: &OutputValue) -> Value {
    match value {
        OutputValue::Text(s) => Value::scalar(s.clone()),
        OutputValue::Structured(json) => json_to_value(json),
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::scalar(b.to_string()),
        serde_json::Value::Number(n) => Value::scalar(n.to_string()),
        serde_json::Value::String(s) => Value::scalar(s.clone()),
        serde_json::Value::Array(items) => Value::Seq(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            Value::Map(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
    }
}

fn outputs_value(outputs: &std::collections::HashMap<String, OutputValue>) -> Value {
    Value::Map(
        outputs
            .iter()
            .map(|(k, v)| (k.clone(), output_value_to_value(v)))
            .collect(),
    )
}

fn repository_value(repository: &Repository) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::scalar(repository.name.clone()));
    map.insert(
        "search_result_paths".to_string(),
        repository
            .search_result_paths
            .as_ref()
            .map_or(Value::Null, |paths| Value::scalar(paths.join(" "))),
    );
    Value::Map(map)
}

fn batch_change_value(name: &str, description: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::scalar(name.to_string()));
    map.insert("description".to_string(), Value::scalar(description.to_string()));
    Value::Map(map)
}

fn step_changes_value(changes: &StepChanges, stdout: &str, stderr: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("modified_files".to_string(), Value::scalar_seq(changes.modified.clone()));
    map.insert("added_files".to_string(), Value::scalar_seq(changes.added.clone()));
    map.insert("deleted_files".to_string(), Value::scalar_seq(changes.deleted.clone()));
    map.insert("renamed_files".to_string(), Value::scalar_seq(changes.renamed.clone()));
    map.insert("stdout".to_string(), Value::scalar(stdout.to_string()));
    map.insert("stderr".to_string(), Value::scalar(stderr.to_string()));
    Value::Map(map)
}

/// Context for step-time expansion: `run`, `env`, `files`, and
/// `outputs.value`.
pub struct StepContext<'a> {
    /// The task's repository.
    pub repository: &'a Repository,
    /// The overall batch change's name.
    pub batch_change_name: &'a str,
    /// The overall batch change's description.
    pub batch_change_description: &'a str,
    /// The previous step's observations, if any (`None` for the first step).
    pub previous_step: Option<(&'a StepChanges, &'a str, &'a str)>,
    /// The current step's own observations so far (used when expanding
    /// `outputs.value`, after the command has run).
    pub current_step: Option<(&'a StepChanges, &'a str, &'a str)>,
    /// Accumulated named outputs across every step so far.
    pub outputs: &'a std::collections::HashMap<String, OutputValue>,
    /// The workspace's sub-path.
    pub path: &'a str,
}

impl StepContext<'_> {
    /// Build the [`Value::Map`] this context resolves to.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut root = BTreeMap::new();
        root.insert("repository".to_string(), repository_value(self.repository));
        root.insert(
            "batch_change".to_string(),
            batch_change_value(self.batch_change_name, self.batch_change_description),
        );
        root.insert(
            "previous_step".to_string(),
            self.previous_step
                .map_or(Value::Null, |(changes, out, err)| step_changes_value(changes, out, err)),
        );
        root.insert(
            "step".to_string(),
            self.current_step
                .map_or(Value::Null, |(changes, out, err)| step_changes_value(changes, out, err)),
        );
        root.insert("outputs".to_string(), outputs_value(self.outputs));
        let mut steps = BTreeMap::new();
        steps.insert("path".to_string(), Value::scalar(self.path.to_string()));
        root.insert("steps".to_string(), Value::Map(steps));
        Value::Map(root)
    }
}

/// Context for post-execution expansion of the changeset template. `steps`
/// here exposes the *cumulative* file changes across every step rather than
/// one step's.
pub struct ChangesetTemplateContext<'a> {
    /// The task's repository.
    pub repository: &'a Repository,
    /// The overall batch change's name.
    pub batch_change_name: &'a str,
    /// The overall batch change's description.
    pub batch_change_description: &'a str,
    /// Final accumulated named outputs.
    pub outputs: &'a std::collections::HashMap<String, OutputValue>,
    /// Cumulative file changes across every step.
    pub changed_files: &'a StepChanges,
    /// The workspace's sub-path.
    pub path: &'a str,
}

impl ChangesetTemplateContext<'_> {
    /// Build the [`Value::Map`] this context resolves to.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut root = BTreeMap::new();
        root.insert("repository".to_string(), repository_value(self.repository));
        root.insert(
            "batch_change".to_string(),
            batch_change_value(self.batch_change_name, self.batch_change_description),
        );
        root.insert("outputs".to_string(), outputs_value(self.outputs));

        let mut steps = BTreeMap::new();
        steps.insert(
            "modified_files".to_string(),
            Value::scalar_seq(self.changed_files.modified.clone()),
        );
        steps.insert(
            "added_files".to_string(),
            Value::scalar_seq(self.changed_files.added.clone()),
        );
        steps.insert(
            "deleted_files".to_string(),
            Value::scalar_seq(self.changed_files.deleted.clone()),
        );
        steps.insert(
            "renamed_files".to_string(),
            Value::scalar_seq(self.changed_files.renamed.clone()),
        );
        steps.insert("path".to_string(), Value::scalar(self.path.to_string()));
        root.insert("steps".to_string(), Value::Map(steps));

        Value::Map(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_repository() -> Repository {
        Repository {
            id: "repo-1".to_string(),
            name: "github.com/acme/widgets".to_string(),
            default_branch: "main".to_string(),
            default_branch_oid: "deadbeef".to_string(),
            search_result_paths: Some(vec!["a.txt".to_string(), "b.txt".to_string()]),
        }
    }

    #[test]
    fn step_context_exposes_previous_step_file_lists() {
        let changes = StepChanges {
            modified: vec!["main.go".to_string()],
            added: vec![],
            deleted: vec![],
            renamed: vec![],
        };
        let outputs = std::collections::HashMap::new();
        let context = StepContext {
            repository: &sample_repository(),
            batch_change_name: "bc",
            batch_change_description: "desc",
            previous_step: Some((&changes, "", "")),
            current_step: None,
            outputs: &outputs,
            path: "",
        };
        let value = context.to_value();
        let modified = value.get("previous_step").get("modified_files");
        assert_eq!(modified.render(), "[main.go]");
    }

    #[test]
    fn repository_search_result_paths_space_joined() {
        let outputs = std::collections::HashMap::new();
        let changes = StepChanges::default();
        let context = ChangesetTemplateContext {
            repository: &sample_repository(),
            batch_change_name: "bc",
            batch_change_description: "desc",
            outputs: &outputs,
            changed_files: &changes,
            path: "",
        };
        let value = context.to_value();
        assert_eq!(value.get("repository").get("search_result_paths").render(), "a.txt b.txt");
    }
}
