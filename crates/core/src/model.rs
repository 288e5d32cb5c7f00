//! The batch execution engine's data model.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

pub use batchforge_vcs::StepChanges;

/// An immutable repository descriptor, as resolved by the out-of-scope
/// remote API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Server-assigned opaque id. Identity for cache-key and dedup purposes.
    pub id: String,
    /// Human-readable name, e.g. `"github.com/acme/widgets"`.
    pub name: String,
    /// The repository's default branch name.
    pub default_branch: String,
    /// Tip commit OID of `default_branch`.
    pub default_branch_oid: String,
    /// Paths matched by the originating search query, if any.
    pub search_result_paths: Option<Vec<String>>,
}

/// A step's `env` field: either an ordered list or a mapping of name to
/// (templated) value. Both forms expand to the same ordered pairs.
///
/// The mapping variant uses a `BTreeMap` rather than a `HashMap` so the
/// cache-key digest is stable across processes: `serde_json`
/// serializes map fields in the map's own iteration order, and only a
/// `BTreeMap`'s is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepEnv {
    /// `env: ["NAME=value", ...]` style list.
    List(Vec<String>),
    /// `env: {NAME: value, ...}` style mapping.
    Map(BTreeMap<String, String>),
}

impl StepEnv {
    /// Flatten into `(name, value)` pairs in declaration/key order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        match self {
            Self::List(entries) => entries
                .iter()
                .filter_map(|entry| entry.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Self::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// How a step output's expanded string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Stored verbatim as a string.
    Text,
    /// Parsed as JSON into a structured value.
    Json,
    /// Parsed as YAML into a structured value.
    Yaml,
}

/// One `outputs.<name>` entry: a templated expression plus how to parse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Templated expression evaluated against the current step's observations.
    pub value: String,
    /// How to interpret the expanded string.
    pub format: OutputFormat,
}

/// A named output value, after parsing per its declared [`OutputFormat`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    /// A plain string (format `text`, or parsing fell through).
    Text(String),
    /// A structured value (format `json` or `yaml`).
    Structured(serde_json::Value),
}

/// One step of a task: run a command in a container, optionally gated by
/// `if`, with templated environment, files, and named outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Shell command, templated, run via `/bin/sh -c`.
    pub run: String,
    /// Image reference the command runs in.
    pub container: String,
    /// Environment variables, each value templated.
    #[serde(default)]
    pub env: Option<StepEnv>,
    /// In-container path to templated file content, written before `run`.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Named outputs computed from this step's observations.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSpec>,
    /// Optional templated boolean gate; the step is skipped when it expands
    /// to anything other than `"true"`.
    #[serde(rename = "if", default)]
    pub if_condition: Option<String>,
}

/// How a changeset's `published` field resolves to a publication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishedState {
    /// Do not publish.
    False,
    /// Publish immediately.
    True,
    /// Publish as a draft.
    Draft,
}

/// One `published` rule: applies when `repository_glob` matches the task's
/// repository name and `branch` matches the branch a changeset spec was
/// produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRule {
    /// Glob matched against the repository's display name.
    pub repository_glob: String,
    /// Branch this rule applies to.
    pub branch: String,
    /// Resulting publication state when this rule matches.
    pub value: PublishedState,
}

/// The `published` field: a plain bool/string, or a list of per-repo/branch
/// rules evaluated in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Published {
    /// A single state applied to every changeset.
    Value(PublishedState),
    /// Rules evaluated in declaration order; first match wins.
    Rules(Vec<PublishedRule>),
}

impl Default for Published {
    fn default() -> Self {
        Self::Value(PublishedState::False)
    }
}

/// Every string field here is templated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChangesetTemplate {
    /// Changeset title.
    pub title: String,
    /// Changeset body/description.
    pub body: String,
    /// Branch name the default (ungrouped) diff is pushed to.
    pub branch: String,
    /// Commit message.
    pub commit_message: String,
    /// Commit author name; filled from `auto_author_details` if absent.
    #[serde(default)]
    pub commit_author_name: Option<String>,
    /// Commit author email; filled from `auto_author_details` if absent.
    #[serde(default)]
    pub commit_author_email: Option<String>,
    /// How to resolve the changeset's publication state.
    #[serde(default)]
    pub published: Published,
}

/// Metadata about the overall batch change a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchChangeAttributes {
    /// Batch change name.
    pub name: String,
    /// Batch change description.
    pub description: String,
}

/// One directory-to-branch rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// POSIX path prefix this rule matches.
    pub directory: String,
    /// Branch diffs under `directory` are routed to.
    pub branch: String,
    /// Restrict this rule to one repository by display name, if set.
    #[serde(default)]
    pub repository: Option<String>,
}

/// A list of [`Group`] rules splitting one task's diff into multiple
/// branch-scoped diffs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformChanges {
    /// The rules, evaluated in declaration order (last match wins).
    pub groups: Vec<Group>,
}

/// The unit of scheduling. Immutable once created; the executor
/// tracks mutable per-task state (its [`crate::error::TaskState`]) separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// The repository this task runs against.
    pub repository: Repository,
    /// Sub-path within the repository; `""` means the whole repo.
    pub path: String,
    /// Ordered steps to run.
    pub steps: Vec<Step>,
    /// The changeset template to expand after execution.
    pub template: ChangesetTemplate,
    /// Name/description of the overall batch change.
    pub batch_change_attributes: BatchChangeAttributes,
    /// Optional diff-to-branch splitting rules.
    #[serde(default)]
    pub transform: Option<TransformChanges>,
    /// Handle obtained from the Archive Store for this task's archive.
    pub archive_key: batchforge_cas::ArchiveKey,
    /// If true and `path != ""`, only files under `path` (plus
    /// `additional_files`) are materialized into the workspace.
    #[serde(default)]
    pub only_fetch_workspace: bool,
    /// Root-level files needed regardless of `path` (e.g. ignore files),
    /// pre-fetched by the caller: relative path to file content.
    #[serde(default)]
    pub additional_files: HashMap<String, Vec<u8>>,
}

/// Result of one step, as surfaced to later steps and observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Zero-based index of this step.
    pub index: usize,
    /// File changes observed after this step ran.
    pub files: StepChanges,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
    /// This step's own named outputs.
    pub outputs: HashMap<String, OutputValue>,
}

/// What the Step Runner produces for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Unified diff against the workspace's base commit.
    pub diff: String,
    /// Cumulative file changes across every step, re-derived from `diff`.
    pub changed_files: StepChanges,
    /// Accumulated named outputs; later steps override earlier ones.
    pub outputs: HashMap<String, OutputValue>,
}

/// A single commit inside a [`ChangesetSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// Commit message.
    pub message: String,
    /// Unified diff this commit applies.
    pub diff: String,
    /// Commit author name, if resolved.
    pub author_name: Option<String>,
    /// Commit author email, if resolved.
    pub author_email: Option<String>,
}

/// Output entity consumed by the out-of-scope upload operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesetSpec {
    /// The repository id the change is proposed against.
    pub base_repository: String,
    /// The branch the change targets.
    pub base_ref: String,
    /// The revision the change is based on.
    pub base_rev: String,
    /// The repository the head branch lives in (usually `base_repository`).
    pub head_repository: String,
    /// Always `refs/heads/<branch>`.
    pub head_ref: String,
    /// Expanded title.
    pub title: String,
    /// Expanded body.
    pub body: String,
    /// Resolved publication state.
    pub published: PublishedState,
    /// Exactly one commit.
    pub commits: Vec<Commit>,
}

impl ChangesetSpec {
    /// `refs/heads/<branch>` for `branch`.
    #[must_use]
    pub fn head_ref_for(branch: &str) -> String {
        format!("refs/heads/{branch}")
    }
}
