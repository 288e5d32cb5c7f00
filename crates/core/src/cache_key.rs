//! Execution Cache key derivation.
//!
//! A task's cache key folds together every input that can change its
//! execution result: repository identity and revision, the sub-path, the
//! step list (`run`/`container`/`env`/`files`/`outputs` definitions,
//! pre-expansion), the changeset template, the batch-change attributes, and
//! any transform rules. Cache-key equality implies reusability of the
//! cached [`crate::model::ExecutionResult`].

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::{BatchChangeAttributes, ChangesetTemplate, Step, TransformChanges};

/// Everything that determines whether a cached `ExecutionResult` is
/// reusable for a task.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionCacheKey {
    /// Repository id the task ran against.
    pub repository_id: String,
    /// Default branch commit OID of the repository at task-creation time.
    pub default_branch_oid: String,
    /// Commit OID the workspace was actually materialized from. Equal to
    /// `default_branch_oid` unless the caller pinned the task to a
    /// different ref.
    pub base_ref_oid: String,
    /// Sub-path within the repository.
    pub path: String,
    /// The task's step definitions, pre-expansion.
    pub steps: Vec<Step>,
    /// The changeset template.
    pub template: ChangesetTemplate,
    /// Batch-change name/description.
    pub batch_change_attributes: BatchChangeAttributes,
    /// Diff-to-branch transform rules, if any.
    pub transform: Option<TransformChanges>,
    /// Content id of each step's image, resolved via `image inspect`, in
    /// step order. Included so a mutable-tag image rebuild invalidates the
    /// cache even though a step's `container` string is unchanged.
    pub image_ids: Vec<String>,
}

impl ExecutionCacheKey {
    /// Hex-encoded SHA-256 digest of this key's stable JSON serialization.
    ///
    /// Every map-shaped field on this type (and transitively, on
    /// [`Step`]) is a `BTreeMap` rather than a `HashMap`, so the digest is
    /// reproducible across processes; a `HashMap`'s randomized iteration
    /// order would otherwise make two logically-identical keys hash
    /// differently.
    ///
    /// # Errors
    /// Returns an error only if a field fails to serialize, which does not
    /// happen for this type's shape.
    pub fn digest(&self) -> serde_json::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(bytes)))
    }
}
