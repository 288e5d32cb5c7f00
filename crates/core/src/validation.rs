//! Cross-changeset validation: once every task has produced its
//! [`ChangesetSpec`]s, confirm no two specs collide on the same repository
//! and head branch.

use std::collections::HashSet;

use crate::error::Error;
use crate::model::ChangesetSpec;

/// Check that, within `specs`, no two entries share both a `base_repository`
/// and a `head_ref`.
///
/// # Errors
/// Returns [`Error::Validation`] naming the first colliding
/// `(base_repository, head_ref)` pair found.
pub fn validate_distinct_head_refs(specs: &[ChangesetSpec]) -> Result<(), Error> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for spec in specs {
        let key = (spec.base_repository.as_str(), spec.head_ref.as_str());
        if !seen.insert(key) {
            return Err(Error::Validation(format!(
                "changeset spec for branch {:?} in repository {:?} was produced more than once",
                spec.head_ref, spec.base_repository
            )));
        }
    }
    Ok(())
}
