//! Changeset Spec Builder: turns a grouped diff and the expanded template
//! into one [`ChangesetSpec`] per non-empty branch bucket.

use glob::Pattern;

use crate::error::Error;
use crate::model::{
    ChangesetSpec, ChangesetTemplate, Commit, PublishedRule, PublishedState, Published, Repository,
};
use crate::template::{ChangesetTemplateContext, Value, expand};

/// Well-known commit author filled in when a template leaves author fields
/// empty and `auto_author_details` is enabled.
pub const AUTO_AUTHOR_NAME: &str = "batch-changes";
/// Email paired with [`AUTO_AUTHOR_NAME`].
pub const AUTO_AUTHOR_EMAIL: &str = "batch-changes@localhost";

/// Resolve a `published` field to a concrete [`PublishedState`] for one
/// produced branch. The first rule whose repository-name glob and branch
/// both match wins; an unmatched rule list resolves to `false`.
#[must_use]
pub fn resolve_published(published: &Published, repository_name: &str, branch: &str) -> PublishedState {
    match published {
        Published::Value(state) => *state,
        Published::Rules(rules) => resolve_rules(rules, repository_name, branch),
    }
}

fn resolve_rules(rules: &[PublishedRule], repository_name: &str, branch: &str) -> PublishedState {
    rules
        .iter()
        .find(|rule| {
            rule.branch == branch
                && Pattern::new(&rule.repository_glob).is_ok_and(|p| p.matches(repository_name))
        })
        .map_or(PublishedState::False, |rule| rule.value)
}

/// Build one [`ChangesetSpec`] for a single (branch, diff) bucket produced
/// by the Diff Grouper, expanding every templated string field against
/// `context`.
///
/// # Errors
/// Returns an error if any template field fails to expand.
pub fn build_spec(
    template: &ChangesetTemplate,
    context: &ChangesetTemplateContext<'_>,
    repository: &Repository,
    branch: &str,
    diff: &str,
    base_rev: &str,
    auto_author_details: bool,
) -> Result<ChangesetSpec, Error> {
    let context_value: Value = context.to_value();
    let title = expand(&template.title, &context_value)?;
    let body = expand(&template.body, &context_value)?;
    let commit_message = expand(&template.commit_message, &context_value)?;

    let author_name = expand_optional(template.commit_author_name.as_deref(), &context_value)?;
    let author_email = expand_optional(template.commit_author_email.as_deref(), &context_value)?;

    let (author_name, author_email) = match (author_name, author_email) {
        (Some(name), Some(email)) => (Some(name), Some(email)),
        (None, None) if auto_author_details => {
            (Some(AUTO_AUTHOR_NAME.to_string()), Some(AUTO_AUTHOR_EMAIL.to_string()))
        }
        (name, email) => (name, email),
    };

    let published = resolve_published(&template.published, &repository.name, branch);

    Ok(ChangesetSpec {
        base_repository: repository.id.clone(),
        base_ref: repository.default_branch.clone(),
        base_rev: base_rev.to_string(),
        head_repository: repository.id.clone(),
        head_ref: ChangesetSpec::head_ref_for(branch),
        title,
        body,
        published,
        commits: vec![Commit {
            message: commit_message,
            diff: diff.to_string(),
            author_name,
            author_email,
        }],
    })
}

fn expand_optional(field: Option<&str>, context: &Value) -> Result<Option<String>, Error> {
    field.map(|s| expand(s, context)).transpose()
}
