//! The template engine's dynamic value type.
//!
//! The source this engine's behavior is drawn from treats template context
//! as a loosely-typed mapping; here it is a small tagged union instead, so
//! every accessor and rendering rule is explicit rather than falling back on
//! reflection or stringly-typed lookups.

use std::collections::BTreeMap;
use std::fmt;

/// A value reachable from a template expression: either a leaf scalar, a
/// sequence (file lists, `join`/`split` results), a map (one navigation
/// level, e.g. `repository.name`), or the absence of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A missing field. Renders as `<no value>`; never raises.
    Null,
    /// A single string.
    Scalar(String),
    /// An ordered list of values, e.g. a file list.
    Seq(Vec<Value>),
    /// A nested map, navigated with `.field`.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a [`Value::Scalar`] from anything string-like.
    pub fn scalar(s: impl Into<String>) -> Self {
        Self::Scalar(s.into())
    }

    /// Build a [`Value::Seq`] of scalars from string-like items.
    pub fn scalar_seq<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Seq(items.into_iter().map(|s| Self::Scalar(s.into())).collect())
    }

    /// Navigate one `.field` step. `Null` for anything but a `Map`, or a
    /// `Map` without that key.
    #[must_use]
    pub fn get(&self, field: &str) -> Self {
        match self {
            Self::Map(map) => map.get(field).cloned().unwrap_or(Self::Null),
            _ => Self::Null,
        }
    }

    /// Index into a `Seq` by position. `Null` for anything but a `Seq`, or
    /// an out-of-range index.
    #[must_use]
    pub fn index(&self, i: usize) -> Self {
        match self {
            Self::Seq(items) => items.get(i).cloned().unwrap_or(Self::Null),
            _ => Self::Null,
        }
    }

    /// The scalar's string content, or `None` for any other variant.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The sequence's items, or `None` for any other variant.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Self::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// True booleanness for `if` conditions: the rendered string must equal
    /// exactly `"true"`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.render() == "true"
    }

    /// Render as it appears in expanded template output: `<no value>` for
    /// `Null`, `[a b c]` for a sequence, the flattened scalar string
    /// otherwise, and `{}`-free flattening for maps (maps are never the
    /// direct result of a whole-expression render in practice, but degrade
    /// gracefully rather than panicking).
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => "<no value>".to_string(),
            Self::Scalar(s) => s.clone(),
            Self::Seq(items) => {
                let rendered: Vec<String> = items.iter().map(Self::render).collect();
                format!("[{}]", rendered.join(" "))
            }
            Self::Map(_) => "<no value>".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
