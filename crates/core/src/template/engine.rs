//! Expands `${{ expression }}` placeholders against a [`Value`] context.
//!
//! The expression language is pipeline-style: a leading function call or
//! bare path, optionally piped (`|`) into further function calls, each of
//! which receives the previous stage's value as its first argument.
//! Supported functions: `index`, `join`, `split`, `replace`, `join_if`,
//! `matches`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::template::value::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\{\{\s*(.*?)\s*\}\}").expect("static regex is valid"));

/// Expand every `${{ ... }}` placeholder in `template` against `context`.
/// A template with no placeholders expands to itself unchanged.
///
/// # Errors
/// Returns an error if an expression is malformed (empty pipeline stage, or
/// a function call with the wrong argument shape).
pub fn expand(template: &str, context: &Value) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;
    for capture in PLACEHOLDER.captures_iter(template) {
        let whole = capture.get(0).expect("group 0 always matches");
        let expr = capture.get(1).expect("capture group 1 always present").as_str();
        out.push_str(&template[last_end..whole.start()]);
        out.push_str(&eval(expr, context)?.render());
        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);
    Ok(out)
}

/// Evaluate one `${{ }}`-body expression (without the delimiters) to a
/// [`Value`], without rendering it to a string.
fn eval(expr: &str, context: &Value) -> Result<Value, Error> {
    let mut stages = expr.split('|').map(str::trim);
    let Some(first) = stages.next() else {
        return Err(Error::Template("empty expression".to_string()));
    };
    let mut value = eval_stage(first, context, None)?;
    for stage in stages {
        value = eval_stage(stage, context, Some(value))?;
    }
    Ok(value)
}

/// Evaluate one pipeline stage. `piped` is the previous stage's result,
/// prepended as the implicit first argument when present.
fn eval_stage(stage: &str, context: &Value, piped: Option<Value>) -> Result<Value, Error> {
    let tokens = tokenize(stage)?;
    let Some((head, rest)) = tokens.split_first() else {
        return Err(Error::Template("empty pipeline stage".to_string()));
    };

    if !is_function(head) {
        if rest.is_empty() && piped.is_none() {
            return Ok(resolve_path(context, head));
        }
        return Err(Error::Template(format!("unknown function: {head}")));
    }

    let mut args: Vec<Value> = Vec::with_capacity(rest.len() + 1);
    if let Some(piped) = piped {
        args.push(piped);
    }
    for token in rest {
        args.push(resolve_token(token, context));
    }
    call(head, &args)
}

fn is_function(name: &str) -> bool {
    matches!(name, "index" | "join" | "split" | "replace" | "join_if" | "matches")
}

/// Resolve one argument token: a quoted string literal, an integer literal,
/// or a dotted path into `context`.
fn resolve_token(token: &str, context: &Value) -> Value {
    if let Some(literal) = unquote(token) {
        return Value::scalar(literal);
    }
    if token.parse::<i64>().is_ok() {
        return Value::scalar(token);
    }
    resolve_path(context, token)
}

fn unquote(token: &str) -> Option<String> {
    let inner = token.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.replace("\\\"", "\"").replace("\\\\", "\\"))
}

/// Walk a dotted path (`repository.search_result_paths`) from `context`.
/// Any missing segment resolves to [`Value::Null`] rather than erroring.
fn resolve_path(context: &Value, path: &str) -> Value {
    let mut current = context.clone();
    for segment in path.split('.') {
        current = current.get(segment);
    }
    current
}

/// Split a pipeline stage into whitespace-separated tokens, treating
/// double-quoted substrings (with `\"`/`\\` escapes) as single tokens.
fn tokenize(stage: &str) -> Result<Vec<String>, Error> {
    let mut tokens = Vec::new();
    let mut chars = stage.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == '"' {
                in_quotes = false;
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                current.push(c);
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(Error::Template(format!("unterminated quoted string in: {stage}")));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn expect_arg<'a>(args: &'a [Value], index: usize, func: &str) -> Result<&'a Value, Error> {
    args.get(index)
        .ok_or_else(|| Error::Template(format!("{func}: missing argument {index}")))
}

fn expect_scalar<'a>(args: &'a [Value], index: usize, func: &str) -> Result<&'a str, Error> {
    expect_arg(args, index, func)?
        .as_scalar()
        .ok_or_else(|| Error::Template(format!("{func}: argument {index} is not a scalar")))
}

fn call(name: &str, args: &[Value]) -> Result<Value, Error> {
    match name {
        "index" => {
            let seq = expect_arg(args, 0, "index")?;
            let i: usize = expect_scalar(args, 1, "index")?
                .parse()
                .map_err(|_| Error::Template("index: second argument is not an integer".to_string()))?;
            Ok(seq.index(i))
        }
        "join" => {
            let seq = expect_arg(args, 0, "join")?;
            let sep = expect_scalar(args, 1, "join")?;
            let items = seq.as_seq().unwrap_or(&[]);
            Ok(Value::scalar(
                items.iter().map(Value::render).collect::<Vec<_>>().join(sep),
            ))
        }
        "join_if" => {
            let seq = expect_arg(args, 0, "join_if")?;
            let sep = expect_scalar(args, 1, "join_if")?;
            let items = seq.as_seq().unwrap_or(&[]);
            let rendered: Vec<String> = items
                .iter()
                .map(Value::render)
                .filter(|s| !s.is_empty() && s != "<no value>")
                .collect();
            Ok(Value::scalar(rendered.join(sep)))
        }
        "split" => {
            let s = expect_scalar(args, 0, "split")?;
            let sep = expect_scalar(args, 1, "split")?;
            if sep.is_empty() {
                Ok(Value::scalar_seq(s.chars().map(|c| c.to_string())))
            } else {
                Ok(Value::scalar_seq(s.split(sep)))
            }
        }
        "replace" => {
            let s = expect_scalar(args, 0, "replace")?;
            let old = expect_scalar(args, 1, "replace")?;
            let new = expect_scalar(args, 2, "replace")?;
            Ok(Value::scalar(s.replace(old, new)))
        }
        "matches" => {
            let s = expect_scalar(args, 0, "matches")?;
            let pattern = expect_scalar(args, 1, "matches")?;
            let re = Regex::new(pattern)
                .map_err(|e| Error::Template(format!("matches: invalid regex {pattern:?}: {e}")))?;
            Ok(Value::scalar(if re.is_match(s) { "true" } else { "false" }))
        }
        other => Err(Error::Template(format!("unknown function: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn repo_context() -> Value {
        let mut repository = BTreeMap::new();
        repository.insert("name".to_string(), Value::scalar("github.com/acme/widgets"));
        let mut previous_step = BTreeMap::new();
        previous_step.insert(
            "modified_files".to_string(),
            Value::scalar_seq(["main.go", "go.mod"]),
        );
        let mut root = BTreeMap::new();
        root.insert("repository".to_string(), Value::Map(repository));
        root.insert("previous_step".to_string(), Value::Map(previous_step));
        Value::Map(root)
    }

    #[test]
    fn plain_string_with_no_placeholder_is_identity() {
        assert_eq!(expand("go fmt main.go", &Value::Null).unwrap(), "go fmt main.go");
    }

    #[test]
    fn dotted_path_expands_to_scalar() {
        let out = expand("${{ repository.name }}", &repo_context()).unwrap();
        assert_eq!(out, "github.com/acme/widgets");
    }

    #[test]
    fn missing_field_renders_no_value_marker() {
        let out = expand("${{ repository.missing }}", &repo_context()).unwrap();
        assert_eq!(out, "<no value>");
    }

    #[test]
    fn join_function_space_separates_file_list() {
        let out = expand(
            r#"touch modified-${{ join previous_step.modified_files " " }}.md"#,
            &repo_context(),
        )
        .unwrap();
        assert_eq!(out, "touch modified-main.go go.mod.md");
    }

    #[test]
    fn pipeline_feeds_previous_stage_as_first_argument() {
        let out = expand(
            r#"${{ previous_step.modified_files | join "," }}"#,
            &repo_context(),
        )
        .unwrap();
        assert_eq!(out, "main.go,go.mod");
    }

    #[test]
    fn split_then_index_roundtrips_through_pipeline() {
        let out = expand(r#"${{ split "a,b,c" "," | index "1" }}"#, &Value::Null).unwrap();
        assert_eq!(out, "b");
    }

    #[test]
    fn replace_substitutes_literal_substring() {
        let out = expand(r#"${{ replace "foo-bar" "-" "_" }}"#, &Value::Null).unwrap();
        assert_eq!(out, "foo_bar");
    }

    #[test]
    fn matches_reports_regex_match_as_boolean_scalar() {
        let out = expand(r#"${{ matches "main.go" "\\.go$" }}"#, &Value::Null).unwrap();
        assert_eq!(out, "true");
    }

    #[test]
    fn join_if_skips_empty_and_missing_entries() {
        let seq = Value::Seq(vec![Value::scalar("a"), Value::Null, Value::scalar("")]);
        let mut root = BTreeMap::new();
        root.insert("xs".to_string(), seq);
        let out = expand(r#"${{ join_if xs "," }}"#, &Value::Map(root)).unwrap();
        assert_eq!(out, "a");
    }
}
