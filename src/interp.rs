//! The `{field}` interpolation sublanguage.
//!
//! Templates are plain strings containing zero or more `{name}`
//! placeholders, where `name` may be a dotted path into nested objects
//! (`{context.id}`). A template that consists of exactly one
//! placeholder resolves to the field's raw JSON value, preserving its
//! type; every other template renders to a string, substituting each
//! placeholder's stringified value.

use crate::registry::Object;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

/// Matches a template that is exactly one placeholder.
static SINGLE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{([\w.]+)\}$").unwrap());

/// Matches every placeholder occurrence inside a template.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([\w.]+)\}").unwrap());

/// If `template` is a single bare placeholder, return its field path.
pub fn single_field(template: &str) -> Option<&str> {
    SINGLE_FIELD
        .captures(template)
        .map(|caps| caps.get(1).unwrap().as_str())
}

/// Resolve a possibly-dotted field path against an object.
pub fn lookup<'a>(obj: &'a Object, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = obj.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Stringify a value for substitution, comparison and display.
///
/// Null becomes the empty string, bools and numbers their canonical
/// text, strings pass through unquoted, and arrays/objects serialize
/// as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a value as a number for coercing comparisons.
///
/// Numbers pass through; strings are accepted when their text parses
/// as a float. Everything else (and the empty string) is non-numeric.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a template against an object.
///
/// The single-placeholder form returns the raw field value (missing
/// field yields `Null`); any other template substitutes stringified
/// values (missing fields become empty strings) and returns a string.
/// A template without placeholders is returned unchanged.
pub fn render(template: &str, obj: &Object) -> Value {
    if let Some(field) = single_field(template) {
        return lookup(obj, field).cloned().unwrap_or(Value::Null);
    }
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        lookup(obj, &caps[1]).map(stringify).unwrap_or_default()
    });
    Value::String(rendered.into_owned())
}

/// Render a pipeline-line template, shell-quoting each substituted
/// value so it survives re-tokenization as a single word.
pub fn render_quoted(template: &str, obj: &Object) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let value = lookup(obj, &caps[1]).map(stringify).unwrap_or_default();
            shell_words::quote(&value).into_owned()
        })
        .into_owned()
}

/// The set of placeholder field paths in a template, in order of first
/// appearance.
pub fn template_fields(template: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !fields.iter().any(|f| f == name) {
            fields.push(name.to_string());
        }
    }
    fields
}

/// Split `key=template` mapping arguments.
///
/// A bare `name` argument is shorthand for `name={name}`, so `map a`
/// projects the field `a` through with its raw type.
pub fn parse_mappings(args: &[String]) -> Vec<(String, String)> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, template)) => (key.to_string(), template.to_string()),
            None => (arg.clone(), format!("{{{arg}}}")),
        })
        .collect()
}
