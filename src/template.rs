//! `${path}` expansion for rule action strings.
//!
//! References are dotted paths into a JSON input, e.g. `${payload.level}`
//! or `${items.0.name}` for array elements. Whitespace inside the braces is
//! ignored. Text that is not a reference is copied unchanged.
//!
//! | Value at path | Rendered as |
//! |---------------|-------------|
//! | string | the string itself |
//! | anything else | its JSON text (`42`, `true`, `null`, `{"a":1}`) |
//!
//! A single unresolved reference fails the whole expansion.
//!
//! # Example
//!
//! ```
//! use pimatic_bridge::template::expand;
//! use serde_json::json;
//!
//! let input = json!({"room": {"light": "lamp1"}});
//! assert_eq!(expand("turn on ${room.light}", &input).unwrap(), "turn on lamp1");
//! assert!(expand("turn on ${room.fan}", &input).is_err());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Pattern
// ============================================================================

/// `${ path }`; the path itself has no whitespace or `}`.
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([^\s}]+)\s*\}").expect("reference pattern is a valid literal")
});

// ============================================================================
// Expansion
// ============================================================================

/// Replaces every `${path}` in `template` with the value at `path` in
/// `input`.
///
/// # Errors
///
/// Returns [`Error::UnresolvedReference`] naming the first path that does
/// not resolve.
pub fn expand(template: &str, input: &Value) -> Result<String> {
    let mut missing: Option<String> = None;

    let expanded = REFERENCE.replace_all(template, |caps: &Captures<'_>| {
        let path = &caps[1];
        match lookup(input, path) {
            Some(value) => render(value),
            None => {
                missing.get_or_insert_with(|| path.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(path) => Err(Error::unresolved_reference(path)),
        None => Ok(expanded.into_owned()),
    }
}

/// Lists the paths referenced by `template`, in order.
#[must_use]
pub fn references(template: &str) -> Vec<&str> {
    REFERENCE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Resolves a dotted path.
fn lookup<'a>(input: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(input, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Renders a resolved value into text.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
