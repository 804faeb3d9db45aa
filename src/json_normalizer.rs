//! Canonical JSON serialization (spec §4.2).
//!
//! This is the single source of truth for the bytes handed to the Git
//! Backend: blob oids are computed over exactly what [`canonicalize`]
//! produces, so two documents that are structurally equal always produce
//! the same blob regardless of how their source JSON happened to order its
//! keys.

use serde_json::Value;
use std::fmt::Write as _;

/// Serializes `value` with object keys sorted ascending at every nesting
/// level, two-space indentation, and a trailing newline.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    write_canonical(value, 0, &mut out);
    out.push('\n');
    out.into_bytes()
}

fn write_canonical(value: &Value, indent: usize, out: &mut String) {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('\n');
                push_indent(out, indent + 1);
                write_json_string(key, out);
                out.push_str(": ");
                write_canonical(&map[*key], indent + 1, out);
            }
            out.push('\n');
            push_indent(out, indent);
            out.push('}');
        }
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('\n');
                push_indent(out, indent + 1);
                write_canonical(item, indent + 1, out);
            }
            out.push('\n');
            push_indent(out, indent);
            out.push(']');
        }
        Value::String(s) => write_json_string(s, out),
        Value::Number(_) | Value::Bool(_) | Value::Null => {
            let _ = write!(out, "{value}");
        }
    }
}

fn push_indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // serde_json::Value's Display already quotes/escapes a string
    // correctly; reuse it rather than hand-rolling escaping rules.
    let _ = write!(out, "{}", Value::String(s.to_string()));
}

/// Parses `bytes` as JSON and immediately re-serializes it through
/// [`canonicalize`], so content-addressed identity is stable regardless of
/// the input's original key order or whitespace.
pub fn round_trip(bytes: &[u8]) -> serde_json::Result<Vec<u8>> {
    let value: Value = serde_json::from_slice(bytes)?;
    Ok(canonicalize(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_ascending_at_every_level() {
        let value = json!({"flower": "cherry blossoms", "_id": "nara", "nested": {"z": 1, "a": 2}});
        let bytes = canonicalize(&value);
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "{\n  \"_id\": \"nara\",\n  \"flower\": \"cherry blossoms\",\n  \"nested\": {\n    \"a\": 2,\n    \"z\": 1\n  }\n}\n"
        );
    }

    #[test]
    fn key_order_does_not_affect_canonical_bytes() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn round_trip_is_stable() {
        let bytes = br#"{"b":2,"a":1}"#;
        let once = round_trip(bytes).unwrap();
        let twice = round_trip(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_object_and_array_have_no_interior_newline() {
        let value = json!({"_id": "x", "tags": [], "meta": {}});
        let text = String::from_utf8(canonicalize(&value)).unwrap();
        assert!(text.contains("\"tags\": []"));
        assert!(text.contains("\"meta\": {}"));
    }
}
