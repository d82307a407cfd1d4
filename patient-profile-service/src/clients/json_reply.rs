//! Cleanup for model replies that are supposed to be a JSON object.
//!
//! Models wrap JSON in code fences or add a sentence before it often enough
//! that every JSON reply goes through [`parse_json_object`] before use.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::markdown_fields::insert_field;
use crate::models::FieldMap;

static RE_FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(```|''')[a-z]*[ \t]*\n?").expect("valid regex"));
static RE_FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n?[ \t]*(```|''')\s*$").expect("valid regex"));

/// Remove one leading and one trailing code fence, if present.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = RE_FENCE_OPEN.replace(trimmed, "");
    RE_FENCE_CLOSE.replace(&without_open, "").trim().to_string()
}

/// Parse a model reply into a JSON object, tolerating fences and chatter
/// around the object itself.
pub fn parse_json_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    let cleaned = strip_code_fences(raw);

    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => return Err(anyhow::anyhow!("No JSON object found in model response")),
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(anyhow::anyhow!(
            "Expected a JSON object, got {}",
            json_type_name(&other)
        )),
        Err(e) => Err(anyhow::anyhow!("Failed to parse JSON object: {}", e)),
    }
}

/// Flatten a JSON object into string fields.
///
/// Nested objects become `"Parent - Child"` keys, arrays of scalars are joined
/// with `", "`, and nulls or empty values are dropped. Keys that collide after
/// flattening keep every distinct value, joined with `"; "`.
pub fn flatten_fields(object: &Map<String, Value>) -> FieldMap {
    let mut fields = FieldMap::new();
    for (key, value) in object {
        flatten_into(&mut fields, key.trim(), value);
    }
    fields
}

fn flatten_into(fields: &mut FieldMap, key: &str, value: &Value) {
    if key.is_empty() {
        return;
    }
    match value {
        Value::Object(children) => {
            for (child_key, child_value) in children {
                let child_key = child_key.trim();
                if child_key.is_empty() {
                    continue;
                }
                flatten_into(fields, &format!("{} - {}", key, child_key), child_value);
            }
        }
        Value::Array(items) if items.iter().any(|item| item.is_object()) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(fields, &format!("{} {}", key, index + 1), item);
            }
        }
        other => {
            if let Some(text) = scalar_text(other) {
                insert_field(fields, key.to_string(), text);
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
