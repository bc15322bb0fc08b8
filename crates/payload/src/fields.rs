//! Per-field pattern fallback.
//!
//! Used when no complete object parses. Each configured field is located
//! independently by key, so a partially garbled object can still yield the
//! fields that survived.

use regex::Regex;
use serde_json::{Map, Value};

use ac_domain::config::{FallbackField, FieldKind};

/// A compiled matcher for one fallback field.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    key: String,
    kind: FieldKind,
    regex: Regex,
}

impl FieldPattern {
    pub fn compile(field: &FallbackField) -> Result<Self, regex::Error> {
        let key = regex::escape(&field.key);
        let pattern = match field.kind {
            FieldKind::String => format!(r#""{key}"\s*:\s*"((?:[^"\\]|\\.)*)""#),
            FieldKind::Number => format!(r#""{key}"\s*:\s*(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#),
            FieldKind::Array => format!(r#""{key}"\s*:\s*\["#),
        };
        Ok(Self {
            key: field.key.clone(),
            kind: field.kind,
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The first value for this field in `text`.
    pub fn find(&self, text: &str) -> Option<Value> {
        match self.kind {
            FieldKind::String => {
                let raw = self.regex.captures(text)?.get(1)?.as_str();
                let value = serde_json::from_str::<String>(&format!("\"{raw}\""))
                    .unwrap_or_else(|_| raw.to_owned());
                Some(Value::String(value))
            }
            FieldKind::Number => {
                let raw = self.regex.captures(text)?.get(1)?.as_str();
                serde_json::from_str::<Value>(raw).ok()
            }
            FieldKind::Array => {
                let m = self.regex.find(text)?;
                Some(array_at(&text[m.end() - 1..]))
            }
        }
    }
}

/// Compile every field, skipping (with a warning) any that fail.
pub fn compile_all(fields: &[FallbackField]) -> Vec<FieldPattern> {
    fields
        .iter()
        .filter_map(|f| match FieldPattern::compile(f) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(field = %f.key, error = %e, "skipping fallback field");
                None
            }
        })
        .collect()
}

/// Match every pattern against `text` and collect what was found.
///
/// When anything was found and `version` names a field that is still
/// missing, it is filled with its default.
pub fn collect(text: &str, patterns: &[FieldPattern], version: Option<(&str, &str)>) -> Map<String, Value> {
    let mut found = Map::new();
    for pattern in patterns {
        if let Some(value) = pattern.find(text) {
            found.insert(pattern.key.clone(), value);
        }
    }

    if let Some((field, default)) = version {
        if !found.is_empty() && !field.is_empty() && !found.contains_key(field) {
            found.insert(field.to_owned(), Value::String(default.to_owned()));
        }
    }
    found
}

/// Parse the array that opens at the start of `text`.
///
/// Tries the bracket-balanced slice first. Failing that, the leading object
/// in the text up to the first `]` is taken and wrapped. Anything else gives
/// an empty array.
fn array_at(text: &str) -> Value {
    if let Some(end) = balanced_bracket_end(text) {
        if let Ok(v @ Value::Array(_)) = serde_json::from_str::<Value>(&text[..end]) {
            return v;
        }
    }

    let inner = match text.find(']') {
        Some(close) => text[1..close].trim(),
        None => "",
    };
    if inner.starts_with('{') {
        let mut values = serde_json::Deserializer::from_str(inner).into_iter::<Value>();
        if let Some(Ok(obj @ Value::Object(_))) = values.next() {
            return Value::Array(vec![obj]);
        }
    }
    Value::Array(Vec::new())
}

/// Byte index just past the `]` matching the `[` at position 0.
fn balanced_bracket_end(text: &str) -> Option<usize> {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
