//! Tool call parsing: recovers tool invocations from model text.
//!
//! Some completion backends answer with the tool call written inline as JSON
//! instead of using the structured `tool_calls` field:
//!
//! ```text
//! The pod is OOMKilled.
//! {"name":"create_issue","arguments":{"title":"Pod OOMKilled","body":"..."}}
//! ```
//!
//! The scanner walks every `{` in the text, takes the shortest brace-balanced
//! span starting there, and tries to decode it. Braces inside string literals
//! are counted like any other brace. Nothing here returns an error: malformed
//! candidates are skipped.

use serde_json::{Map, Value};

use super::types::ToolInvocation;

// ─── Balanced spans ──────────────────────────────────────────────────────────

/// Lazily yields the shortest brace-balanced span starting at each `{`, in
/// order of start offset. Start offsets with no balanced span are skipped.
pub struct BalancedSpans<'a> {
    text: &'a str,
    next_start: usize,
}

impl<'a> BalancedSpans<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            next_start: 0,
        }
    }
}

impl<'a> Iterator for BalancedSpans<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let bytes = self.text.as_bytes();

        while self.next_start < bytes.len() {
            let start = self.next_start;
            self.next_start += 1;
            if bytes[start] != b'{' {
                continue;
            }

            let mut depth = 0usize;
            for (offset, &b) in bytes[start..].iter().enumerate() {
                match b {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            // Both ends are ASCII braces, so these are char boundaries.
                            return Some(&self.text[start..=start + offset]);
                        }
                    }
                    _ => {}
                }
            }
        }
        None
    }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Find the first JSON object in `text` that names a tool.
///
/// A candidate is accepted when it decodes to an object with a string `name`
/// and, if `valid_names` is given, that name is in the list. Arguments come
/// from a non-empty `arguments` field, else `parameters`, else `{}`.
pub fn extract_tool_call(text: &str, valid_names: Option<&[String]>) -> Option<ToolInvocation> {
    BalancedSpans::new(text).find_map(|span| {
        let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(span) else {
            return None;
        };

        let name = object.get("name")?.as_str()?.to_string();
        if let Some(valid) = valid_names {
            if !valid.iter().any(|v| *v == name) {
                return None;
            }
        }

        let arguments = match object.remove("arguments") {
            Some(args) if !is_empty_value(&args) => args,
            _ => object
                .remove("parameters")
                .filter(|p| !p.is_null())
                .unwrap_or_else(|| Value::Object(Map::new())),
        };

        Some(ToolInvocation { name, arguments })
    })
}

/// Decode a structured call's argument string.
///
/// Malformed JSON and non-object values yield `{}`.
pub fn parse_arguments_lenient(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            tracing::debug!(arguments = %other, "tool call arguments are not an object");
            Value::Object(Map::new())
        }
        Err(e) => {
            tracing::debug!(error = %e, "malformed tool call arguments, using {{}}");
            Value::Object(Map::new())
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
