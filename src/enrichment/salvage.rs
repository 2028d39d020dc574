//! # Extraction Output Salvage
//!
//! Language models asked for JSON return, in practice, a spectrum of
//! near-JSON: clean documents, documents wrapped in markdown fences,
//! documents embedded in prose, and free text. Rather than discarding
//! everything that is not strictly valid, salvage proceeds through
//! progressively weaker interpretations and always produces *something*
//! structured for non-empty input.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Field under which unsalvageable text is preserved verbatim.
const RAW_TEXT_FIELD: &str = "raw_text";

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        // Non-greedy across lines: first fenced block only.
        Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap()
    })
}

/// Interpret raw model output as structured JSON.
///
/// Rungs, strongest first:
/// 1. the whole text is a JSON object or array;
/// 2. a markdown-fenced block contains one;
/// 3. the first balanced `{...}` span in the text parses as an object;
/// 4. wrap the text verbatim under `raw_text`.
///
/// Only empty (or whitespace-only) input yields `None`. Scalars like a bare
/// string or number are not accepted as extraction output at any rung.
pub fn structured_from_text(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(value) = parse_container(trimmed) {
        return Some(value);
    }

    if let Some(captures) = fence_regex().captures(trimmed) {
        if let Some(value) = parse_container(captures[1].trim()) {
            return Some(value);
        }
    }

    if let Some(span) = first_balanced_object(trimmed) {
        if let Some(value) = parse_container(span) {
            return Some(value);
        }
    }

    Some(serde_json::json!({ RAW_TEXT_FIELD: trimmed }))
}

/// Parse text as JSON, accepting only objects and arrays.
fn parse_container(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// The first balanced top-level `{...}` span, tracked with string and escape
/// awareness so braces inside JSON strings do not confuse the count.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_json_object() {
        let value = structured_from_text(r#"{"summary": "quiet sun", "kp": 3}"#).unwrap();
        assert_eq!(value, json!({"summary": "quiet sun", "kp": 3}));
    }

    #[test]
    fn test_clean_json_array() {
        let value = structured_from_text(r#"[{"event": "FLR"}]"#).unwrap();
        assert_eq!(value, json!([{"event": "FLR"}]));
    }

    #[test]
    fn test_fenced_block() {
        let raw = "Here is the extraction:\n```json\n{\"summary\": \"M-class flare\"}\n```\nDone.";
        let value = structured_from_text(raw).unwrap();
        assert_eq!(value, json!({"summary": "M-class flare"}));
    }

    #[test]
    fn test_fence_without_language_tag() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(structured_from_text(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_embedded_object_in_prose() {
        let raw = r#"The model says {"summary": "all quiet", "events": []} which looks right."#;
        let value = structured_from_text(raw).unwrap();
        assert_eq!(value, json!({"summary": "all quiet", "events": []}));
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_scan() {
        let raw = r#"note {"text": "a } inside", "n": 1} trailing"#;
        let value = structured_from_text(raw).unwrap();
        assert_eq!(value, json!({"text": "a } inside", "n": 1}));
    }

    #[test]
    fn test_free_text_wrapped() {
        let value = structured_from_text("  no structure here at all  ").unwrap();
        assert_eq!(value, json!({"raw_text": "no structure here at all"}));
    }

    #[test]
    fn test_bare_scalar_wrapped_not_accepted() {
        // A bare string is valid JSON but not a useful extraction result.
        let value = structured_from_text(r#""just a string""#).unwrap();
        assert_eq!(value, json!({"raw_text": "\"just a string\""}));
    }

    #[test]
    fn test_empty_input_yields_none() {
        assert_eq!(structured_from_text(""), None);
        assert_eq!(structured_from_text("   \n\t "), None);
    }

    #[test]
    fn test_unbalanced_braces_fall_through_to_wrap() {
        let raw = r#"broken {"a": 1"#;
        let value = structured_from_text(raw).unwrap();
        assert_eq!(value, json!({"raw_text": raw}));
    }
}
