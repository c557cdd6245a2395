//! Recovers a JSON object from a model completion.
//!
//! Model replies wrap the requested JSON in markdown fences, prose, or
//! both. Strategies are tried in order of decreasing trust: direct parse,
//! fenced code blocks, balanced-brace scan, first-`{`/last-`}` slice.

use serde_json::Value;

use crate::error::{MillError, Result};

pub fn extract_json(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    for block in fenced_blocks(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            return Ok(value);
        }
    }

    if let Some(candidate) = balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(MillError::JsonExtract {
        reason: "no parseable JSON object in response".to_string(),
    })
}

/// Contents of every ``` fenced block, with an optional language tag on the
/// opening fence stripped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let body_start = match after_open.find('\n') {
            Some(i) => i + 1,
            None => break,
        };
        let body = &after_open[body_start..];
        let Some(close) = body.find("```") else { break };
        blocks.push(&body[..close]);
        rest = &body[close + 3..];
    }
    blocks
}

/// First balanced top-level `{...}` in `text`, counting depth outside of
/// string literals and honoring backslash escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
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
    fn parses_raw_json() {
        let value = extract_json(r#"{"guest": "Shreyas Doshi"}"#).unwrap();
        assert_eq!(value, json!({"guest": "Shreyas Doshi"}));
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"guest\": \"April Dunford\"}\n```";
        let value = extract_json(raw).unwrap();
        assert_eq!(value, json!({"guest": "April Dunford"}));
    }

    #[test]
    fn skips_non_json_fences_and_takes_the_first_that_parses() {
        let raw = "```\nnot json at all\n```\nthen:\n```json\n{\"ok\": true}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn parses_json_surrounded_by_prose() {
        let raw = "Here is the extraction you asked for:\n\n{\"methodologies\": []}\n\nLet me know if you need more.";
        assert_eq!(extract_json(raw).unwrap(), json!({"methodologies": []}));
    }

    #[test]
    fn braces_inside_string_values_do_not_confuse_the_scan() {
        let raw = r#"Sure! {"quote": "use {curly} braces \" and } freely", "n": 1} trailing"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["n"], json!(1));
        assert_eq!(value["quote"], json!("use {curly} braces \" and } freely"));
    }

    #[test]
    fn exhaustion_is_a_parse_error() {
        let err = extract_json("the model refused to answer").unwrap_err();
        assert!(matches!(err, MillError::JsonExtract { .. }));
    }
}
