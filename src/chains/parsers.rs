//! JSON extraction and parsing of model responses.
//!
//! Models wrap JSON in markdown fences, prose, or return it bare; the
//! extractor tries a fenced block first, then the whole body, then the
//! first balanced object found in the text. Every numeric score is
//! clamped to [0, 1] at the parse boundary.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

use crate::tree::NodeEvaluation;

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

/// Extract a JSON object from model output.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(captures) = fence_pattern().captures(text) {
        if let Ok(value) = serde_json::from_str(&captures[1]) {
            return Some(value);
        }
    }

    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    first_balanced_object(text).and_then(|candidate| serde_json::from_str(candidate).ok())
}

/// Find the first balanced `{...}` span in the text, string-aware.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn clamp_score(value: Option<&Value>, default: f64) -> f64 {
    value
        .and_then(Value::as_f64)
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}

/// One candidate thought proposed by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ThoughtSpec {
    #[serde(default)]
    pub reasoning: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_params: Value,
    #[serde(default)]
    pub explanation: String,
}

/// Parse the thought-generation response into validated specs.
///
/// Entries missing a tool name are skipped; an unparsable body yields
/// an empty list (the orchestrator then falls back to the rule-based
/// strategy).
pub fn parse_thoughts(text: &str) -> Vec<ThoughtSpec> {
    let Some(parsed) = extract_json(text) else {
        warn!(snippet = %text.chars().take(120).collect::<String>(), "failed to extract thoughts JSON");
        return Vec::new();
    };

    let Some(thoughts) = parsed.get("thoughts").and_then(Value::as_array) else {
        warn!("no thoughts array in response");
        return Vec::new();
    };

    thoughts
        .iter()
        .filter_map(|raw| match serde_json::from_value::<ThoughtSpec>(raw.clone()) {
            Ok(spec) => Some(spec),
            Err(_) => {
                warn!("skipping malformed thought entry");
                None
            }
        })
        .collect()
}

/// Parse a promise score; 0.5 when absent or unparsable.
pub fn parse_promise(text: &str) -> f64 {
    let Some(parsed) = extract_json(text) else {
        warn!("failed to parse promise evaluation, using default 0.5");
        return 0.5;
    };
    clamp_score(parsed.get("promise_score"), 0.5)
}

/// Parse a post-execution node evaluation with defensive defaults.
pub fn parse_node_evaluation(text: &str) -> NodeEvaluation {
    let Some(parsed) = extract_json(text) else {
        warn!("failed to parse node evaluation, using defaults");
        return NodeEvaluation {
            completeness: 0.5,
            relevance: 0.5,
            quality: 0.5,
            should_continue: true,
        };
    };

    NodeEvaluation {
        completeness: clamp_score(parsed.get("completeness_score"), 0.5),
        relevance: clamp_score(parsed.get("relevance_score"), 0.5),
        quality: clamp_score(parsed.get("quality_score"), 0.5),
        should_continue: parsed
            .get("should_continue")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    }
}

/// Model-assisted validation verdict.
#[derive(Debug, Clone)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub reason: String,
    pub sanitized_input: String,
    pub detected_issues: Vec<String>,
}

/// Parse a validation response; assumes valid when unparsable so a
/// flaky validator model never blocks rule-checked input.
pub fn parse_validation(text: &str) -> ValidationVerdict {
    let Some(parsed) = extract_json(text) else {
        warn!("failed to parse validation response, assuming valid");
        return ValidationVerdict {
            is_valid: true,
            reason: "validation response unparsable".to_string(),
            sanitized_input: String::new(),
            detected_issues: Vec::new(),
        };
    };

    ValidationVerdict {
        is_valid: parsed.get("is_valid").and_then(Value::as_bool).unwrap_or(true),
        reason: parsed
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        sanitized_input: parsed
            .get("sanitized_input")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        detected_issues: parsed
            .get("detected_issues")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Parse batch scoring results `{"results": [{"doc_id": n, ...}]}`,
/// returning the raw entries for the caller to interpret.
pub fn parse_batch_results(text: &str) -> Option<Vec<Value>> {
    extract_json(text)?
        .get("results")
        .and_then(Value::as_array)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_from_fenced_block() {
        let text = "Вот ответ:\n```json\n{\"promise_score\": 0.9}\n```\nГотово.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["promise_score"], 0.9);
    }

    #[test]
    fn test_extract_bare_json() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = r#"Оценка готова: {"completeness_score": 0.7, "nested": {"x": 1}} - конец"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["completeness_score"], 0.7);
        assert_eq!(value["nested"]["x"], 1);
    }

    #[test]
    fn test_balanced_scan_ignores_braces_in_strings() {
        let text = r#"prefix {"key": "value with } brace"} suffix"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["key"], "value with } brace");
    }

    #[test]
    fn test_parse_thoughts_skips_missing_tool_name() {
        let text = r#"{"thoughts": [
            {"reasoning": "ищем теорию", "tool_name": "adaptive_rag_search", "tool_params": {"query": "q"}},
            {"reasoning": "без инструмента"}
        ]}"#;
        let thoughts = parse_thoughts(text);
        assert_eq!(thoughts.len(), 1);
        assert_eq!(thoughts[0].tool_name, "adaptive_rag_search");
        assert_eq!(thoughts[0].tool_params["query"], "q");
    }

    #[test]
    fn test_parse_thoughts_garbage_is_empty() {
        assert!(parse_thoughts("не json вообще").is_empty());
        assert!(parse_thoughts(r#"{"other": 1}"#).is_empty());
    }

    #[test]
    fn test_parse_promise_clamps() {
        assert_eq!(parse_promise(r#"{"promise_score": 1.7}"#), 1.0);
        assert_eq!(parse_promise(r#"{"promise_score": -0.3}"#), 0.0);
        assert_eq!(parse_promise("мусор"), 0.5);
    }

    #[test]
    fn test_parse_node_evaluation_defaults() {
        let eval = parse_node_evaluation("ничего");
        assert_eq!(eval.completeness, 0.5);
        assert!(eval.should_continue);

        let eval = parse_node_evaluation(
            r#"{"completeness_score": 0.9, "relevance_score": 0.8, "quality_score": 2.0, "should_continue": false}"#,
        );
        assert_eq!(eval.completeness, 0.9);
        assert_eq!(eval.quality, 1.0);
        assert!(!eval.should_continue);
    }

    #[test]
    fn test_parse_validation_fail_open() {
        let verdict = parse_validation("нет ответа");
        assert!(verdict.is_valid);

        let verdict = parse_validation(
            r#"{"is_valid": false, "reason": "injection", "detected_issues": ["prompt_injection"]}"#,
        );
        assert!(!verdict.is_valid);
        assert_eq!(verdict.detected_issues, vec!["prompt_injection"]);
    }

    #[test]
    fn test_parse_batch_results() {
        let entries = parse_batch_results(
            r#"{"results": [{"doc_id": 0, "relevance_score": 0.8}, {"doc_id": 1, "relevance_score": 0.2}]}"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
    }
}
