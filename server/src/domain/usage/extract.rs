//! Usage entry extraction from arbitrary payload trees
//!
//! Walks a payload depth-first. At each object the best usage container
//! child (actual before estimated, then larger total) becomes the entry for
//! that subtree and the walk stops there. Objects that carry usage fields
//! themselves become `direct_usage_object` entries.

use serde_json::{Map, Value as JsonValue};

use super::metrics::{UsageMetrics, derive_metrics};

/// Source label for objects that are themselves usage objects
pub const DIRECT_USAGE_SOURCE: &str = "direct_usage_object";

/// Container names (normalized) holding provider-reported usage
const ACTUAL_CONTAINERS: &[&str] = &[
    "usage",
    "usagemetadata",
    "usage_metadata",
    "amazon-bedrock-invocationmetrics",
    "amazon-bedrock-invocation_metrics",
];

/// Container names (normalized) holding client-side estimates
const ESTIMATED_CONTAINERS: &[&str] = &[
    "estimatedtokenusage",
    "estimated_token_usage",
    "tokenusage",
    "token_usage",
];

const MODEL_KEYS: &[&str] = &["model", "modelName", "model_name"];
const RESPONSE_METADATA_KEYS: &[&str] = &["response_metadata", "responseMetadata"];

/// Keys whose presence marks an object as a usage object
const USAGE_SIGNAL_KEYS: &[&str] = &[
    "input_tokens",
    "inputTokens",
    "output_tokens",
    "outputTokens",
    "total_tokens",
    "prompt_tokens",
    "promptTokens",
    "completion_tokens",
    "completionTokens",
    "inputTokenCount",
    "outputTokenCount",
    "totalTokens",
];

/// One usage-bearing object found in a payload
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    pub usage: JsonValue,
    pub model: Option<String>,
    pub source: String,
    pub metrics: UsageMetrics,
}

/// Extract every usage entry from `payload`, in visitation order
pub fn extract_usage_entries(payload: &JsonValue) -> Vec<UsageEntry> {
    let mut entries = Vec::new();
    walk(payload, None, &mut entries);
    entries
}

fn walk(value: &JsonValue, inherited_model: Option<&str>, out: &mut Vec<UsageEntry>) {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                walk(item, inherited_model, out);
            }
        }
        JsonValue::Object(obj) => {
            let model = resolve_model(obj).or(inherited_model);

            if let Some(entry) = select_container(obj, model) {
                out.push(entry);
                return;
            }

            if has_usage_signals(obj) {
                out.push(UsageEntry {
                    metrics: derive_metrics(value),
                    usage: value.clone(),
                    model: model.map(str::to_string),
                    source: DIRECT_USAGE_SOURCE.to_string(),
                });
                return;
            }

            for child in obj.values() {
                if child.is_object() || child.is_array() {
                    walk(child, model, out);
                }
            }
        }
        _ => {}
    }
}

/// Container names lose camel case the same way metric keys do
fn normalize_container_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

fn container_priority(normalized: &str) -> Option<u8> {
    if ACTUAL_CONTAINERS.contains(&normalized) {
        Some(1)
    } else if ESTIMATED_CONTAINERS.contains(&normalized) {
        Some(2)
    } else {
        None
    }
}

fn select_container(obj: &Map<String, JsonValue>, model: Option<&str>) -> Option<UsageEntry> {
    let mut candidates: Vec<(u8, UsageEntry)> = obj
        .iter()
        .filter(|(_, child)| child.is_object() || child.is_array())
        .filter_map(|(key, child)| {
            let normalized = normalize_container_key(key);
            let priority = container_priority(&normalized)?;
            Some((
                priority,
                UsageEntry {
                    metrics: derive_metrics(child),
                    usage: child.clone(),
                    model: model.map(str::to_string),
                    source: normalized,
                },
            ))
        })
        .collect();

    // Stable sort keeps object order among equal candidates
    candidates.sort_by(|(pa, a), (pb, b)| {
        pa.cmp(pb).then_with(|| {
            b.metrics
                .total_tokens()
                .partial_cmp(&a.metrics.total_tokens())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    candidates.into_iter().next().map(|(_, entry)| entry)
}

fn non_empty_str(value: Option<&JsonValue>) -> Option<&str> {
    value
        .and_then(JsonValue::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn model_from_keys(obj: &Map<String, JsonValue>) -> Option<&str> {
    MODEL_KEYS.iter().find_map(|k| non_empty_str(obj.get(*k)))
}

fn resolve_model(obj: &Map<String, JsonValue>) -> Option<&str> {
    model_from_keys(obj).or_else(|| {
        RESPONSE_METADATA_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(JsonValue::as_object))
            .and_then(model_from_keys)
    })
}

fn has_usage_signals(obj: &Map<String, JsonValue>) -> bool {
    USAGE_SIGNAL_KEYS.iter().any(|k| obj.contains_key(*k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::TokenMetric;
    use serde_json::json;

    #[test]
    fn test_openai_usage_container() {
        let entries = extract_usage_entries(&json!({
            "usage": {"prompt_tokens": 100, "completion_tokens": 50}
        }));
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.source, "usage");
        assert_eq!(entry.model, None);
        assert_eq!(entry.metrics.get(TokenMetric::Input), 100.0);
        assert_eq!(entry.metrics.get(TokenMetric::Output), 50.0);
        assert_eq!(entry.metrics.total_tokens(), 150.0);
    }

    #[test]
    fn test_actual_outranks_larger_estimate() {
        let entries = extract_usage_entries(&json!({
            "estimatedTokenUsage": {"totalTokens": 900},
            "usage": {"total_tokens": 10}
        }));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "usage");
        assert_eq!(entries[0].metrics.total_tokens(), 10.0);
    }

    #[test]
    fn test_same_rank_prefers_larger_total() {
        let entries = extract_usage_entries(&json!({
            "usage_metadata": {"input_tokens": 5, "output_tokens": 5},
            "usage": {"prompt_tokens": 20, "completion_tokens": 10}
        }));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "usage");
        assert_eq!(entries[0].metrics.total_tokens(), 30.0);
    }

    #[test]
    fn test_estimated_container_used_alone() {
        let entries = extract_usage_entries(&json!({
            "llmOutput": {"tokenUsage": {"promptTokens": 7, "completionTokens": 3}}
        }));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "token_usage");
        assert_eq!(entries[0].metrics.total_tokens(), 10.0);
    }

    #[test]
    fn test_model_inherited_and_overridden() {
        let entries = extract_usage_entries(&json!({
            "model": "gpt-4o",
            "steps": [
                {"usage": {"total_tokens": 10}},
                {"response_metadata": {"model_name": "claude-3"}, "usage_metadata": {"total_tokens": 20}},
                {"modelName": "  ", "usage": {"total_tokens": 30}}
            ]
        }));
        let models: Vec<_> = entries.iter().map(|e| e.model.as_deref()).collect();
        assert_eq!(models, vec![Some("gpt-4o"), Some("claude-3"), Some("gpt-4o")]);
    }

    #[test]
    fn test_direct_usage_object() {
        let entries = extract_usage_entries(&json!([
            {"kwargs": {"model": "m1", "input_tokens": 4, "output_tokens": 6}}
        ]));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, DIRECT_USAGE_SOURCE);
        assert_eq!(entries[0].model.as_deref(), Some("m1"));
        assert_eq!(entries[0].metrics.total_tokens(), 10.0);
    }

    #[test]
    fn test_container_is_terminal_for_subtree() {
        // The nested usage under `usage` must not produce a second entry
        let entries = extract_usage_entries(&json!({
            "usage": {"total_tokens": 10, "inner": {"usage": {"total_tokens": 99}}},
            "other": {"usage": {"total_tokens": 1}}
        }));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_sibling_subtrees_each_contribute() {
        let entries = extract_usage_entries(&json!({
            "calls": [
                {"usage": {"total_tokens": 1}},
                {"usage": {"total_tokens": 2}},
                {"nothing": true}
            ]
        }));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].metrics.total_tokens(), 2.0);
    }

    #[test]
    fn test_bedrock_invocation_metrics() {
        let entries = extract_usage_entries(&json!({
            "amazon-bedrock-invocationMetrics": {"inputTokenCount": 11, "outputTokenCount": 4}
        }));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "amazon-bedrock-invocation_metrics");
        assert_eq!(entries[0].metrics.total_tokens(), 15.0);
    }

    #[test]
    fn test_scalar_container_ignored() {
        let entries = extract_usage_entries(&json!({"usage": 42, "text": "hi"}));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_unrecognized_shapes_yield_nothing() {
        assert!(extract_usage_entries(&json!(null)).is_empty());
        assert!(extract_usage_entries(&json!("usage")).is_empty());
        assert!(extract_usage_entries(&json!({"a": [1, 2, {"b": "c"}]})).is_empty());
    }
}
