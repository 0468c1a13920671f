//! Canonical usage metrics and derivation from vendor usage objects
//!
//! A usage object is flattened to dotted-path numeric leaves, each path is
//! normalized (numeric segments dropped, camelCase to snake_case) and then
//! mapped through the alias table. Paths without a canonical slot land in
//! the additional breakdown.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::data::types::{TokenCounts, TokenMetric};
use crate::utils::json::{safe_to_number, to_counter};

// ============================================================================
// ALIASES
// ============================================================================

/// Normalized usage path to canonical metric
///
/// Lookup tries the full normalized path first, then its last segment.
const TOKEN_ALIASES: &[(&str, TokenMetric)] = &[
    // Input
    ("input_tokens", TokenMetric::Input),
    ("prompt_tokens", TokenMetric::Input),
    ("input_token_count", TokenMetric::Input),
    ("prompt_token_count", TokenMetric::Input),
    // Output
    ("output_tokens", TokenMetric::Output),
    ("completion_tokens", TokenMetric::Output),
    ("output_token_count", TokenMetric::Output),
    ("candidates_token_count", TokenMetric::Output),
    // Total
    ("total_tokens", TokenMetric::Total),
    ("total_token_count", TokenMetric::Total),
    // Cache read
    ("cache_read_tokens", TokenMetric::CacheRead),
    ("cache_read_input_tokens", TokenMetric::CacheRead),
    ("cached_content_token_count", TokenMetric::CacheRead),
    ("prompt_tokens_details.cached_tokens", TokenMetric::CacheRead),
    ("input_token_details.cache_read", TokenMetric::CacheRead),
    ("input_token_details.cache_read_input_tokens", TokenMetric::CacheRead),
    // Cache write
    ("cache_write_tokens", TokenMetric::CacheWrite),
    ("cache_creation_input_tokens", TokenMetric::CacheWrite),
    ("prompt_tokens_details.cache_creation_tokens", TokenMetric::CacheWrite),
    ("input_token_details.cache_creation", TokenMetric::CacheWrite),
    // Reasoning
    ("reasoning_tokens", TokenMetric::Reasoning),
    ("thoughts_token_count", TokenMetric::Reasoning),
    ("completion_tokens_details.reasoning_tokens", TokenMetric::Reasoning),
    ("output_token_details.reasoning", TokenMetric::Reasoning),
    // Predictions
    ("accepted_prediction_tokens", TokenMetric::AcceptedPrediction),
    (
        "completion_tokens_details.accepted_prediction_tokens",
        TokenMetric::AcceptedPrediction,
    ),
    ("rejected_prediction_tokens", TokenMetric::RejectedPrediction),
    (
        "completion_tokens_details.rejected_prediction_tokens",
        TokenMetric::RejectedPrediction,
    ),
    // Audio
    ("audio_tokens", TokenMetric::AudioInput),
    ("prompt_tokens_details.audio_tokens", TokenMetric::AudioInput),
    ("input_token_details.audio", TokenMetric::AudioInput),
    ("audio_output_tokens", TokenMetric::AudioOutput),
    ("completion_tokens_details.audio_tokens", TokenMetric::AudioOutput),
    ("output_token_details.audio", TokenMetric::AudioOutput),
];

/// Top-level fields read directly for the max-of-direct-and-flattened rule
const DIRECT_INPUT_KEYS: &[&str] = &[
    "input_tokens",
    "prompt_tokens",
    "promptTokens",
    "inputTokenCount",
    "inputTokens",
];
const DIRECT_OUTPUT_KEYS: &[&str] = &[
    "output_tokens",
    "completion_tokens",
    "outputTokenCount",
    "completionTokens",
    "outputTokens",
];
const DIRECT_TOTAL_KEYS: &[&str] = &["total_tokens", "totalTokens"];

fn lookup_alias(key: &str) -> Option<TokenMetric> {
    let find = |k: &str| {
        TOKEN_ALIASES
            .iter()
            .find(|(alias, _)| *alias == k)
            .map(|(_, metric)| *metric)
    };
    find(key).or_else(|| key.rsplit('.').next().and_then(find))
}

// ============================================================================
// METRICS
// ============================================================================

/// Ten canonical counters plus vendor-specific extras
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageMetrics {
    canonical: [f64; TokenMetric::COUNT],
    pub additional: BTreeMap<String, f64>,
}

impl UsageMetrics {
    pub fn get(&self, metric: TokenMetric) -> f64 {
        self.canonical[metric.index()]
    }

    pub fn set(&mut self, metric: TokenMetric, value: f64) {
        self.canonical[metric.index()] = value;
    }

    pub fn total_tokens(&self) -> f64 {
        self.get(TokenMetric::Total)
    }

    /// Add every counter and extra of `other`
    pub fn add(&mut self, other: &UsageMetrics) {
        for metric in TokenMetric::ALL {
            self.canonical[metric.index()] += other.get(metric);
        }
        for (key, value) in &other.additional {
            *self.additional.entry(key.clone()).or_insert(0.0) += value;
        }
    }

    /// True when any canonical counter is positive; extras do not count
    pub fn has_any(&self) -> bool {
        self.canonical.iter().any(|v| *v > 0.0)
    }

    pub fn to_counts(&self) -> TokenCounts {
        let mut counts = TokenCounts::default();
        for metric in TokenMetric::ALL {
            counts.set(metric, to_counter(self.get(metric)));
        }
        counts
    }

    pub fn additional_counts(&self) -> BTreeMap<String, i64> {
        self.additional
            .iter()
            .map(|(k, v)| (k.clone(), to_counter(*v)))
            .collect()
    }
}

// ============================================================================
// DERIVATION
// ============================================================================

/// Derive canonical metrics from one usage object
///
/// Never fails: unrecognized shapes produce empty metrics.
pub fn derive_metrics(usage: &JsonValue) -> UsageMetrics {
    let mut metrics = UsageMetrics::default();

    let mut flat = BTreeMap::new();
    flatten_numeric(usage, &mut Vec::new(), &mut flat);

    for (raw_key, value) in flat {
        let key = normalize_key(&raw_key);
        match lookup_alias(&key) {
            Some(metric) => metrics.canonical[metric.index()] += value,
            None => *metrics.additional.entry(key).or_insert(0.0) += value,
        }
    }

    // Top-level values win only when larger than the flattened sum
    if let JsonValue::Object(obj) = usage {
        let direct = |keys: &[&str]| -> f64 {
            keys.iter().map(|k| safe_to_number(obj.get(*k))).sum()
        };
        for (metric, keys) in [
            (TokenMetric::Input, DIRECT_INPUT_KEYS),
            (TokenMetric::Output, DIRECT_OUTPUT_KEYS),
            (TokenMetric::Total, DIRECT_TOTAL_KEYS),
        ] {
            let value = direct(keys);
            if value > 0.0 {
                let slot = &mut metrics.canonical[metric.index()];
                *slot = slot.max(value);
            }
        }
    }

    let input = metrics.get(TokenMetric::Input);
    let output = metrics.get(TokenMetric::Output);
    if metrics.get(TokenMetric::Total) == 0.0 && (input != 0.0 || output != 0.0) {
        metrics.set(TokenMetric::Total, input + output);
    }

    for value in metrics.canonical.iter_mut() {
        *value = value.max(0.0);
    }
    metrics.additional.retain(|_, v| *v > 0.0);

    metrics
}

/// Collect finite numeric leaves keyed by dotted path, summing repeats
fn flatten_numeric(value: &JsonValue, path: &mut Vec<String>, out: &mut BTreeMap<String, f64>) {
    match value {
        JsonValue::Number(n) => {
            if let Some(v) = n.as_f64().filter(|v| v.is_finite())
                && !path.is_empty()
            {
                *out.entry(path.join(".")).or_insert(0.0) += v;
            }
        }
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                flatten_numeric(item, path, out);
                path.pop();
            }
        }
        JsonValue::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                flatten_numeric(child, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Drop array-index segments, snake_case, collapse and trim underscores
pub(crate) fn normalize_key(key: &str) -> String {
    let joined = key
        .split('.')
        .filter(|seg| seg.is_empty() || !seg.bytes().all(|b| b.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(".");

    let mut snake = String::with_capacity(joined.len() + 8);
    for ch in joined.chars() {
        if ch.is_ascii_uppercase() {
            snake.push('_');
            snake.push(ch.to_ascii_lowercase());
        } else {
            snake.extend(ch.to_lowercase());
        }
    }

    let mut collapsed = String::with_capacity(snake.len());
    for ch in snake.chars() {
        if ch == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(ch);
    }

    match collapsed.strip_prefix('_') {
        Some(rest) => rest.to_string(),
        None => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_openai_usage() {
        let m = derive_metrics(&json!({
            "prompt_tokens": 100,
            "completion_tokens": 50,
            "total_tokens": 150,
            "prompt_tokens_details": {"cached_tokens": 20, "audio_tokens": 3},
            "completion_tokens_details": {
                "reasoning_tokens": 10,
                "accepted_prediction_tokens": 1,
                "rejected_prediction_tokens": 2,
                "audio_tokens": 4
            }
        }));
        assert_eq!(m.get(TokenMetric::Input), 100.0);
        assert_eq!(m.get(TokenMetric::Output), 50.0);
        assert_eq!(m.get(TokenMetric::Total), 150.0);
        assert_eq!(m.get(TokenMetric::CacheRead), 20.0);
        assert_eq!(m.get(TokenMetric::AudioInput), 3.0);
        assert_eq!(m.get(TokenMetric::Reasoning), 10.0);
        assert_eq!(m.get(TokenMetric::AcceptedPrediction), 1.0);
        assert_eq!(m.get(TokenMetric::RejectedPrediction), 2.0);
        assert_eq!(m.get(TokenMetric::AudioOutput), 4.0);
        assert!(m.additional.is_empty());
    }

    #[test]
    fn test_total_falls_back_to_sum() {
        let m = derive_metrics(&json!({"prompt_tokens": 100, "completion_tokens": 50}));
        assert_eq!(m.total_tokens(), 150.0);
    }

    #[test]
    fn test_langchain_usage_metadata() {
        let m = derive_metrics(&json!({
            "inputTokens": 30,
            "outputTokens": 12,
            "inputTokenDetails": {"cacheRead": 5, "cacheCreation": 2},
            "outputTokenDetails": {"reasoning": 4}
        }));
        assert_eq!(m.get(TokenMetric::Input), 30.0);
        assert_eq!(m.get(TokenMetric::Output), 12.0);
        assert_eq!(m.get(TokenMetric::Total), 42.0);
        assert_eq!(m.get(TokenMetric::CacheRead), 5.0);
        assert_eq!(m.get(TokenMetric::CacheWrite), 2.0);
        assert_eq!(m.get(TokenMetric::Reasoning), 4.0);
    }

    #[test]
    fn test_gemini_and_bedrock_counts() {
        let gemini = derive_metrics(&json!({
            "promptTokenCount": 8,
            "candidatesTokenCount": 4,
            "totalTokenCount": 12,
            "cachedContentTokenCount": 2,
            "thoughtsTokenCount": 1
        }));
        assert_eq!(gemini.get(TokenMetric::Input), 8.0);
        assert_eq!(gemini.get(TokenMetric::Output), 4.0);
        assert_eq!(gemini.get(TokenMetric::Total), 12.0);
        assert_eq!(gemini.get(TokenMetric::CacheRead), 2.0);
        assert_eq!(gemini.get(TokenMetric::Reasoning), 1.0);

        let bedrock = derive_metrics(&json!({"inputTokenCount": 7, "outputTokenCount": 3}));
        assert_eq!(bedrock.total_tokens(), 10.0);
    }

    #[test]
    fn test_direct_value_wins_when_larger() {
        // Flattened total is 40, the string total is only visible directly
        let m = derive_metrics(&json!({
            "total_tokens": "100",
            "details": [{"total_tokens": 15}, {"total_tokens": 25}]
        }));
        assert_eq!(m.total_tokens(), 100.0);

        // Flattened input is 10 + 70; direct is 10
        let m = derive_metrics(&json!({
            "input_tokens": 10,
            "steps": [{"input_tokens": 30}, {"input_tokens": 40}]
        }));
        assert_eq!(m.get(TokenMetric::Input), 80.0);
    }

    #[test]
    fn test_numeric_strings_count_only_as_direct() {
        let m = derive_metrics(&json!({"input_tokens": "12", "output_tokens": "3"}));
        assert_eq!(m.get(TokenMetric::Input), 12.0);
        assert_eq!(m.get(TokenMetric::Output), 3.0);
        assert_eq!(m.total_tokens(), 15.0);
    }

    #[test]
    fn test_camel_case_direct_output() {
        let m = derive_metrics(&json!({"inputTokens": 4, "outputTokens": "9"}));
        assert_eq!(m.get(TokenMetric::Input), 4.0);
        assert_eq!(m.get(TokenMetric::Output), 9.0);
        assert_eq!(m.total_tokens(), 13.0);
    }

    #[test]
    fn test_unknown_keys_go_to_additional() {
        let m = derive_metrics(&json!({
            "input_tokens": 5,
            "serverToolUse": {"webSearchRequests": 2},
            "tiers": [{"billedUnits": 3}, {"billedUnits": 4}]
        }));
        assert_eq!(m.additional.get("server_tool_use.web_search_requests"), Some(&2.0));
        assert_eq!(m.additional.get("tiers.billed_units"), Some(&7.0));
        assert!(m.has_any());
    }

    #[test]
    fn test_only_additional_is_not_usage() {
        let m = derive_metrics(&json!({"latency_ms": 120}));
        assert!(!m.has_any());
        assert_eq!(m.additional.get("latency_ms"), Some(&120.0));
    }

    #[test]
    fn test_non_object_shapes() {
        assert!(!derive_metrics(&json!(null)).has_any());
        assert!(!derive_metrics(&json!("text")).has_any());
        assert!(!derive_metrics(&json!(42)).has_any());
    }

    #[test]
    fn test_negative_values_clamped() {
        let m = derive_metrics(&json!({"input_tokens": -5, "output_tokens": 3}));
        assert_eq!(m.get(TokenMetric::Input), 0.0);
        assert_eq!(m.get(TokenMetric::Output), 3.0);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("promptTokensDetails.cachedTokens"), "prompt_tokens_details.cached_tokens");
        assert_eq!(normalize_key("steps.0.input_tokens"), "steps.input_tokens");
        assert_eq!(normalize_key("_private__count"), "private_count");
        assert_eq!(normalize_key("TotalTokens"), "total_tokens");
    }

    #[test]
    fn test_metrics_add_and_counts() {
        let mut a = derive_metrics(&json!({"input_tokens": 1, "x": 2}));
        let b = derive_metrics(&json!({"input_tokens": 2, "x": 3}));
        a.add(&b);
        let counts = a.to_counts();
        assert_eq!(counts.input_tokens, 3);
        assert_eq!(counts.total_tokens, 3);
        assert_eq!(a.additional_counts().get("x"), Some(&5));
    }

    fn build_object(pairs: &[(String, u32)]) -> JsonValue {
        let map: serde_json::Map<String, JsonValue> = pairs
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        JsonValue::Object(map)
    }

    proptest! {
        #[test]
        fn prop_derive_is_key_order_independent(
            pairs in proptest::collection::btree_map(
                prop_oneof![
                    Just("prompt_tokens".to_string()),
                    Just("completion_tokens".to_string()),
                    Just("totalTokens".to_string()),
                    Just("cache_read_tokens".to_string()),
                    Just("reasoning_tokens".to_string()),
                    "[a-z]{1,8}",
                ],
                0u32..100_000,
                0..8,
            )
        ) {
            let forward: Vec<(String, u32)> = pairs.into_iter().collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            prop_assert_eq!(
                derive_metrics(&build_object(&forward)),
                derive_metrics(&build_object(&reversed))
            );
        }
    }
}
