//! Summing extracted entries into one execution-level total

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use super::extract::UsageEntry;
use super::metrics::UsageMetrics;
use crate::core::constants::UNKNOWN_MODEL;
use crate::utils::json::to_counter;

/// Execution-level usage
#[derive(Debug, Clone, Default)]
pub struct AggregatedUsage {
    pub metrics: UsageMetrics,
    /// Model name to summed total tokens, in first-seen order
    pub model_totals: Vec<(String, i64)>,
}

impl AggregatedUsage {
    /// False when only additional (non-canonical) counters were found
    pub fn has_usage(&self) -> bool {
        self.metrics.has_any()
    }

    /// Model with the largest total; earliest wins ties, `unknown` never wins
    pub fn top_model(&self) -> Option<&str> {
        let mut best: Option<(&str, i64)> = None;
        for (model, total) in &self.model_totals {
            if model == UNKNOWN_MODEL {
                continue;
            }
            if best.is_none_or(|(_, t)| *total > t) {
                best = Some((model, *total));
            }
        }
        best.map(|(model, _)| model)
    }

    pub fn model_breakdown_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .model_totals
            .iter()
            .map(|(model, total)| (model.clone(), JsonValue::from(*total)))
            .collect();
        JsonValue::Object(map)
    }
}

/// Aggregate entries into summed metrics and per-model totals
pub fn aggregate(entries: &[UsageEntry]) -> AggregatedUsage {
    let mut result = AggregatedUsage::default();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for entry in entries {
        result.metrics.add(&entry.metrics);

        let model = entry.model.as_deref().unwrap_or(UNKNOWN_MODEL);
        let total = to_counter(entry.metrics.total_tokens());
        match index.get(model) {
            Some(&i) => result.model_totals[i].1 += total,
            None => {
                index.insert(model.to_string(), result.model_totals.len());
                result.model_totals.push((model.to_string(), total));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::TokenMetric;
    use crate::domain::usage::extract::extract_usage_entries;
    use serde_json::json;

    #[test]
    fn test_aggregate_sums_and_groups_models() {
        let entries = extract_usage_entries(&json!([
            {"model": "a", "usage": {"prompt_tokens": 10, "completion_tokens": 5}},
            {"model": "b", "usage": {"prompt_tokens": 100, "completion_tokens": 50, "extra_units": 2}},
            {"model": "a", "usage": {"total_tokens": 20}},
            {"usage": {"total_tokens": 7}}
        ]));
        let agg = aggregate(&entries);

        assert!(agg.has_usage());
        assert_eq!(agg.metrics.get(TokenMetric::Input), 110.0);
        assert_eq!(agg.metrics.total_tokens(), 15.0 + 150.0 + 20.0 + 7.0);
        assert_eq!(agg.metrics.additional.get("extra_units"), Some(&2.0));
        assert_eq!(
            agg.model_totals,
            vec![
                ("a".to_string(), 35),
                ("b".to_string(), 150),
                (UNKNOWN_MODEL.to_string(), 7)
            ]
        );
        assert_eq!(agg.top_model(), Some("b"));
        assert_eq!(
            agg.model_breakdown_json(),
            json!({"a": 35, "b": 150, "unknown": 7})
        );
    }

    #[test]
    fn test_top_model_ties_and_unknown() {
        let agg = AggregatedUsage {
            metrics: UsageMetrics::default(),
            model_totals: vec![
                (UNKNOWN_MODEL.to_string(), 500),
                ("x".to_string(), 10),
                ("y".to_string(), 10),
            ],
        };
        assert_eq!(agg.top_model(), Some("x"));

        let only_unknown = AggregatedUsage {
            metrics: UsageMetrics::default(),
            model_totals: vec![(UNKNOWN_MODEL.to_string(), 5)],
        };
        assert_eq!(only_unknown.top_model(), None);
    }

    #[test]
    fn test_additional_only_is_not_usage() {
        let entries = extract_usage_entries(&json!({"usage": {"latency_ms": 30}}));
        assert_eq!(entries.len(), 1);
        assert!(!aggregate(&entries).has_usage());
    }
}
