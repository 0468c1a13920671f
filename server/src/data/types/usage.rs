//! Token usage rows and the canonical counter set

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::enums::FlowType;

/// The ten canonical token counters tracked for every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenMetric {
    Input,
    Output,
    Total,
    CacheRead,
    CacheWrite,
    Reasoning,
    AcceptedPrediction,
    RejectedPrediction,
    AudioInput,
    AudioOutput,
}

impl TokenMetric {
    pub const COUNT: usize = 10;

    pub const ALL: [TokenMetric; Self::COUNT] = [
        Self::Input,
        Self::Output,
        Self::Total,
        Self::CacheRead,
        Self::CacheWrite,
        Self::Reasoning,
        Self::AcceptedPrediction,
        Self::RejectedPrediction,
        Self::AudioInput,
        Self::AudioOutput,
    ];

    /// Column name in both backends
    pub fn column(&self) -> &'static str {
        match self {
            Self::Input => "input_tokens",
            Self::Output => "output_tokens",
            Self::Total => "total_tokens",
            Self::CacheRead => "cache_read_tokens",
            Self::CacheWrite => "cache_write_tokens",
            Self::Reasoning => "reasoning_tokens",
            Self::AcceptedPrediction => "accepted_prediction_tokens",
            Self::RejectedPrediction => "rejected_prediction_tokens",
            Self::AudioInput => "audio_input_tokens",
            Self::AudioOutput => "audio_output_tokens",
        }
    }

    pub const fn index(&self) -> usize {
        *self as usize
    }
}

/// Integer values of the canonical counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub reasoning_tokens: i64,
    pub accepted_prediction_tokens: i64,
    pub rejected_prediction_tokens: i64,
    pub audio_input_tokens: i64,
    pub audio_output_tokens: i64,
}

impl TokenCounts {
    pub fn get(&self, metric: TokenMetric) -> i64 {
        match metric {
            TokenMetric::Input => self.input_tokens,
            TokenMetric::Output => self.output_tokens,
            TokenMetric::Total => self.total_tokens,
            TokenMetric::CacheRead => self.cache_read_tokens,
            TokenMetric::CacheWrite => self.cache_write_tokens,
            TokenMetric::Reasoning => self.reasoning_tokens,
            TokenMetric::AcceptedPrediction => self.accepted_prediction_tokens,
            TokenMetric::RejectedPrediction => self.rejected_prediction_tokens,
            TokenMetric::AudioInput => self.audio_input_tokens,
            TokenMetric::AudioOutput => self.audio_output_tokens,
        }
    }

    pub fn set(&mut self, metric: TokenMetric, value: i64) {
        let slot = match metric {
            TokenMetric::Input => &mut self.input_tokens,
            TokenMetric::Output => &mut self.output_tokens,
            TokenMetric::Total => &mut self.total_tokens,
            TokenMetric::CacheRead => &mut self.cache_read_tokens,
            TokenMetric::CacheWrite => &mut self.cache_write_tokens,
            TokenMetric::Reasoning => &mut self.reasoning_tokens,
            TokenMetric::AcceptedPrediction => &mut self.accepted_prediction_tokens,
            TokenMetric::RejectedPrediction => &mut self.rejected_prediction_tokens,
            TokenMetric::AudioInput => &mut self.audio_input_tokens,
            TokenMetric::AudioOutput => &mut self.audio_output_tokens,
        };
        *slot = value;
    }

    /// Add every counter of `other` into `self`
    pub fn add(&mut self, other: &TokenCounts) {
        for metric in TokenMetric::ALL {
            self.set(metric, self.get(metric) + other.get(metric));
        }
    }

    /// True when at least one counter is positive
    pub fn has_any(&self) -> bool {
        TokenMetric::ALL.iter().any(|m| self.get(*m) > 0)
    }
}

/// One metered execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageExecutionRow {
    pub id: String,
    pub workspace_id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub flow_type: FlowType,
    pub flow_id: Option<String>,
    pub execution_id: Option<String>,
    pub chat_id: Option<String>,
    pub chat_message_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub counts: TokenCounts,
    /// Vendor counters without a canonical slot
    pub usage_breakdown: JsonValue,
    /// Model name to summed total tokens
    pub model_breakdown: JsonValue,
    pub created_at: i64,
}

/// Insert payload for an execution row
#[derive(Debug, Clone)]
pub struct NewUsageExecution {
    pub workspace_id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub flow_type: FlowType,
    pub flow_id: Option<String>,
    pub execution_id: Option<String>,
    pub chat_id: Option<String>,
    pub chat_message_id: Option<String>,
    pub session_id: Option<String>,
    pub counts: TokenCounts,
    pub usage_breakdown: JsonValue,
    pub model_breakdown: JsonValue,
    pub created_at: i64,
}

/// One credential-group share of an execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageCredentialRow {
    pub id: String,
    pub usage_execution_id: String,
    pub workspace_id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub credential_id: Option<String>,
    pub credential_name: Option<String>,
    pub model: Option<String>,
    pub usage_count: i64,
    #[serde(flatten)]
    pub counts: TokenCounts,
    pub usage_breakdown: JsonValue,
    pub created_at: i64,
}

/// Insert payload for a credential-group row
#[derive(Debug, Clone)]
pub struct NewUsageCredential {
    pub usage_execution_id: String,
    pub workspace_id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub credential_id: Option<String>,
    pub credential_name: Option<String>,
    pub model: Option<String>,
    pub usage_count: i64,
    pub counts: TokenCounts,
    pub usage_breakdown: JsonValue,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_index_matches_all_order() {
        for (i, metric) in TokenMetric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
        }
    }

    #[test]
    fn test_token_counts_get_set_add() {
        let mut a = TokenCounts::default();
        assert!(!a.has_any());
        a.set(TokenMetric::Input, 10);
        a.set(TokenMetric::AudioOutput, 3);

        let mut b = TokenCounts::default();
        b.add(&a);
        b.add(&a);
        assert_eq!(b.input_tokens, 20);
        assert_eq!(b.get(TokenMetric::AudioOutput), 6);
        assert!(b.has_any());
    }

    #[test]
    fn test_counts_flatten_in_json() {
        let row = UsageCredentialRow {
            id: "c1".into(),
            usage_execution_id: "e1".into(),
            workspace_id: "w".into(),
            organization_id: "o".into(),
            user_id: None,
            credential_id: None,
            credential_name: Some("Unknown Credential".into()),
            model: None,
            usage_count: 1,
            counts: TokenCounts {
                total_tokens: 42,
                ..Default::default()
            },
            usage_breakdown: serde_json::json!({}),
            created_at: 0,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["total_tokens"], 42);
        assert!(json.get("counts").is_none());
    }
}
