//! Execution metering: extract, persist, attribute, bill

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::TokenUsageService;
use super::aggregate::{AggregatedUsage, aggregate};
use super::distribute::distribute;
use super::extract::{UsageEntry, extract_usage_entries};
use crate::core::constants::{PAYLOAD_KEY_SAMPLE, UNKNOWN_CREDENTIAL_NAME};
use crate::data::types::{
    FlowType, NewUsageCredential, NewUsageExecution, TokenCounts, TokenMetric,
    UsageCredentialRow, UsageExecutionRow,
};
use crate::domain::credit::{ConsumeResult, CreditUsage};
use crate::domain::error::ServiceError;
use crate::utils::json::object_key_sample;

/// One execution's payloads and the credential calls that produced them
#[derive(Debug, Clone, Deserialize)]
pub struct RecordTokenUsageInput {
    pub workspace_id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub flow_type: FlowType,
    pub flow_id: Option<String>,
    pub execution_id: Option<String>,
    pub chat_id: Option<String>,
    pub chat_message_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub usage_payloads: Vec<JsonValue>,
    #[serde(default)]
    pub credential_accesses: Vec<CredentialAccess>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialAccess {
    pub credential_id: Option<String>,
    pub credential_name: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyPayloads,
    NoUsageEntries,
    ZeroUsage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Skipped {
        reason: SkipReason,
    },
    Recorded {
        execution: UsageExecutionRow,
        credentials: Vec<UsageCredentialRow>,
        credit: Option<ConsumeResult>,
    },
}

/// Accesses merged by (credential id, credential name)
#[derive(Debug, Clone, PartialEq)]
struct CredentialGroup {
    credential_id: Option<String>,
    credential_name: String,
    model: Option<String>,
    usage_count: i64,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn group_accesses(accesses: &[CredentialAccess]) -> Vec<CredentialGroup> {
    let mut groups: Vec<CredentialGroup> = Vec::new();
    let mut index: HashMap<(Option<String>, String), usize> = HashMap::new();

    for access in accesses {
        let credential_id = non_blank(access.credential_id.as_deref());
        let credential_name = non_blank(access.credential_name.as_deref())
            .unwrap_or_else(|| UNKNOWN_CREDENTIAL_NAME.to_string());
        let key = (credential_id.clone(), credential_name.clone());

        match index.get(&key) {
            Some(&i) => {
                let group = &mut groups[i];
                group.usage_count += 1;
                if group.model.is_none() {
                    group.model = non_blank(access.model.as_deref());
                }
            }
            None => {
                index.insert(key, groups.len());
                groups.push(CredentialGroup {
                    credential_id,
                    credential_name,
                    model: non_blank(access.model.as_deref()),
                    usage_count: 1,
                });
            }
        }
    }

    groups
}

/// Split execution counters across groups weighted by access count
fn distribute_counts(
    totals: &TokenCounts,
    additional: &BTreeMap<String, i64>,
    weights: &[i64],
) -> Vec<(TokenCounts, Map<String, JsonValue>)> {
    let mut shares = vec![(TokenCounts::default(), Map::new()); weights.len()];

    for metric in TokenMetric::ALL {
        for (i, share) in distribute(totals.get(metric), weights).into_iter().enumerate() {
            shares[i].0.set(metric, share);
        }
    }
    for (key, total) in additional {
        for (i, share) in distribute(*total, weights).into_iter().enumerate() {
            shares[i].1.insert(key.clone(), JsonValue::from(share));
        }
    }

    shares
}

fn source_counts(entries: &[UsageEntry]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.source.as_str()).or_insert(0) += 1;
    }
    counts
}

impl TokenUsageService {
    /// Meter one execution
    ///
    /// Payloads without usable usage are a logged no-op. Billing is skipped
    /// when the execution has no user.
    pub async fn record_token_usage(
        &self,
        input: &RecordTokenUsageInput,
    ) -> Result<RecordOutcome, ServiceError> {
        tracing::info!(
            workspace_id = %input.workspace_id,
            flow_type = %input.flow_type,
            flow_id = ?input.flow_id,
            chat_id = ?input.chat_id,
            user_id = ?input.user_id,
            payloads = input.usage_payloads.len(),
            credentials = input.credential_accesses.len(),
            "Recording token usage"
        );

        if input.usage_payloads.is_empty() {
            tracing::warn!(
                flow_type = %input.flow_type,
                chat_id = ?input.chat_id,
                "Skipping token usage: empty usage payloads"
            );
            return Ok(RecordOutcome::Skipped {
                reason: SkipReason::EmptyPayloads,
            });
        }

        let entries: Vec<UsageEntry> = input
            .usage_payloads
            .iter()
            .flat_map(extract_usage_entries)
            .collect();

        if entries.is_empty() {
            tracing::warn!(
                first_payload_keys = ?object_key_sample(input.usage_payloads.first(), PAYLOAD_KEY_SAMPLE),
                flow_type = %input.flow_type,
                chat_id = ?input.chat_id,
                "Skipping token usage: no usage entries extracted"
            );
            return Ok(RecordOutcome::Skipped {
                reason: SkipReason::NoUsageEntries,
            });
        }

        let sources = source_counts(&entries);
        tracing::info!(source_counts = ?sources, "Selected usage sources");

        let aggregated = aggregate(&entries);
        if !aggregated.has_usage() {
            tracing::warn!(
                entries = entries.len(),
                source_counts = ?sources,
                flow_type = %input.flow_type,
                chat_id = ?input.chat_id,
                "Skipping token usage: all canonical counters are zero"
            );
            return Ok(RecordOutcome::Skipped {
                reason: SkipReason::ZeroUsage,
            });
        }

        let totals = aggregated.metrics.to_counts();
        tracing::info!(
            entries = entries.len(),
            input_tokens = totals.input_tokens,
            output_tokens = totals.output_tokens,
            total_tokens = totals.total_tokens,
            models = ?aggregated.model_totals,
            "Extracted usage entries"
        );

        let execution = self.insert_execution(input, &aggregated, &totals).await?;
        tracing::info!(usage_execution_id = %execution.id, "Usage execution inserted");

        if input.credential_accesses.is_empty() {
            return Ok(RecordOutcome::Recorded {
                execution,
                credentials: Vec::new(),
                credit: None,
            });
        }

        let credentials = self
            .insert_credentials(input, &execution, &aggregated, &totals)
            .await?;
        tracing::info!(
            usage_execution_id = %execution.id,
            rows = credentials.len(),
            "Usage credential rows inserted"
        );

        let Some(user_id) = non_blank(input.user_id.as_deref()) else {
            tracing::info!(
                usage_execution_id = %execution.id,
                "Skipping credit consumption: missing user id"
            );
            return Ok(RecordOutcome::Recorded {
                execution,
                credentials,
                credit: None,
            });
        };

        let usages: Vec<CreditUsage> = credentials
            .iter()
            .map(|row| CreditUsage {
                credential_id: row.credential_id.clone(),
                credential_name: row.credential_name.clone(),
                model: row.model.clone(),
                total_tokens: row.counts.total_tokens,
            })
            .collect();
        let credit = self
            .ledger
            .consume_by_usages(&input.workspace_id, &user_id, &usages)
            .await?;
        tracing::info!(
            workspace_id = %input.workspace_id,
            user_id = %user_id,
            credit_consumed = credit.credit_consumed,
            credit_balance = credit.credit_balance,
            "Credit consumed"
        );

        Ok(RecordOutcome::Recorded {
            execution,
            credentials,
            credit: Some(credit),
        })
    }

    async fn insert_execution(
        &self,
        input: &RecordTokenUsageInput,
        aggregated: &AggregatedUsage,
        totals: &TokenCounts,
    ) -> Result<UsageExecutionRow, ServiceError> {
        let additional: Map<String, JsonValue> = aggregated
            .metrics
            .additional_counts()
            .into_iter()
            .map(|(k, v)| (k, JsonValue::from(v)))
            .collect();

        let row = self
            .database
            .repository()
            .insert_usage_execution(&NewUsageExecution {
                workspace_id: input.workspace_id.clone(),
                organization_id: input.organization_id.clone(),
                user_id: non_blank(input.user_id.as_deref()),
                flow_type: input.flow_type,
                flow_id: input.flow_id.clone(),
                execution_id: input.execution_id.clone(),
                chat_id: input.chat_id.clone(),
                chat_message_id: input.chat_message_id.clone(),
                session_id: input.session_id.clone(),
                counts: *totals,
                usage_breakdown: JsonValue::Object(additional),
                model_breakdown: aggregated.model_breakdown_json(),
                created_at: self.clock.now_millis(),
            })
            .await?;
        Ok(row)
    }

    async fn insert_credentials(
        &self,
        input: &RecordTokenUsageInput,
        execution: &UsageExecutionRow,
        aggregated: &AggregatedUsage,
        totals: &TokenCounts,
    ) -> Result<Vec<UsageCredentialRow>, ServiceError> {
        let groups = group_accesses(&input.credential_accesses);
        let weights: Vec<i64> = groups.iter().map(|g| g.usage_count).collect();
        let shares = distribute_counts(totals, &aggregated.metrics.additional_counts(), &weights);
        let top_model = aggregated.top_model();
        let now = self.clock.now_millis();

        let rows: Vec<NewUsageCredential> = groups
            .into_iter()
            .zip(shares)
            .map(|(group, (counts, breakdown))| NewUsageCredential {
                usage_execution_id: execution.id.clone(),
                workspace_id: execution.workspace_id.clone(),
                organization_id: execution.organization_id.clone(),
                user_id: execution.user_id.clone(),
                credential_id: group.credential_id,
                credential_name: Some(group.credential_name),
                model: group.model.or_else(|| top_model.map(str::to_string)),
                usage_count: group.usage_count,
                counts,
                usage_breakdown: JsonValue::Object(breakdown),
                created_at: now,
            })
            .collect();

        Ok(self
            .database
            .repository()
            .insert_usage_credentials(&rows)
            .await?)
    }
}
