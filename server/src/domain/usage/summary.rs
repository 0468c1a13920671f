//! Organization usage summary over a time window

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::TokenUsageService;
use crate::core::constants::{
    DEFAULT_SUMMARY_WINDOW_HOURS, SUMMARY_RECENT_EXECUTIONS, UNKNOWN_USER_NAME,
};
use crate::data::types::{TokenCounts, UsageCredentialRow, UsageExecutionRow};
use crate::domain::error::ServiceError;
use crate::utils::time::{RangeBound, parse_range_bound};

#[derive(Debug, Clone, Serialize)]
pub struct UserUsage {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub execution_count: u64,
    #[serde(flatten)]
    pub counts: TokenCounts,
    pub credentials: Vec<UsageCredentialRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub organization_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total: TokenCounts,
    pub users: Vec<UserUsage>,
    pub recent_executions: Vec<UsageExecutionRow>,
}

impl TokenUsageService {
    /// Usage for `organization_id` between `start` and `end` (inclusive)
    ///
    /// Missing or unparseable bounds default to the last 24 hours.
    pub async fn usage_summary(
        &self,
        organization_id: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<UsageSummary, ServiceError> {
        let end = end
            .and_then(|v| parse_range_bound(v, RangeBound::End))
            .unwrap_or_else(|| self.clock.now());
        let start = start
            .and_then(|v| parse_range_bound(v, RangeBound::Start))
            .unwrap_or(end - Duration::hours(DEFAULT_SUMMARY_WINDOW_HOURS));
        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());

        let repo = self.database.repository();
        let executions = repo
            .list_usage_executions(organization_id, start_ms, end_ms)
            .await?;
        let credential_rows = repo
            .list_usage_credentials(organization_id, start_ms, end_ms)
            .await?;

        let mut total = TokenCounts::default();
        let mut users: Vec<UserUsage> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for execution in &executions {
            total.add(&execution.counts);
            let Some(user_id) = execution.user_id.as_deref() else {
                continue;
            };
            let i = *index.entry(user_id.to_string()).or_insert_with(|| {
                users.push(UserUsage {
                    user_id: user_id.to_string(),
                    user_name: UNKNOWN_USER_NAME.to_string(),
                    user_email: String::new(),
                    execution_count: 0,
                    counts: TokenCounts::default(),
                    credentials: Vec::new(),
                });
                users.len() - 1
            });
            users[i].execution_count += 1;
            users[i].counts.add(&execution.counts);
        }

        for row in credential_rows {
            if let Some(user_id) = row.user_id.as_deref()
                && let Some(&i) = index.get(user_id)
            {
                users[i].credentials.push(row);
            }
        }

        if !users.is_empty() {
            let ids: Vec<String> = users.iter().map(|u| u.user_id.clone()).collect();
            for profile in repo.get_users(&ids).await? {
                if let Some(&i) = index.get(&profile.id) {
                    if let Some(name) = profile.name.filter(|n| !n.is_empty()) {
                        users[i].user_name = name;
                    }
                    users[i].user_email = profile.email.unwrap_or_default();
                }
            }
        }

        users.sort_by(|a, b| b.counts.total_tokens.cmp(&a.counts.total_tokens));

        tracing::debug!(
            organization_id,
            executions = executions.len(),
            users = users.len(),
            "Usage summary built"
        );

        Ok(UsageSummary {
            organization_id: organization_id.to_string(),
            start,
            end,
            total,
            users,
            recent_executions: executions
                .into_iter()
                .take(SUMMARY_RECENT_EXECUTIONS)
                .collect(),
        })
    }
}
