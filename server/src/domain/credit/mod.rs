//! Workspace credit ledger
//!
//! Every balance change runs inside one `CreditLedgerTx`: the member row is
//! locked, entries are appended with their snapshot balance, and the whole
//! call commits or rolls back together. Reads need no lock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;

use crate::core::config::CreditConfig;
use crate::core::constants::{
    CHECKIN_DESCRIPTION, DEFAULT_ADJUST_DESCRIPTION, DEFAULT_PAGE, DEFAULT_PAGE_SIZE,
    DEFAULT_TOPUP_DESCRIPTION, MAX_PAGE_SIZE, UNKNOWN_CREDENTIAL_NAME,
};
use crate::data::cache::CacheService;
use crate::data::types::{
    CreditTransactionRow, CreditTransactionType, ListCreditTransactionsParams, NewCreditEntry,
    WorkspaceMemberRow,
};
use crate::data::{DataError, TransactionalService};
use crate::domain::billing::{compute_credit, describe_consumption, resolve};
use crate::domain::error::{ServiceError, codes};
use crate::utils::time::{Clock, RangeBound, millis_to_datetime, parse_range_bound};

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CreditSummary {
    pub workspace_id: String,
    pub user_id: String,
    pub credit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub workspace_id: String,
    pub user_id: String,
    pub credit: i64,
    pub transactions: Vec<CreditTransactionRow>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Result of a single-entry ledger write (top-up, adjustment)
#[derive(Debug, Clone, Serialize)]
pub struct LedgerWrite {
    pub credit: i64,
    pub transaction: CreditTransactionRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInResult {
    pub reward: i64,
    pub credit: i64,
    pub next_available_at: DateTime<Utc>,
    pub transaction: CreditTransactionRow,
}

/// One credential-group's tokens to bill
#[derive(Debug, Clone, PartialEq)]
pub struct CreditUsage {
    pub credential_id: Option<String>,
    pub credential_name: Option<String>,
    pub model: Option<String>,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumeResult {
    pub credit_consumed: i64,
    pub credit_balance: i64,
    pub transactions: Vec<CreditTransactionRow>,
}

// ============================================================================
// Ledger
// ============================================================================

pub struct CreditLedger {
    database: Arc<TransactionalService>,
    cache: Arc<CacheService>,
    config: CreditConfig,
    clock: Arc<dyn Clock>,
}

impl CreditLedger {
    pub fn new(
        database: Arc<TransactionalService>,
        cache: Arc<CacheService>,
        config: CreditConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            database,
            cache,
            config,
            clock,
        }
    }

    async fn member(&self, workspace_id: &str, user_id: &str) -> Result<WorkspaceMemberRow, ServiceError> {
        self.database
            .repository()
            .get_workspace_member(workspace_id, user_id)
            .await?
            .ok_or_else(ServiceError::workspace_user_not_found)
    }

    /// Upsert organization, workspace, user and a zero-balance membership
    pub async fn ensure_workspace_member(
        &self,
        organization_id: &str,
        workspace_id: &str,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<WorkspaceMemberRow, ServiceError> {
        let repo = self.database.repository();
        let now = self.clock.now_millis();

        repo.ensure_organization(organization_id, organization_id, now)
            .await?;
        repo.ensure_workspace(workspace_id, organization_id, workspace_id, now)
            .await
            .map_err(|e| match e {
                DataError::Conflict(message) => {
                    ServiceError::bad_request(codes::WORKSPACE_CONFLICT, message)
                }
                other => other.into(),
            })?;
        repo.ensure_user(user_id, email, name, now).await?;
        let member = repo.ensure_workspace_member(workspace_id, user_id, now).await?;

        tracing::info!(
            organization_id,
            workspace_id,
            user_id,
            credit = member.credit,
            "Workspace member ensured"
        );
        Ok(member)
    }

    pub async fn get_summary(&self, workspace_id: &str, user_id: &str) -> Result<CreditSummary, ServiceError> {
        let member = self.member(workspace_id, user_id).await?;
        Ok(CreditSummary {
            workspace_id: member.workspace_id,
            user_id: member.user_id,
            credit: member.credit,
        })
    }

    /// Paged ledger rows, newest first, with inclusive date bounds
    pub async fn get_transactions(
        &self,
        workspace_id: &str,
        user_id: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ServiceError> {
        let page = query.page.unwrap_or(DEFAULT_PAGE);
        let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 || page_size < 1 || page_size > MAX_PAGE_SIZE {
            return Err(ServiceError::bad_request(
                codes::INVALID_PAGINATION,
                format!("page must be >= 1 and page_size between 1 and {}", MAX_PAGE_SIZE),
            ));
        }

        let start_ms = parse_bound(query.start.as_deref(), RangeBound::Start)?;
        let end_ms = parse_bound(query.end.as_deref(), RangeBound::End)?;
        if let (Some(start), Some(end)) = (start_ms, end_ms)
            && start > end
        {
            return Err(ServiceError::bad_request(
                codes::INVALID_DATE_RANGE,
                "Start date must not be after end date",
            ));
        }

        let member = self.member(workspace_id, user_id).await?;
        let params = ListCreditTransactionsParams {
            workspace_id: workspace_id.to_string(),
            user_id: user_id.to_string(),
            page,
            page_size,
            start_ms,
            end_ms,
        };
        let (transactions, total) = self
            .database
            .repository()
            .list_credit_transactions(&params)
            .await?;

        Ok(TransactionPage {
            workspace_id: member.workspace_id,
            user_id: member.user_id,
            credit: member.credit,
            transactions,
            page,
            page_size,
            total,
            total_pages: total.div_ceil(u64::from(page_size)),
        })
    }

    pub async fn topup(
        &self,
        workspace_id: &str,
        user_id: &str,
        amount: i64,
        description: Option<&str>,
    ) -> Result<LedgerWrite, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::bad_request(codes::INVALID_AMOUNT, "Invalid credit amount"));
        }
        let description = non_blank(description).unwrap_or(DEFAULT_TOPUP_DESCRIPTION);
        self.write_single(workspace_id, user_id, CreditTransactionType::Topup, amount, description)
            .await
    }

    /// Signed manual correction
    pub async fn adjust(
        &self,
        workspace_id: &str,
        user_id: &str,
        amount: i64,
        description: Option<&str>,
    ) -> Result<LedgerWrite, ServiceError> {
        if amount == 0 {
            return Err(ServiceError::bad_request(codes::INVALID_AMOUNT, "Invalid credit amount"));
        }
        let description = non_blank(description).unwrap_or(DEFAULT_ADJUST_DESCRIPTION);
        self.write_single(workspace_id, user_id, CreditTransactionType::Adjust, amount, description)
            .await
    }

    async fn write_single(
        &self,
        workspace_id: &str,
        user_id: &str,
        tx_type: CreditTransactionType,
        amount: i64,
        description: &str,
    ) -> Result<LedgerWrite, ServiceError> {
        let mut tx = self
            .database
            .repository()
            .begin_credit(workspace_id, user_id)
            .await?
            .ok_or_else(ServiceError::workspace_user_not_found)?;

        let transaction = tx
            .append(NewCreditEntry {
                tx_type,
                amount,
                credential_id: None,
                credential_name: None,
                description: Some(description.to_string()),
                created_at: self.clock.now_millis(),
            })
            .await?;
        let credit = tx.commit().await?;

        tracing::info!(
            workspace_id,
            user_id,
            tx_type = %tx_type,
            amount,
            credit,
            "Credit ledger updated"
        );
        Ok(LedgerWrite { credit, transaction })
    }

    /// Claim the random daily reward
    pub async fn daily_check_in(&self, workspace_id: &str, user_id: &str) -> Result<CheckInResult, ServiceError> {
        let mut tx = self
            .database
            .repository()
            .begin_credit(workspace_id, user_id)
            .await?
            .ok_or_else(ServiceError::workspace_user_not_found)?;

        if tx.balance() < self.config.checkin_min_credit {
            return Err(ServiceError::bad_request(
                codes::CHECKIN_MIN_CREDIT,
                format!(
                    "Daily check-in requires at least {} credit",
                    self.config.checkin_min_credit
                ),
            ));
        }

        let now = self.clock.now();
        let cooldown = Duration::hours(i64::from(self.config.checkin_cooldown_hours));
        if let Some(last) = tx.last_checkin_at() {
            let next_available_at = millis_to_datetime(last) + cooldown;
            if now < next_available_at {
                return Err(ServiceError::CheckInCooldown { next_available_at });
            }
        }

        let reward = rand::thread_rng()
            .gen_range(self.config.checkin_reward_min..=self.config.checkin_reward_max);

        let transaction = tx
            .append(NewCreditEntry {
                tx_type: CreditTransactionType::Checkin,
                amount: reward,
                credential_id: None,
                credential_name: None,
                description: Some(CHECKIN_DESCRIPTION.to_string()),
                created_at: now.timestamp_millis(),
            })
            .await?;
        let credit = tx.commit().await?;

        tracing::info!(workspace_id, user_id, reward, credit, "Daily check-in claimed");
        Ok(CheckInResult {
            reward,
            credit,
            next_available_at: now + cooldown,
            transaction,
        })
    }

    /// Debit credits for billed token usage in one transaction
    ///
    /// Billing is resolved before the row lock is taken; rows are stamped
    /// after it. Usages that cost nothing produce no ledger row. The balance
    /// may go negative.
    pub async fn consume_by_usages(
        &self,
        workspace_id: &str,
        user_id: &str,
        usages: &[CreditUsage],
    ) -> Result<ConsumeResult, ServiceError> {
        let repo = self.database.repository();

        let mut entries = Vec::new();
        for usage in usages.iter().filter(|u| u.total_tokens > 0) {
            let credential = match usage.credential_id.as_deref() {
                Some(id) => {
                    let row = repo.get_credential(Some(self.cache.as_ref()), id).await?;
                    if row.is_none() {
                        tracing::warn!(
                            credential_id = id,
                            workspace_id,
                            "Credential not found for billing, using default config"
                        );
                    }
                    row
                }
                None => None,
            };

            let billing = resolve(credential.as_ref(), usage.model.as_deref());
            let computation = compute_credit(usage.total_tokens, &billing);
            if computation.consumed_credit <= 0 {
                tracing::debug!(
                    credential_id = ?usage.credential_id,
                    model = ?usage.model,
                    total_tokens = usage.total_tokens,
                    "Usage costs no credit, skipping"
                );
                continue;
            }

            let credential_name = usage
                .credential_name
                .as_deref()
                .unwrap_or(UNKNOWN_CREDENTIAL_NAME);
            entries.push(NewCreditEntry {
                tx_type: CreditTransactionType::Consume,
                amount: -computation.consumed_credit,
                credential_id: usage.credential_id.clone(),
                credential_name: usage.credential_name.clone(),
                description: Some(describe_consumption(
                    credential_name,
                    usage.model.as_deref(),
                    usage.total_tokens,
                    &billing,
                    &computation,
                )),
                created_at: 0,
            });
        }

        if entries.is_empty() {
            let member = self.member(workspace_id, user_id).await?;
            return Ok(ConsumeResult {
                credit_consumed: 0,
                credit_balance: member.credit,
                transactions: Vec::new(),
            });
        }

        let mut tx = repo
            .begin_credit(workspace_id, user_id)
            .await?
            .ok_or_else(ServiceError::workspace_user_not_found)?;
        let now = self.clock.now_millis();

        let mut credit_consumed = 0;
        let mut transactions = Vec::with_capacity(entries.len());
        for mut entry in entries {
            entry.created_at = now;
            credit_consumed -= entry.amount;
            transactions.push(tx.append(entry).await?);
        }
        let credit_balance = tx.commit().await?;

        Ok(ConsumeResult {
            credit_consumed,
            credit_balance,
            transactions,
        })
    }

    /// Pre-flight gate before model invocation
    pub async fn assert_sufficient_credit(&self, workspace_id: &str, user_id: &str) -> Result<(), ServiceError> {
        let minimum = self.config.min_credit_to_interact;
        if minimum <= 0 {
            return Ok(());
        }

        let member = self.member(workspace_id, user_id).await?;
        if member.credit < minimum {
            tracing::debug!(workspace_id, user_id, credit = member.credit, minimum, "Credit gate closed");
            return Err(ServiceError::payment_required(
                codes::INSUFFICIENT_CREDIT,
                format!(
                    "Insufficient credit: balance {} is below the required {}",
                    member.credit, minimum
                ),
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_bound(value: Option<&str>, bound: RangeBound) -> Result<Option<i64>, ServiceError> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    parse_range_bound(value, bound)
        .map(|dt| Some(dt.timestamp_millis()))
        .ok_or_else(|| {
            ServiceError::bad_request(codes::INVALID_DATE_RANGE, format!("Invalid date: {}", value))
        })
}

#[cfg(test)]
mod tests;
