//! Credit ledger rows

use serde::Serialize;

use super::enums::CreditTransactionType;

/// Append-only ledger row
///
/// `balance` is the balance after applying `amount`. `seq` orders rows
/// written within the same millisecond.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditTransactionRow {
    pub id: String,
    pub seq: i64,
    pub workspace_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub tx_type: CreditTransactionType,
    pub amount: i64,
    pub balance: i64,
    pub credential_id: Option<String>,
    pub credential_name: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
}

/// Entry appended through an open ledger transaction
#[derive(Debug, Clone)]
pub struct NewCreditEntry {
    pub tx_type: CreditTransactionType,
    pub amount: i64,
    pub credential_id: Option<String>,
    pub credential_name: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
}

/// Filters for listing ledger rows, newest first
#[derive(Debug, Clone)]
pub struct ListCreditTransactionsParams {
    pub workspace_id: String,
    pub user_id: String,
    pub page: u32,
    pub page_size: u32,
    /// Inclusive lower bound (unix ms)
    pub start_ms: Option<i64>,
    /// Inclusive upper bound (unix ms)
    pub end_ms: Option<i64>,
}

impl ListCreditTransactionsParams {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}
