//! Repository traits for database backends
//!
//! `TransactionalRepository` is the unified interface the domain layer uses;
//! SQLite and PostgreSQL each implement it with their own SQL. Ledger writes
//! go through `CreditLedgerTx`, a transaction that holds the member's row
//! lock from `begin_credit` until `commit`.

use async_trait::async_trait;

use crate::data::cache::CacheService;
use crate::data::error::DataError;
use crate::data::types::{
    CredentialRow, CreditTransactionRow, ListCreditTransactionsParams, NewCredential,
    NewCreditEntry, NewUsageCredential, NewUsageExecution, OrganizationRow, UsageCredentialRow,
    UsageExecutionRow, UserRow, WorkspaceMemberRow, WorkspaceRow,
};

// ============================================================================
// Transactional Repository Trait
// ============================================================================

/// Repository trait for tenancy, credentials, usage audit and the ledger
///
/// Implemented by SQLite and PostgreSQL backends.
#[async_trait]
pub trait TransactionalRepository: Send + Sync {
    // ==================== Tenancy Operations ====================

    /// Insert the organization if missing
    async fn ensure_organization(
        &self,
        id: &str,
        name: &str,
        now: i64,
    ) -> Result<OrganizationRow, DataError>;

    /// Insert the workspace if missing
    ///
    /// Returns `DataError::Conflict` if the workspace exists under another
    /// organization.
    async fn ensure_workspace(
        &self,
        id: &str,
        organization_id: &str,
        name: &str,
        now: i64,
    ) -> Result<WorkspaceRow, DataError>;

    /// Insert or refresh a user; `None` fields keep their stored value
    async fn ensure_user(
        &self,
        id: &str,
        email: Option<&str>,
        name: Option<&str>,
        now: i64,
    ) -> Result<UserRow, DataError>;

    /// Insert a zero-balance membership if missing
    async fn ensure_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<WorkspaceMemberRow, DataError>;

    async fn get_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<WorkspaceMemberRow>, DataError>;

    async fn get_users(&self, ids: &[String]) -> Result<Vec<UserRow>, DataError>;

    // ==================== Credential Operations ====================

    async fn create_credential(&self, new: &NewCredential) -> Result<CredentialRow, DataError>;

    /// Get a credential by ID (cached when `cache` is given)
    async fn get_credential(
        &self,
        cache: Option<&CacheService>,
        id: &str,
    ) -> Result<Option<CredentialRow>, DataError>;

    /// Set the flat multiplier; `None` if the credential does not exist
    async fn update_credential_multiplier(
        &self,
        cache: Option<&CacheService>,
        id: &str,
        value: f64,
        now: i64,
    ) -> Result<Option<CredentialRow>, DataError>;

    /// Replace or clear the serialized per-model map
    async fn update_credential_model_billing(
        &self,
        cache: Option<&CacheService>,
        id: &str,
        value: Option<&str>,
        now: i64,
    ) -> Result<Option<CredentialRow>, DataError>;

    // ==================== Usage Operations ====================

    async fn insert_usage_execution(
        &self,
        execution: &NewUsageExecution,
    ) -> Result<UsageExecutionRow, DataError>;

    /// Insert all rows atomically
    async fn insert_usage_credentials(
        &self,
        rows: &[NewUsageCredential],
    ) -> Result<Vec<UsageCredentialRow>, DataError>;

    /// Executions with `created_at` in `[start_ms, end_ms]`, newest first
    async fn list_usage_executions(
        &self,
        organization_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageExecutionRow>, DataError>;

    async fn list_usage_credentials(
        &self,
        organization_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageCredentialRow>, DataError>;

    // ==================== Credit Operations ====================

    /// One page of ledger rows plus the total number of matching rows
    async fn list_credit_transactions(
        &self,
        params: &ListCreditTransactionsParams,
    ) -> Result<(Vec<CreditTransactionRow>, u64), DataError>;

    /// Open a ledger transaction with the member row locked
    ///
    /// Returns `None` if the membership does not exist.
    async fn begin_credit(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<Box<dyn CreditLedgerTx>>, DataError>;
}

/// Open ledger transaction for a single workspace member
///
/// Dropping without `commit` rolls back every appended entry.
#[async_trait]
pub trait CreditLedgerTx: Send {
    /// Running balance including entries appended so far
    fn balance(&self) -> i64;

    /// Time of the member's most recent check-in, read under the lock
    fn last_checkin_at(&self) -> Option<i64>;

    /// Apply `entry.amount` to the balance and append the ledger row
    async fn append(&mut self, entry: NewCreditEntry) -> Result<CreditTransactionRow, DataError>;

    /// Commit and return the final balance
    async fn commit(self: Box<Self>) -> Result<i64, DataError>;
}
