//! TransactionalRepository trait implementation for SQLite
//!
//! Implements the trait for `Arc<SqliteService>` by delegating to the
//! functions in `repositories`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::data::cache::CacheService;
use crate::data::error::DataError;
use crate::data::traits::{CreditLedgerTx, TransactionalRepository};
use crate::data::types::{
    CredentialRow, CreditTransactionRow, ListCreditTransactionsParams, NewCredential,
    NewCreditEntry, NewUsageCredential, NewUsageExecution, OrganizationRow, UsageCredentialRow,
    UsageExecutionRow, UserRow, WorkspaceMemberRow, WorkspaceRow,
};

use super::SqliteService;
use super::repositories::credit::{self, SqliteCreditTx};
use super::repositories::{credential, usage, workspace};

#[async_trait]
impl TransactionalRepository for Arc<SqliteService> {
    // ==================== Tenancy Operations ====================

    async fn ensure_organization(
        &self,
        id: &str,
        name: &str,
        now: i64,
    ) -> Result<OrganizationRow, DataError> {
        workspace::ensure_organization(self.pool(), id, name, now)
            .await
            .map_err(Into::into)
    }

    async fn ensure_workspace(
        &self,
        id: &str,
        organization_id: &str,
        name: &str,
        now: i64,
    ) -> Result<WorkspaceRow, DataError> {
        workspace::ensure_workspace(self.pool(), id, organization_id, name, now)
            .await
            .map_err(Into::into)
    }

    async fn ensure_user(
        &self,
        id: &str,
        email: Option<&str>,
        name: Option<&str>,
        now: i64,
    ) -> Result<UserRow, DataError> {
        workspace::ensure_user(self.pool(), id, email, name, now)
            .await
            .map_err(Into::into)
    }

    async fn ensure_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<WorkspaceMemberRow, DataError> {
        workspace::ensure_member(self.pool(), workspace_id, user_id, now)
            .await
            .map_err(Into::into)
    }

    async fn get_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<WorkspaceMemberRow>, DataError> {
        workspace::get_member(self.pool(), workspace_id, user_id)
            .await
            .map_err(Into::into)
    }

    async fn get_users(&self, ids: &[String]) -> Result<Vec<UserRow>, DataError> {
        workspace::get_users(self.pool(), ids)
            .await
            .map_err(Into::into)
    }

    // ==================== Credential Operations ====================

    async fn create_credential(&self, new: &NewCredential) -> Result<CredentialRow, DataError> {
        credential::create_credential(self.pool(), new)
            .await
            .map_err(Into::into)
    }

    async fn get_credential(
        &self,
        cache: Option<&CacheService>,
        id: &str,
    ) -> Result<Option<CredentialRow>, DataError> {
        credential::get_credential(self.pool(), cache, id)
            .await
            .map_err(Into::into)
    }

    async fn update_credential_multiplier(
        &self,
        cache: Option<&CacheService>,
        id: &str,
        value: f64,
        now: i64,
    ) -> Result<Option<CredentialRow>, DataError> {
        credential::update_multiplier(self.pool(), cache, id, value, now)
            .await
            .map_err(Into::into)
    }

    async fn update_credential_model_billing(
        &self,
        cache: Option<&CacheService>,
        id: &str,
        value: Option<&str>,
        now: i64,
    ) -> Result<Option<CredentialRow>, DataError> {
        credential::update_model_billing(self.pool(), cache, id, value, now)
            .await
            .map_err(Into::into)
    }

    // ==================== Usage Operations ====================

    async fn insert_usage_execution(
        &self,
        execution: &NewUsageExecution,
    ) -> Result<UsageExecutionRow, DataError> {
        usage::insert_execution(self.pool(), execution)
            .await
            .map_err(Into::into)
    }

    async fn insert_usage_credentials(
        &self,
        rows: &[NewUsageCredential],
    ) -> Result<Vec<UsageCredentialRow>, DataError> {
        usage::insert_credentials(self.pool(), rows)
            .await
            .map_err(Into::into)
    }

    async fn list_usage_executions(
        &self,
        organization_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageExecutionRow>, DataError> {
        usage::list_executions(self.pool(), organization_id, start_ms, end_ms)
            .await
            .map_err(Into::into)
    }

    async fn list_usage_credentials(
        &self,
        organization_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageCredentialRow>, DataError> {
        usage::list_credentials(self.pool(), organization_id, start_ms, end_ms)
            .await
            .map_err(Into::into)
    }

    // ==================== Credit Operations ====================

    async fn list_credit_transactions(
        &self,
        params: &ListCreditTransactionsParams,
    ) -> Result<(Vec<CreditTransactionRow>, u64), DataError> {
        credit::list_transactions(self.pool(), params)
            .await
            .map_err(Into::into)
    }

    async fn begin_credit(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<Box<dyn CreditLedgerTx>>, DataError> {
        let tx = SqliteCreditTx::begin(self.pool(), workspace_id, user_id).await?;
        Ok(tx.map(|tx| Box::new(tx) as Box<dyn CreditLedgerTx>))
    }
}

#[async_trait]
impl CreditLedgerTx for SqliteCreditTx {
    fn balance(&self) -> i64 {
        SqliteCreditTx::balance(self)
    }

    fn last_checkin_at(&self) -> Option<i64> {
        SqliteCreditTx::last_checkin_at(self)
    }

    async fn append(&mut self, entry: NewCreditEntry) -> Result<CreditTransactionRow, DataError> {
        SqliteCreditTx::append(self, entry)
            .await
            .map_err(Into::into)
    }

    async fn commit(self: Box<Self>) -> Result<i64, DataError> {
        SqliteCreditTx::commit(*self).await.map_err(Into::into)
    }
}
