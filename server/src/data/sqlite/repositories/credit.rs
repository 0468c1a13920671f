//! Credit ledger
//!
//! Every balance change runs inside a `SqliteCreditTx`. The transaction's
//! first statement is a no-op write on the member row, which takes the
//! database write lock before the balance is read. Concurrent ledger
//! writers therefore queue on the busy timeout instead of reading a stale
//! balance.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::data::sqlite::SqliteError;
use crate::data::types::{
    CreditTransactionRow, CreditTransactionType, ListCreditTransactionsParams, NewCreditEntry,
};

/// Open ledger transaction for one workspace member
pub struct SqliteCreditTx {
    tx: Transaction<'static, Sqlite>,
    workspace_id: String,
    user_id: String,
    balance: i64,
    last_checkin_at: Option<i64>,
}

impl SqliteCreditTx {
    /// Lock the member row; `None` if the membership does not exist
    pub async fn begin(
        pool: &SqlitePool,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<Self>, SqliteError> {
        let mut tx = pool.begin().await?;

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE workspace_users SET credit = credit
            WHERE workspace_id = ? AND user_id = ?
            RETURNING credit
            "#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            return Ok(None);
        };

        let last_checkin_at: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(created_at) FROM workspace_credit_transactions
            WHERE workspace_id = ? AND user_id = ? AND type = 'checkin'
            "#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(Some(Self {
            tx,
            workspace_id: workspace_id.to_string(),
            user_id: user_id.to_string(),
            balance,
            last_checkin_at,
        }))
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn last_checkin_at(&self) -> Option<i64> {
        self.last_checkin_at
    }

    pub async fn append(
        &mut self,
        entry: NewCreditEntry,
    ) -> Result<CreditTransactionRow, SqliteError> {
        let balance = self.balance + entry.amount;
        let id = cuid2::create_id();

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO workspace_credit_transactions (
                id, workspace_id, user_id, type, amount, balance,
                credential_id, credential_name, description, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING seq
            "#,
        )
        .bind(&id)
        .bind(&self.workspace_id)
        .bind(&self.user_id)
        .bind(entry.tx_type.as_str())
        .bind(entry.amount)
        .bind(balance)
        .bind(&entry.credential_id)
        .bind(&entry.credential_name)
        .bind(&entry.description)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE workspace_users SET credit = ?, updated_at = ?
            WHERE workspace_id = ? AND user_id = ?
            "#,
        )
        .bind(balance)
        .bind(entry.created_at)
        .bind(&self.workspace_id)
        .bind(&self.user_id)
        .execute(&mut *self.tx)
        .await?;

        self.balance = balance;
        if entry.tx_type == CreditTransactionType::Checkin {
            self.last_checkin_at = Some(entry.created_at);
        }

        Ok(CreditTransactionRow {
            id,
            seq,
            workspace_id: self.workspace_id.clone(),
            user_id: self.user_id.clone(),
            tx_type: entry.tx_type,
            amount: entry.amount,
            balance,
            credential_id: entry.credential_id,
            credential_name: entry.credential_name,
            description: entry.description,
            created_at: entry.created_at,
        })
    }

    pub async fn commit(self) -> Result<i64, SqliteError> {
        self.tx.commit().await?;
        Ok(self.balance)
    }
}

/// Ledger rows for a member, newest first, with the unpaged total
pub async fn list_transactions(
    pool: &SqlitePool,
    params: &ListCreditTransactionsParams,
) -> Result<(Vec<CreditTransactionRow>, u64), SqliteError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM workspace_credit_transactions
        WHERE workspace_id = ? AND user_id = ?
          AND (? IS NULL OR created_at >= ?)
          AND (? IS NULL OR created_at <= ?)
        "#,
    )
    .bind(&params.workspace_id)
    .bind(&params.user_id)
    .bind(params.start_ms)
    .bind(params.start_ms)
    .bind(params.end_ms)
    .bind(params.end_ms)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query(
        r#"
        SELECT id, seq, workspace_id, user_id, type, amount, balance,
               credential_id, credential_name, description, created_at
        FROM workspace_credit_transactions
        WHERE workspace_id = ? AND user_id = ?
          AND (? IS NULL OR created_at >= ?)
          AND (? IS NULL OR created_at <= ?)
        ORDER BY created_at DESC, seq DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(&params.workspace_id)
    .bind(&params.user_id)
    .bind(params.start_ms)
    .bind(params.start_ms)
    .bind(params.end_ms)
    .bind(params.end_ms)
    .bind(i64::from(params.page_size))
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    let items = rows
        .iter()
        .map(transaction_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((items, total.max(0) as u64))
}

fn transaction_from_row(row: &SqliteRow) -> Result<CreditTransactionRow, SqliteError> {
    let tx_type: String = row.try_get("type")?;
    let tx_type = tx_type
        .parse::<CreditTransactionType>()
        .map_err(SqliteError::Serialization)?;

    Ok(CreditTransactionRow {
        id: row.try_get("id")?,
        seq: row.try_get("seq")?,
        workspace_id: row.try_get("workspace_id")?,
        user_id: row.try_get("user_id")?,
        tx_type,
        amount: row.try_get("amount")?,
        balance: row.try_get("balance")?,
        credential_id: row.try_get("credential_id")?,
        credential_name: row.try_get("credential_name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}
