//! Credit ledger
//!
//! `PgCreditTx` locks the member row with `FOR UPDATE` for the lifetime of
//! the transaction, serializing balance changes across service instances.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::data::postgres::PostgresError;
use crate::data::types::{
    CreditTransactionRow, CreditTransactionType, ListCreditTransactionsParams, NewCreditEntry,
};

pub struct PgCreditTx {
    tx: Transaction<'static, Postgres>,
    workspace_id: String,
    user_id: String,
    balance: i64,
    last_checkin_at: Option<i64>,
}

impl PgCreditTx {
    pub async fn begin(
        pool: &PgPool,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<Self>, PostgresError> {
        let mut tx = pool.begin().await?;

        let balance: Option<i64> = sqlx::query_scalar(
            "SELECT credit FROM workspace_users WHERE workspace_id = $1 AND user_id = $2 FOR UPDATE",
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
            WHERE workspace_id = $1 AND user_id = $2 AND type = 'checkin'
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
    ) -> Result<CreditTransactionRow, PostgresError> {
        let balance = self.balance + entry.amount;
        let id = cuid2::create_id();

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO workspace_credit_transactions (
                id, workspace_id, user_id, type, amount, balance,
                credential_id, credential_name, description, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
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
            "UPDATE workspace_users SET credit = $1, updated_at = $2 WHERE workspace_id = $3 AND user_id = $4",
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

    pub async fn commit(self) -> Result<i64, PostgresError> {
        self.tx.commit().await?;
        Ok(self.balance)
    }
}

pub async fn list_transactions(
    pool: &PgPool,
    params: &ListCreditTransactionsParams,
) -> Result<(Vec<CreditTransactionRow>, u64), PostgresError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM workspace_credit_transactions
        WHERE workspace_id = $1 AND user_id = $2
          AND ($3::BIGINT IS NULL OR created_at >= $3)
          AND ($4::BIGINT IS NULL OR created_at <= $4)
        "#,
    )
    .bind(&params.workspace_id)
    .bind(&params.user_id)
    .bind(params.start_ms)
    .bind(params.end_ms)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query(
        r#"
        SELECT id, seq, workspace_id, user_id, type, amount, balance,
               credential_id, credential_name, description, created_at
        FROM workspace_credit_transactions
        WHERE workspace_id = $1 AND user_id = $2
          AND ($3::BIGINT IS NULL OR created_at >= $3)
          AND ($4::BIGINT IS NULL OR created_at <= $4)
        ORDER BY created_at DESC, seq DESC
        LIMIT $5 OFFSET $6
        "#,
    )
    .bind(&params.workspace_id)
    .bind(&params.user_id)
    .bind(params.start_ms)
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

fn transaction_from_row(row: &PgRow) -> Result<CreditTransactionRow, PostgresError> {
    let tx_type: String = row.try_get("type")?;
    let tx_type = tx_type
        .parse::<CreditTransactionType>()
        .map_err(PostgresError::Serialization)?;

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
