//! Token usage audit rows

use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::placeholders;
use crate::data::postgres::PostgresError;
use crate::data::types::{
    FlowType, NewUsageCredential, NewUsageExecution, TokenCounts, TokenMetric, UsageCredentialRow,
    UsageExecutionRow,
};

fn count_columns() -> String {
    TokenMetric::ALL
        .iter()
        .map(|m| m.column())
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn insert_execution(
    pool: &PgPool,
    e: &NewUsageExecution,
) -> Result<UsageExecutionRow, PostgresError> {
    let id = cuid2::create_id();
    let usage_breakdown = serde_json::to_string(&e.usage_breakdown)?;
    let model_breakdown = serde_json::to_string(&e.model_breakdown)?;

    let sql = format!(
        r#"
        INSERT INTO token_usage_executions (
            id, workspace_id, organization_id, user_id, flow_type, flow_id,
            execution_id, chat_id, chat_message_id, session_id,
            {},
            usage_breakdown, model_breakdown, created_at
        ) VALUES ({})
        "#,
        count_columns(),
        placeholders(1, 10 + TokenMetric::COUNT + 3)
    );

    let mut query = sqlx::query(&sql)
        .bind(&id)
        .bind(&e.workspace_id)
        .bind(&e.organization_id)
        .bind(&e.user_id)
        .bind(e.flow_type.as_str())
        .bind(&e.flow_id)
        .bind(&e.execution_id)
        .bind(&e.chat_id)
        .bind(&e.chat_message_id)
        .bind(&e.session_id);
    for metric in TokenMetric::ALL {
        query = query.bind(e.counts.get(metric));
    }
    query
        .bind(&usage_breakdown)
        .bind(&model_breakdown)
        .bind(e.created_at)
        .execute(pool)
        .await?;

    Ok(UsageExecutionRow {
        id,
        workspace_id: e.workspace_id.clone(),
        organization_id: e.organization_id.clone(),
        user_id: e.user_id.clone(),
        flow_type: e.flow_type,
        flow_id: e.flow_id.clone(),
        execution_id: e.execution_id.clone(),
        chat_id: e.chat_id.clone(),
        chat_message_id: e.chat_message_id.clone(),
        session_id: e.session_id.clone(),
        counts: e.counts,
        usage_breakdown: e.usage_breakdown.clone(),
        model_breakdown: e.model_breakdown.clone(),
        created_at: e.created_at,
    })
}

pub async fn insert_credentials(
    pool: &PgPool,
    rows: &[NewUsageCredential],
) -> Result<Vec<UsageCredentialRow>, PostgresError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        r#"
        INSERT INTO token_usage_credentials (
            id, usage_execution_id, workspace_id, organization_id, user_id,
            credential_id, credential_name, model, usage_count,
            {},
            usage_breakdown, created_at
        ) VALUES ({})
        "#,
        count_columns(),
        placeholders(1, 9 + TokenMetric::COUNT + 2)
    );

    let mut tx = pool.begin().await?;
    let mut inserted = Vec::with_capacity(rows.len());

    for row in rows {
        let id = cuid2::create_id();
        let usage_breakdown = serde_json::to_string(&row.usage_breakdown)?;

        let mut query = sqlx::query(&sql)
            .bind(&id)
            .bind(&row.usage_execution_id)
            .bind(&row.workspace_id)
            .bind(&row.organization_id)
            .bind(&row.user_id)
            .bind(&row.credential_id)
            .bind(&row.credential_name)
            .bind(&row.model)
            .bind(row.usage_count);
        for metric in TokenMetric::ALL {
            query = query.bind(row.counts.get(metric));
        }
        query
            .bind(&usage_breakdown)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;

        inserted.push(UsageCredentialRow {
            id,
            usage_execution_id: row.usage_execution_id.clone(),
            workspace_id: row.workspace_id.clone(),
            organization_id: row.organization_id.clone(),
            user_id: row.user_id.clone(),
            credential_id: row.credential_id.clone(),
            credential_name: row.credential_name.clone(),
            model: row.model.clone(),
            usage_count: row.usage_count,
            counts: row.counts,
            usage_breakdown: row.usage_breakdown.clone(),
            created_at: row.created_at,
        });
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn list_executions(
    pool: &PgPool,
    organization_id: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<UsageExecutionRow>, PostgresError> {
    let sql = format!(
        r#"
        SELECT id, workspace_id, organization_id, user_id, flow_type, flow_id,
               execution_id, chat_id, chat_message_id, session_id,
               {},
               usage_breakdown, model_breakdown, created_at
        FROM token_usage_executions
        WHERE organization_id = $1 AND created_at BETWEEN $2 AND $3
        ORDER BY created_at DESC, id DESC
        "#,
        count_columns()
    );

    let rows = sqlx::query(&sql)
        .bind(organization_id)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(pool)
        .await?;

    rows.iter().map(execution_from_row).collect()
}

pub async fn list_credentials(
    pool: &PgPool,
    organization_id: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<UsageCredentialRow>, PostgresError> {
    let sql = format!(
        r#"
        SELECT id, usage_execution_id, workspace_id, organization_id, user_id,
               credential_id, credential_name, model, usage_count,
               {},
               usage_breakdown, created_at
        FROM token_usage_credentials
        WHERE organization_id = $1 AND created_at BETWEEN $2 AND $3
        ORDER BY created_at DESC, id DESC
        "#,
        count_columns()
    );

    let rows = sqlx::query(&sql)
        .bind(organization_id)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(pool)
        .await?;

    rows.iter().map(credential_from_row).collect()
}

fn counts_from_row(row: &PgRow) -> Result<TokenCounts, PostgresError> {
    let mut counts = TokenCounts::default();
    for metric in TokenMetric::ALL {
        counts.set(metric, row.try_get::<i64, _>(metric.column())?);
    }
    Ok(counts)
}

fn json_column(row: &PgRow, column: &str) -> Result<JsonValue, PostgresError> {
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(JsonValue::Object(Default::default())),
    }
}

fn execution_from_row(row: &PgRow) -> Result<UsageExecutionRow, PostgresError> {
    let flow_type: String = row.try_get("flow_type")?;
    let flow_type = flow_type
        .parse::<FlowType>()
        .map_err(PostgresError::Serialization)?;

    Ok(UsageExecutionRow {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        organization_id: row.try_get("organization_id")?,
        user_id: row.try_get("user_id")?,
        flow_type,
        flow_id: row.try_get("flow_id")?,
        execution_id: row.try_get("execution_id")?,
        chat_id: row.try_get("chat_id")?,
        chat_message_id: row.try_get("chat_message_id")?,
        session_id: row.try_get("session_id")?,
        counts: counts_from_row(row)?,
        usage_breakdown: json_column(row, "usage_breakdown")?,
        model_breakdown: json_column(row, "model_breakdown")?,
        created_at: row.try_get("created_at")?,
    })
}

fn credential_from_row(row: &PgRow) -> Result<UsageCredentialRow, PostgresError> {
    Ok(UsageCredentialRow {
        id: row.try_get("id")?,
        usage_execution_id: row.try_get("usage_execution_id")?,
        workspace_id: row.try_get("workspace_id")?,
        organization_id: row.try_get("organization_id")?,
        user_id: row.try_get("user_id")?,
        credential_id: row.try_get("credential_id")?,
        credential_name: row.try_get("credential_name")?,
        model: row.try_get("model")?,
        usage_count: row.try_get("usage_count")?,
        counts: counts_from_row(row)?,
        usage_breakdown: json_column(row, "usage_breakdown")?,
        created_at: row.try_get("created_at")?,
    })
}
