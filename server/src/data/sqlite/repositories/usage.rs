//! Token usage audit rows

use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::data::sqlite::SqliteError;
use crate::data::types::{
    FlowType, NewUsageCredential, NewUsageExecution, TokenCounts, TokenMetric, UsageCredentialRow,
    UsageExecutionRow,
};

const COUNT_COLUMNS: &str = "input_tokens, output_tokens, total_tokens, cache_read_tokens, \
     cache_write_tokens, reasoning_tokens, accepted_prediction_tokens, rejected_prediction_tokens, \
     audio_input_tokens, audio_output_tokens";

pub async fn insert_execution(
    pool: &SqlitePool,
    e: &NewUsageExecution,
) -> Result<UsageExecutionRow, SqliteError> {
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
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        COUNT_COLUMNS
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

/// Insert all credential-group rows of one execution atomically
pub async fn insert_credentials(
    pool: &SqlitePool,
    rows: &[NewUsageCredential],
) -> Result<Vec<UsageCredentialRow>, SqliteError> {
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
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        COUNT_COLUMNS
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

/// Executions of an organization within `[start_ms, end_ms]`, newest first
pub async fn list_executions(
    pool: &SqlitePool,
    organization_id: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<UsageExecutionRow>, SqliteError> {
    let sql = format!(
        r#"
        SELECT id, workspace_id, organization_id, user_id, flow_type, flow_id,
               execution_id, chat_id, chat_message_id, session_id,
               {},
               usage_breakdown, model_breakdown, created_at
        FROM token_usage_executions
        WHERE organization_id = ? AND created_at >= ? AND created_at <= ?
        ORDER BY created_at DESC, id DESC
        "#,
        COUNT_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(organization_id)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(pool)
        .await?;

    rows.iter().map(execution_from_row).collect()
}

/// Credential-group rows of an organization within `[start_ms, end_ms]`
pub async fn list_credentials(
    pool: &SqlitePool,
    organization_id: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<UsageCredentialRow>, SqliteError> {
    let sql = format!(
        r#"
        SELECT id, usage_execution_id, workspace_id, organization_id, user_id,
               credential_id, credential_name, model, usage_count,
               {},
               usage_breakdown, created_at
        FROM token_usage_credentials
        WHERE organization_id = ? AND created_at >= ? AND created_at <= ?
        ORDER BY created_at DESC, id DESC
        "#,
        COUNT_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(organization_id)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(pool)
        .await?;

    rows.iter().map(credential_from_row).collect()
}

fn counts_from_row(row: &SqliteRow) -> Result<TokenCounts, SqliteError> {
    let mut counts = TokenCounts::default();
    for metric in TokenMetric::ALL {
        counts.set(metric, row.try_get::<i64, _>(metric.column())?);
    }
    Ok(counts)
}

fn json_column(row: &SqliteRow, column: &str) -> Result<JsonValue, SqliteError> {
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        Some(s) => Ok(serde_json::from_str(&s)?),
        None => Ok(JsonValue::Object(Default::default())),
    }
}

fn execution_from_row(row: &SqliteRow) -> Result<UsageExecutionRow, SqliteError> {
    let flow_type: String = row.try_get("flow_type")?;
    let flow_type = flow_type
        .parse::<FlowType>()
        .map_err(SqliteError::Serialization)?;

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

fn credential_from_row(row: &SqliteRow) -> Result<UsageCredentialRow, SqliteError> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::SqliteService;
    use serde_json::json;

    /// Ten distinct non-zero counters starting at `first`
    fn distinct_counts(first: i64) -> TokenCounts {
        let mut counts = TokenCounts::default();
        for (i, metric) in TokenMetric::ALL.into_iter().enumerate() {
            counts.set(metric, first + i as i64);
        }
        counts
    }

    fn execution(org: &str, created_at: i64, total: i64) -> NewUsageExecution {
        NewUsageExecution {
            workspace_id: "ws1".to_string(),
            organization_id: org.to_string(),
            user_id: Some("u1".to_string()),
            flow_type: FlowType::Agentflow,
            flow_id: Some("flow1".to_string()),
            execution_id: None,
            chat_id: Some("chat1".to_string()),
            chat_message_id: None,
            session_id: None,
            counts: TokenCounts {
                input_tokens: total / 2,
                output_tokens: total - total / 2,
                total_tokens: total,
                ..Default::default()
            },
            usage_breakdown: json!({"vendor_extra": 3}),
            model_breakdown: json!({"gpt-4o": total}),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_list_executions() {
        let db = SqliteService::open_in_memory().await;
        let pool = db.pool();

        insert_execution(pool, &execution("org1", 100, 10)).await.unwrap();
        insert_execution(pool, &execution("org1", 300, 30)).await.unwrap();
        insert_execution(pool, &execution("org1", 500, 50)).await.unwrap();
        insert_execution(pool, &execution("org2", 300, 99)).await.unwrap();

        let rows = list_executions(pool, "org1", 100, 300).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].created_at, 300);
        assert_eq!(rows[1].created_at, 100);
        assert_eq!(rows[0].counts.total_tokens, 30);
        assert_eq!(rows[0].flow_type, FlowType::Agentflow);
        assert_eq!(rows[0].model_breakdown, json!({"gpt-4o": 30}));
        assert_eq!(rows[0].usage_breakdown, json!({"vendor_extra": 3}));
    }

    #[tokio::test]
    async fn test_all_counters_survive_round_trip() {
        let db = SqliteService::open_in_memory().await;
        let pool = db.pool();

        let mut new_execution = execution("org1", 100, 0);
        new_execution.counts = distinct_counts(1);
        let exec = insert_execution(pool, &new_execution).await.unwrap();
        assert_eq!(exec.counts, new_execution.counts);

        let rows = list_executions(pool, "org1", 0, 1000).await.unwrap();
        assert_eq!(rows[0].counts, new_execution.counts);

        let credential = NewUsageCredential {
            usage_execution_id: exec.id.clone(),
            workspace_id: "ws1".to_string(),
            organization_id: "org1".to_string(),
            user_id: Some("u1".to_string()),
            credential_id: Some("cred1".to_string()),
            credential_name: Some("OpenAI".to_string()),
            model: Some("gpt-4o".to_string()),
            usage_count: 1,
            counts: distinct_counts(11),
            usage_breakdown: json!({}),
            created_at: 100,
        };
        insert_credentials(pool, std::slice::from_ref(&credential))
            .await
            .unwrap();

        let listed = list_credentials(pool, "org1", 0, 1000).await.unwrap();
        assert_eq!(listed[0].counts, credential.counts);
    }

    #[tokio::test]
    async fn test_insert_credentials_references_execution() {
        let db = SqliteService::open_in_memory().await;
        let pool = db.pool();

        let exec = insert_execution(pool, &execution("org1", 100, 10)).await.unwrap();
        let rows = vec![
            NewUsageCredential {
                usage_execution_id: exec.id.clone(),
                workspace_id: "ws1".to_string(),
                organization_id: "org1".to_string(),
                user_id: Some("u1".to_string()),
                credential_id: Some("cred1".to_string()),
                credential_name: Some("OpenAI".to_string()),
                model: Some("gpt-4o".to_string()),
                usage_count: 2,
                counts: TokenCounts {
                    total_tokens: 7,
                    ..Default::default()
                },
                usage_breakdown: json!({}),
                created_at: 100,
            },
            NewUsageCredential {
                usage_execution_id: exec.id.clone(),
                workspace_id: "ws1".to_string(),
                organization_id: "org1".to_string(),
                user_id: Some("u1".to_string()),
                credential_id: None,
                credential_name: Some("Unknown Credential".to_string()),
                model: None,
                usage_count: 1,
                counts: TokenCounts {
                    total_tokens: 3,
                    ..Default::default()
                },
                usage_breakdown: json!({}),
                created_at: 100,
            },
        ];

        let inserted = insert_credentials(pool, &rows).await.unwrap();
        assert_eq!(inserted.len(), 2);

        let listed = list_credentials(pool, "org1", 0, 1000).await.unwrap();
        assert_eq!(listed.len(), 2);
        let total: i64 = listed.iter().map(|r| r.counts.total_tokens).sum();
        assert_eq!(total, 10);
        assert!(listed.iter().all(|r| r.usage_execution_id == exec.id));
    }

    #[tokio::test]
    async fn test_insert_credentials_rejects_unknown_execution() {
        let db = SqliteService::open_in_memory().await;
        let row = NewUsageCredential {
            usage_execution_id: "missing".to_string(),
            workspace_id: "ws1".to_string(),
            organization_id: "org1".to_string(),
            user_id: None,
            credential_id: None,
            credential_name: None,
            model: None,
            usage_count: 1,
            counts: TokenCounts::default(),
            usage_breakdown: json!({}),
            created_at: 1,
        };
        assert!(insert_credentials(db.pool(), &[row]).await.is_err());
        assert!(list_credentials(db.pool(), "org1", 0, 10).await.unwrap().is_empty());
    }
}
