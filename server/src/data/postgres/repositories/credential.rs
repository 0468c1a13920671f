//! Credential repository

use sqlx::PgPool;

use crate::data::cache::{CacheKey, CacheService};
use crate::data::postgres::PostgresError;
use crate::data::types::{CredentialRow, NewCredential};

type CredentialTuple = (
    String,
    String,
    String,
    String,
    f64,
    Option<String>,
    i64,
    i64,
);

const RETURNING: &str = "RETURNING id, workspace_id, name, credential_name, \
     credit_consumption_multiplier, credit_consumption_multiplier_by_model, created_at, updated_at";

pub async fn create_credential(
    pool: &PgPool,
    new: &NewCredential,
) -> Result<CredentialRow, PostgresError> {
    let sql = format!(
        r#"
        INSERT INTO credentials (
            id, workspace_id, name, credential_name,
            credit_consumption_multiplier, credit_consumption_multiplier_by_model,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        {}
        "#,
        RETURNING
    );

    let row = sqlx::query_as::<_, CredentialTuple>(&sql)
        .bind(cuid2::create_id())
        .bind(&new.workspace_id)
        .bind(&new.name)
        .bind(&new.credential_name)
        .bind(new.credit_consumption_multiplier)
        .bind(&new.credit_consumption_multiplier_by_model)
        .bind(new.created_at)
        .fetch_one(pool)
        .await?;

    Ok(credential_from_tuple(row))
}

pub async fn get_credential(
    pool: &PgPool,
    cache: Option<&CacheService>,
    id: &str,
) -> Result<Option<CredentialRow>, PostgresError> {
    let cache_key = CacheKey::credential(id);

    if let Some(cache) = cache {
        match cache.get::<CredentialRow>(&cache_key).await {
            Ok(Some(row)) => {
                tracing::trace!(credential_id = %id, "Credential cache hit");
                return Ok(Some(row));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, key = %cache_key, "Cache get error"),
        }
    }

    let row = sqlx::query_as::<_, CredentialTuple>(
        r#"
        SELECT id, workspace_id, name, credential_name,
               credit_consumption_multiplier, credit_consumption_multiplier_by_model,
               created_at, updated_at
        FROM credentials WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(credential_from_tuple);

    if let (Some(cache), Some(row)) = (cache, &row)
        && let Err(e) = cache.set(&cache_key, row, None).await
    {
        tracing::warn!(error = %e, key = %cache_key, "Cache set error");
    }

    Ok(row)
}

pub async fn update_multiplier(
    pool: &PgPool,
    cache: Option<&CacheService>,
    id: &str,
    value: f64,
    now: i64,
) -> Result<Option<CredentialRow>, PostgresError> {
    let sql = format!(
        "UPDATE credentials SET credit_consumption_multiplier = $1, updated_at = $2 WHERE id = $3 {}",
        RETURNING
    );
    let row = sqlx::query_as::<_, CredentialTuple>(&sql)
        .bind(value)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(finish_update(cache, id, row).await)
}

pub async fn update_model_billing(
    pool: &PgPool,
    cache: Option<&CacheService>,
    id: &str,
    value: Option<&str>,
    now: i64,
) -> Result<Option<CredentialRow>, PostgresError> {
    let sql = format!(
        "UPDATE credentials SET credit_consumption_multiplier_by_model = $1, updated_at = $2 WHERE id = $3 {}",
        RETURNING
    );
    let row = sqlx::query_as::<_, CredentialTuple>(&sql)
        .bind(value)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(finish_update(cache, id, row).await)
}

async fn finish_update(
    cache: Option<&CacheService>,
    id: &str,
    row: Option<CredentialTuple>,
) -> Option<CredentialRow> {
    let row = row.map(credential_from_tuple)?;
    if let Some(cache) = cache {
        cache.invalidate_key(&CacheKey::credential(id)).await;
    }
    Some(row)
}

fn credential_from_tuple(
    (
        id,
        workspace_id,
        name,
        credential_name,
        credit_consumption_multiplier,
        credit_consumption_multiplier_by_model,
        created_at,
        updated_at,
    ): CredentialTuple,
) -> CredentialRow {
    CredentialRow {
        id,
        workspace_id,
        name,
        credential_name,
        credit_consumption_multiplier,
        credit_consumption_multiplier_by_model,
        created_at,
        updated_at,
    }
}
