//! Credential repository
//!
//! Reads go through the cache when one is supplied; every successful write
//! invalidates the credential's cache entry.

use sqlx::SqlitePool;

use crate::data::cache::{CacheKey, CacheService};
use crate::data::sqlite::SqliteError;
use crate::data::types::{CredentialRow, NewCredential};

const CREDENTIAL_COLUMNS: &str = "id, workspace_id, name, credential_name, \
     credit_consumption_multiplier, credit_consumption_multiplier_by_model, created_at, updated_at";

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

pub async fn create_credential(
    pool: &SqlitePool,
    new: &NewCredential,
) -> Result<CredentialRow, SqliteError> {
    let id = cuid2::create_id();

    sqlx::query(
        r#"
        INSERT INTO credentials (
            id, workspace_id, name, credential_name,
            credit_consumption_multiplier, credit_consumption_multiplier_by_model,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.workspace_id)
    .bind(&new.name)
    .bind(&new.credential_name)
    .bind(new.credit_consumption_multiplier)
    .bind(&new.credit_consumption_multiplier_by_model)
    .bind(new.created_at)
    .bind(new.created_at)
    .execute(pool)
    .await?;

    Ok(CredentialRow {
        id,
        workspace_id: new.workspace_id.clone(),
        name: new.name.clone(),
        credential_name: new.credential_name.clone(),
        credit_consumption_multiplier: new.credit_consumption_multiplier,
        credit_consumption_multiplier_by_model: new.credit_consumption_multiplier_by_model.clone(),
        created_at: new.created_at,
        updated_at: new.created_at,
    })
}

pub async fn get_credential(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    id: &str,
) -> Result<Option<CredentialRow>, SqliteError> {
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

    let query = format!("SELECT {} FROM credentials WHERE id = ?", CREDENTIAL_COLUMNS);
    let row = sqlx::query_as::<_, CredentialTuple>(&query)
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
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    id: &str,
    value: f64,
    now: i64,
) -> Result<Option<CredentialRow>, SqliteError> {
    let result = sqlx::query(
        "UPDATE credentials SET credit_consumption_multiplier = ?, updated_at = ? WHERE id = ?",
    )
    .bind(value)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    finish_update(pool, cache, id, result.rows_affected()).await
}

/// Replace the per-model map; `None` clears it
pub async fn update_model_billing(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    id: &str,
    value: Option<&str>,
    now: i64,
) -> Result<Option<CredentialRow>, SqliteError> {
    let result = sqlx::query(
        "UPDATE credentials SET credit_consumption_multiplier_by_model = ?, updated_at = ? WHERE id = ?",
    )
    .bind(value)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    finish_update(pool, cache, id, result.rows_affected()).await
}

async fn finish_update(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    id: &str,
    rows_affected: u64,
) -> Result<Option<CredentialRow>, SqliteError> {
    if rows_affected == 0 {
        return Ok(None);
    }
    if let Some(cache) = cache {
        cache.invalidate_key(&CacheKey::credential(id)).await;
    }
    get_credential(pool, None, id).await
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
