//! PostgreSQL migration management
//!
//! Same versioning scheme as the SQLite backend. Each step runs inside a
//! transaction; PostgreSQL DDL is transactional so a failed step leaves the
//! schema untouched.

use sqlx::PgPool;

use super::error::PostgresError;
use super::schema::{SCHEMA, SCHEMA_VERSION};
use crate::utils::crypto::sha256_hex;

/// v2: per-model billing map on credentials
const MIGRATION_V2: &str = "ALTER TABLE credentials ADD COLUMN IF NOT EXISTS credit_consumption_multiplier_by_model TEXT";

/// Run all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), PostgresError> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_name = 'schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    let current_version: Option<i32> = if table_exists {
        sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_optional(pool)
            .await?
    } else {
        None
    };

    match current_version {
        None => {
            tracing::debug!("Applying initial PostgreSQL schema v{}", SCHEMA_VERSION);
            apply_initial_schema(pool).await?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            tracing::debug!(
                "Migrating PostgreSQL schema from v{} to v{}",
                v,
                SCHEMA_VERSION
            );
            for version in (v + 1)..=SCHEMA_VERSION {
                apply_migration(pool, version).await?;
            }
        }
        Some(v) if v > SCHEMA_VERSION => {
            tracing::warn!(
                "PostgreSQL schema version {} is newer than application version {}",
                v,
                SCHEMA_VERSION
            );
        }
        _ => {
            tracing::debug!("PostgreSQL schema is up to date (v{})", SCHEMA_VERSION);
        }
    }

    Ok(())
}

async fn apply_initial_schema(pool: &PgPool) -> Result<(), PostgresError> {
    let start = std::time::Instant::now();
    let mut tx = pool.begin().await?;

    // Multi-statement string: simple query protocol, no binds
    sqlx::raw_sql(SCHEMA).execute(&mut *tx).await?;

    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        INSERT INTO schema_version (id, version, applied_at, description)
        VALUES (1, $1, $2, 'Initial schema')
        ON CONFLICT (id) DO UPDATE SET version = $1, applied_at = $2
        "#,
    )
    .bind(SCHEMA_VERSION)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let elapsed_ms = start.elapsed().as_millis() as i64;
    record_migration(&mut tx, SCHEMA_VERSION, "initial_schema", SCHEMA, now, elapsed_ms).await?;

    tx.commit().await?;
    tracing::debug!("Applied initial PostgreSQL schema in {}ms", elapsed_ms);
    Ok(())
}

async fn apply_migration(pool: &PgPool, version: i32) -> Result<(), PostgresError> {
    let (name, sql) = match version {
        1 => return Ok(()),
        2 => ("add_model_billing_to_credentials", MIGRATION_V2),
        _ => {
            return Err(PostgresError::MigrationFailed {
                version,
                name: "unknown".to_string(),
                error: format!("Unknown migration version: {}", version),
            });
        }
    };

    let start = std::time::Instant::now();
    let mut tx = pool.begin().await?;

    sqlx::raw_sql(sql)
        .execute(&mut *tx)
        .await
        .map_err(|e| PostgresError::MigrationFailed {
            version,
            name: name.to_string(),
            error: e.to_string(),
        })?;

    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        "UPDATE schema_version SET version = $1, applied_at = $2, description = $3 WHERE id = 1",
    )
    .bind(version)
    .bind(now)
    .bind(name)
    .execute(&mut *tx)
    .await?;

    let elapsed_ms = start.elapsed().as_millis() as i64;
    record_migration(&mut tx, version, name, sql, now, elapsed_ms).await?;

    tx.commit().await?;
    tracing::debug!(
        "Applied PostgreSQL migration v{} ({}) in {}ms",
        version,
        name,
        elapsed_ms
    );
    Ok(())
}

async fn record_migration(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    version: i32,
    name: &str,
    sql: &str,
    applied_at: i64,
    elapsed_ms: i64,
) -> Result<(), PostgresError> {
    sqlx::query(
        r#"
        INSERT INTO schema_migrations (version, name, applied_at, checksum, execution_time_ms, success)
        VALUES ($1, $2, $3, $4, $5, TRUE)
        ON CONFLICT (version) DO NOTHING
        "#,
    )
    .bind(version)
    .bind(name)
    .bind(applied_at)
    .bind(sha256_hex(sql))
    .bind(elapsed_ms)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_v2_is_idempotent_ddl() {
        assert!(MIGRATION_V2.contains("IF NOT EXISTS"));
    }
}
