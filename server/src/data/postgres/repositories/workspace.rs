//! Organizations, workspaces, users and workspace membership

use sqlx::PgPool;

use crate::data::postgres::PostgresError;
use crate::data::types::{OrganizationRow, UserRow, WorkspaceMemberRow, WorkspaceRow};

pub async fn ensure_organization(
    pool: &PgPool,
    id: &str,
    name: &str,
    now: i64,
) -> Result<OrganizationRow, PostgresError> {
    sqlx::query(
        r#"
        INSERT INTO organizations (id, name, created_at, updated_at)
        VALUES ($1, $2, $3, $3)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(now)
    .execute(pool)
    .await?;

    let (id, name, created_at, updated_at) = sqlx::query_as::<_, (String, String, i64, i64)>(
        "SELECT id, name, created_at, updated_at FROM organizations WHERE id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(OrganizationRow {
        id,
        name,
        created_at,
        updated_at,
    })
}

pub async fn ensure_workspace(
    pool: &PgPool,
    id: &str,
    organization_id: &str,
    name: &str,
    now: i64,
) -> Result<WorkspaceRow, PostgresError> {
    sqlx::query(
        r#"
        INSERT INTO workspaces (id, organization_id, name, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .bind(name)
    .bind(now)
    .execute(pool)
    .await?;

    let (id, org_id, name, created_at, updated_at) =
        sqlx::query_as::<_, (String, String, String, i64, i64)>(
            "SELECT id, organization_id, name, created_at, updated_at FROM workspaces WHERE id = $1",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

    if org_id != organization_id {
        return Err(PostgresError::Conflict(format!(
            "Workspace {} belongs to organization {}",
            id, org_id
        )));
    }

    Ok(WorkspaceRow {
        id,
        organization_id: org_id,
        name,
        created_at,
        updated_at,
    })
}

pub async fn ensure_user(
    pool: &PgPool,
    id: &str,
    email: Option<&str>,
    name: Option<&str>,
    now: i64,
) -> Result<UserRow, PostgresError> {
    let (id, email, name, created_at, updated_at) =
        sqlx::query_as::<_, (String, Option<String>, Option<String>, i64, i64)>(
            r#"
            INSERT INTO users (id, email, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (id) DO UPDATE SET
                email = COALESCE(EXCLUDED.email, users.email),
                name = COALESCE(EXCLUDED.name, users.name),
                updated_at = EXCLUDED.updated_at
            RETURNING id, email, name, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(UserRow {
        id,
        email,
        name,
        created_at,
        updated_at,
    })
}

pub async fn ensure_member(
    pool: &PgPool,
    workspace_id: &str,
    user_id: &str,
    now: i64,
) -> Result<WorkspaceMemberRow, PostgresError> {
    sqlx::query(
        r#"
        INSERT INTO workspace_users (workspace_id, user_id, credit, created_at, updated_at)
        VALUES ($1, $2, 0, $3, $3)
        ON CONFLICT (workspace_id, user_id) DO NOTHING
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await?;

    get_member(pool, workspace_id, user_id)
        .await?
        .ok_or(PostgresError::Database(sqlx::Error::RowNotFound))
}

pub async fn get_member(
    pool: &PgPool,
    workspace_id: &str,
    user_id: &str,
) -> Result<Option<WorkspaceMemberRow>, PostgresError> {
    let row = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
        r#"
        SELECT workspace_id, user_id, credit, created_at, updated_at
        FROM workspace_users
        WHERE workspace_id = $1 AND user_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(workspace_id, user_id, credit, created_at, updated_at)| WorkspaceMemberRow {
            workspace_id,
            user_id,
            credit,
            created_at,
            updated_at,
        },
    ))
}

pub async fn get_users(pool: &PgPool, ids: &[String]) -> Result<Vec<UserRow>, PostgresError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>, i64, i64)>(
        "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, email, name, created_at, updated_at)| UserRow {
            id,
            email,
            name,
            created_at,
            updated_at,
        })
        .collect())
}
