//! Organizations, workspaces, users and workspace membership
//!
//! The `ensure_*` functions are idempotent upserts used to bootstrap a
//! workspace member for the ledger. Existing names are preserved unless a
//! new value is supplied.

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::data::types::{OrganizationRow, UserRow, WorkspaceMemberRow, WorkspaceRow};

pub async fn ensure_organization(
    pool: &SqlitePool,
    id: &str,
    name: &str,
    now: i64,
) -> Result<OrganizationRow, SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO organizations (id, name, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let (id, name, created_at, updated_at) = sqlx::query_as::<_, (String, String, i64, i64)>(
        "SELECT id, name, created_at, updated_at FROM organizations WHERE id = ?",
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

/// Insert the workspace if missing. Fails with `Conflict` when the
/// workspace already belongs to a different organization.
pub async fn ensure_workspace(
    pool: &SqlitePool,
    id: &str,
    organization_id: &str,
    name: &str,
    now: i64,
) -> Result<WorkspaceRow, SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO workspaces (id, organization_id, name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let (id, org_id, name, created_at, updated_at) =
        sqlx::query_as::<_, (String, String, String, i64, i64)>(
            "SELECT id, organization_id, name, created_at, updated_at FROM workspaces WHERE id = ?",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

    if org_id != organization_id {
        return Err(SqliteError::Conflict(format!(
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
    pool: &SqlitePool,
    id: &str,
    email: Option<&str>,
    name: Option<&str>,
    now: i64,
) -> Result<UserRow, SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            email = COALESCE(excluded.email, users.email),
            name = COALESCE(excluded.name, users.name),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, (String, Option<String>, Option<String>, i64, i64)>(
        "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(user_from_tuple(row))
}

/// Insert the membership with a zero balance if missing
pub async fn ensure_member(
    pool: &SqlitePool,
    workspace_id: &str,
    user_id: &str,
    now: i64,
) -> Result<WorkspaceMemberRow, SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO workspace_users (workspace_id, user_id, credit, created_at, updated_at)
        VALUES (?, ?, 0, ?, ?)
        ON CONFLICT(workspace_id, user_id) DO NOTHING
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_member(pool, workspace_id, user_id)
        .await?
        .ok_or(SqliteError::Database(sqlx::Error::RowNotFound))
}

pub async fn get_member(
    pool: &SqlitePool,
    workspace_id: &str,
    user_id: &str,
) -> Result<Option<WorkspaceMemberRow>, SqliteError> {
    let row = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
        r#"
        SELECT workspace_id, user_id, credit, created_at, updated_at
        FROM workspace_users
        WHERE workspace_id = ? AND user_id = ?
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

/// Users by ID; missing IDs are simply absent from the result
pub async fn get_users(pool: &SqlitePool, ids: &[String]) -> Result<Vec<UserRow>, SqliteError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: String = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!(
        "SELECT id, email, name, created_at, updated_at FROM users WHERE id IN ({})",
        placeholders
    );

    let mut query_builder =
        sqlx::query_as::<_, (String, Option<String>, Option<String>, i64, i64)>(&query);
    for id in ids {
        query_builder = query_builder.bind(id);
    }

    let rows = query_builder.fetch_all(pool).await?;
    Ok(rows.into_iter().map(user_from_tuple).collect())
}

fn user_from_tuple(
    (id, email, name, created_at, updated_at): (String, Option<String>, Option<String>, i64, i64),
) -> UserRow {
    UserRow {
        id,
        email,
        name,
        created_at,
        updated_at,
    }
}
