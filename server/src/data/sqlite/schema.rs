//! SQLite schema definitions
//!
//! `SCHEMA` always describes the latest version. Databases created at an
//! older version are brought forward by `migrations.rs`.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);

-- =============================================================================
-- 1. Tenancy: organizations, workspaces, users
-- =============================================================================
CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK(length(name) >= 1),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK(length(name) >= 1),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workspaces_org ON workspaces(organization_id);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT CHECK(email IS NULL OR length(email) >= 3),
    name TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- =============================================================================
-- 2. Workspace membership (carries the credit balance)
-- =============================================================================
CREATE TABLE IF NOT EXISTS workspace_users (
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    credit INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (workspace_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_workspace_users_user ON workspace_users(user_id);

-- =============================================================================
-- 3. Credentials (billing configuration only)
-- =============================================================================
CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK(length(name) >= 1),
    credential_name TEXT NOT NULL,
    credit_consumption_multiplier REAL NOT NULL DEFAULT 1,
    credit_consumption_multiplier_by_model TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credentials_workspace ON credentials(workspace_id);

-- =============================================================================
-- 4. Token usage audit
-- =============================================================================
CREATE TABLE IF NOT EXISTS token_usage_executions (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    flow_type TEXT NOT NULL CHECK(flow_type IN ('CHATFLOW', 'AGENTFLOW', 'ASSISTANT', 'MULTIAGENT')),
    flow_id TEXT,
    execution_id TEXT,
    chat_id TEXT,
    chat_message_id TEXT,
    session_id TEXT,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    cache_read_tokens INTEGER NOT NULL DEFAULT 0,
    cache_write_tokens INTEGER NOT NULL DEFAULT 0,
    reasoning_tokens INTEGER NOT NULL DEFAULT 0,
    accepted_prediction_tokens INTEGER NOT NULL DEFAULT 0,
    rejected_prediction_tokens INTEGER NOT NULL DEFAULT 0,
    audio_input_tokens INTEGER NOT NULL DEFAULT 0,
    audio_output_tokens INTEGER NOT NULL DEFAULT 0,
    usage_breakdown TEXT,
    model_breakdown TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_exec_org_created ON token_usage_executions(organization_id, created_at);
CREATE INDEX IF NOT EXISTS idx_usage_exec_member_created ON token_usage_executions(workspace_id, user_id, created_at);

CREATE TABLE IF NOT EXISTS token_usage_credentials (
    id TEXT PRIMARY KEY,
    usage_execution_id TEXT NOT NULL REFERENCES token_usage_executions(id) ON DELETE CASCADE,
    workspace_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    credential_id TEXT,
    credential_name TEXT,
    model TEXT,
    usage_count INTEGER NOT NULL DEFAULT 1,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    cache_read_tokens INTEGER NOT NULL DEFAULT 0,
    cache_write_tokens INTEGER NOT NULL DEFAULT 0,
    reasoning_tokens INTEGER NOT NULL DEFAULT 0,
    accepted_prediction_tokens INTEGER NOT NULL DEFAULT 0,
    rejected_prediction_tokens INTEGER NOT NULL DEFAULT 0,
    audio_input_tokens INTEGER NOT NULL DEFAULT 0,
    audio_output_tokens INTEGER NOT NULL DEFAULT 0,
    usage_breakdown TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_cred_execution ON token_usage_credentials(usage_execution_id);
CREATE INDEX IF NOT EXISTS idx_usage_cred_org_created ON token_usage_credentials(organization_id, created_at);
CREATE INDEX IF NOT EXISTS idx_usage_cred_member_created ON token_usage_credentials(workspace_id, user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_usage_cred_credential_created ON token_usage_credentials(credential_id, created_at);

-- =============================================================================
-- 5. Credit ledger (append-only)
-- =============================================================================
CREATE TABLE IF NOT EXISTS workspace_credit_transactions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    workspace_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('topup', 'consume', 'adjust', 'checkin')),
    amount INTEGER NOT NULL,
    balance INTEGER NOT NULL,
    credential_id TEXT,
    credential_name TEXT,
    description TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (workspace_id, user_id) REFERENCES workspace_users(workspace_id, user_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_credit_tx_member_created ON workspace_credit_transactions(workspace_id, user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_credit_tx_member_type ON workspace_credit_transactions(workspace_id, user_id, type, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn test_schema_version_is_positive() {
        assert!(SCHEMA_VERSION > 0);
    }

    #[test]
    fn test_schema_contains_required_tables() {
        let required_tables = [
            "schema_version",
            "schema_migrations",
            "organizations",
            "workspaces",
            "users",
            "workspace_users",
            "credentials",
            "token_usage_executions",
            "token_usage_credentials",
            "workspace_credit_transactions",
        ];

        for table in required_tables {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "Schema missing table: {}",
                table
            );
        }
    }

    #[tokio::test]
    async fn test_schema_applies_to_fresh_database() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        sqlx::query(SCHEMA).execute(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 10);
    }
}
