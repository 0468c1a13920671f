//! PostgreSQL schema definitions
//!
//! Mirrors the SQLite schema with native types. Timestamps are unix
//! milliseconds stored as BIGINT; JSON breakdowns are stored as TEXT so
//! both backends share the same row mapping.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at BIGINT NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms BIGINT,
    success BOOLEAN NOT NULL DEFAULT TRUE
);

-- Tenancy
CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(name) >= 1),
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) >= 1),
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workspaces_org ON workspaces(organization_id);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT CHECK (email IS NULL OR length(email) >= 3),
    name TEXT,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

-- Membership with credit balance
CREATE TABLE IF NOT EXISTS workspace_users (
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    credit BIGINT NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    PRIMARY KEY (workspace_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_workspace_users_user ON workspace_users(user_id);

-- Credentials
CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) >= 1),
    credential_name TEXT NOT NULL,
    credit_consumption_multiplier DOUBLE PRECISION NOT NULL DEFAULT 1,
    credit_consumption_multiplier_by_model TEXT,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credentials_workspace ON credentials(workspace_id);

-- Token usage audit
CREATE TABLE IF NOT EXISTS token_usage_executions (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    user_id TEXT,
    flow_type TEXT NOT NULL CHECK (flow_type IN ('CHATFLOW', 'AGENTFLOW', 'ASSISTANT', 'MULTIAGENT')),
    flow_id TEXT,
    execution_id TEXT,
    chat_id TEXT,
    chat_message_id TEXT,
    session_id TEXT,
    input_tokens BIGINT NOT NULL DEFAULT 0,
    output_tokens BIGINT NOT NULL DEFAULT 0,
    total_tokens BIGINT NOT NULL DEFAULT 0,
    cache_read_tokens BIGINT NOT NULL DEFAULT 0,
    cache_write_tokens BIGINT NOT NULL DEFAULT 0,
    reasoning_tokens BIGINT NOT NULL DEFAULT 0,
    accepted_prediction_tokens BIGINT NOT NULL DEFAULT 0,
    rejected_prediction_tokens BIGINT NOT NULL DEFAULT 0,
    audio_input_tokens BIGINT NOT NULL DEFAULT 0,
    audio_output_tokens BIGINT NOT NULL DEFAULT 0,
    usage_breakdown TEXT,
    model_breakdown TEXT,
    created_at BIGINT NOT NULL
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
    usage_count BIGINT NOT NULL DEFAULT 1,
    input_tokens BIGINT NOT NULL DEFAULT 0,
    output_tokens BIGINT NOT NULL DEFAULT 0,
    total_tokens BIGINT NOT NULL DEFAULT 0,
    cache_read_tokens BIGINT NOT NULL DEFAULT 0,
    cache_write_tokens BIGINT NOT NULL DEFAULT 0,
    reasoning_tokens BIGINT NOT NULL DEFAULT 0,
    accepted_prediction_tokens BIGINT NOT NULL DEFAULT 0,
    rejected_prediction_tokens BIGINT NOT NULL DEFAULT 0,
    audio_input_tokens BIGINT NOT NULL DEFAULT 0,
    audio_output_tokens BIGINT NOT NULL DEFAULT 0,
    usage_breakdown TEXT,
    created_at BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_cred_execution ON token_usage_credentials(usage_execution_id);
CREATE INDEX IF NOT EXISTS idx_usage_cred_org_created ON token_usage_credentials(organization_id, created_at);
CREATE INDEX IF NOT EXISTS idx_usage_cred_member_created ON token_usage_credentials(workspace_id, user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_usage_cred_credential_created ON token_usage_credentials(credential_id, created_at);

-- Credit ledger (append-only)
CREATE TABLE IF NOT EXISTS workspace_credit_transactions (
    seq BIGSERIAL PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    workspace_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    type TEXT NOT NULL CHECK (type IN ('topup', 'consume', 'adjust', 'checkin')),
    amount BIGINT NOT NULL,
    balance BIGINT NOT NULL,
    credential_id TEXT,
    credential_name TEXT,
    description TEXT,
    created_at BIGINT NOT NULL,
    FOREIGN KEY (workspace_id, user_id) REFERENCES workspace_users(workspace_id, user_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_credit_tx_member_created ON workspace_credit_transactions(workspace_id, user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_credit_tx_member_type ON workspace_credit_transactions(workspace_id, user_id, type, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_contains_required_tables() {
        for table in [
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
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "Schema missing table: {}",
                table
            );
        }
    }

    #[test]
    fn test_schema_matches_sqlite_version() {
        assert_eq!(SCHEMA_VERSION, crate::data::sqlite::schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_ledger_seq_is_serial() {
        assert!(SCHEMA.contains("seq BIGSERIAL PRIMARY KEY"));
    }
}
