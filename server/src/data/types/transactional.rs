//! Tenant and credential rows

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRow {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Workspace membership carrying the credit balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMemberRow {
    pub workspace_id: String,
    pub user_id: String,
    pub credit: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Credential with its billing configuration
///
/// `credit_consumption_multiplier_by_model` holds the serialized per-model
/// map exactly as stored; it is parsed by the billing resolver on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRow {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub credential_name: String,
    pub credit_consumption_multiplier: f64,
    pub credit_consumption_multiplier_by_model: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert payload for a credential
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub workspace_id: String,
    pub name: String,
    pub credential_name: String,
    pub credit_consumption_multiplier: f64,
    pub credit_consumption_multiplier_by_model: Option<String>,
    pub created_at: i64,
}
