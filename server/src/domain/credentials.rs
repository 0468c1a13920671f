//! Credential billing configuration writes
//!
//! Validation happens here, before anything is stored; the billing
//! resolver trusts what it reads back.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::data::TransactionalService;
use crate::data::cache::CacheService;
use crate::data::types::{CredentialRow, NewCredential};
use crate::domain::billing::{serialize_map, validate_model_billing};
use crate::domain::error::{ServiceError, codes};
use crate::utils::time::Clock;

pub struct CredentialService {
    database: Arc<TransactionalService>,
    cache: Arc<CacheService>,
    clock: Arc<dyn Clock>,
}

/// Request to register a credential
#[derive(Debug, Clone, Default)]
pub struct CreateCredential {
    pub workspace_id: String,
    pub name: String,
    pub credential_name: String,
    pub multiplier: Option<f64>,
    pub model_billing: Option<JsonValue>,
}

fn check_multiplier(value: f64) -> Result<f64, ServiceError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ServiceError::bad_request(
            codes::INVALID_MULTIPLIER,
            "Invalid credit consumption multiplier",
        ))
    }
}

fn normalize_model_billing(value: Option<&JsonValue>) -> Result<Option<String>, ServiceError> {
    match value {
        None => Ok(None),
        Some(value) => validate_model_billing(value)?
            .map(|map| serialize_map(&map))
            .transpose(),
    }
}

impl CredentialService {
    pub fn new(
        database: Arc<TransactionalService>,
        cache: Arc<CacheService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            database,
            cache,
            clock,
        }
    }

    pub async fn create(&self, request: &CreateCredential) -> Result<CredentialRow, ServiceError> {
        if request.name.trim().is_empty() || request.credential_name.trim().is_empty() {
            return Err(ServiceError::bad_request(
                codes::INVALID_CREDENTIAL,
                "Credential name and type are required",
            ));
        }
        let multiplier = check_multiplier(request.multiplier.unwrap_or(1.0))?;
        let by_model = normalize_model_billing(request.model_billing.as_ref())?;

        let row = self
            .database
            .repository()
            .create_credential(&NewCredential {
                workspace_id: request.workspace_id.clone(),
                name: request.name.trim().to_string(),
                credential_name: request.credential_name.trim().to_string(),
                credit_consumption_multiplier: multiplier,
                credit_consumption_multiplier_by_model: by_model,
                created_at: self.clock.now_millis(),
            })
            .await?;

        tracing::info!(
            credential_id = %row.id,
            workspace_id = %row.workspace_id,
            multiplier,
            "Credential created"
        );
        Ok(row)
    }

    pub async fn update_credit_multiplier(&self, id: &str, value: f64) -> Result<CredentialRow, ServiceError> {
        let value = check_multiplier(value)?;
        self.database
            .repository()
            .update_credential_multiplier(Some(self.cache.as_ref()), id, value, self.clock.now_millis())
            .await?
            .ok_or_else(|| ServiceError::credential_not_found(id))
    }

    /// Replace the per-model map; JSON `null` clears it
    pub async fn update_model_billing(&self, id: &str, value: &JsonValue) -> Result<CredentialRow, ServiceError> {
        let stored = normalize_model_billing(Some(value))?;
        let row = self
            .database
            .repository()
            .update_credential_model_billing(
                Some(self.cache.as_ref()),
                id,
                stored.as_deref(),
                self.clock.now_millis(),
            )
            .await?
            .ok_or_else(|| ServiceError::credential_not_found(id))?;

        tracing::info!(credential_id = id, cleared = stored.is_none(), "Model billing updated");
        Ok(row)
    }
}
