//! Per-model billing map stored on credentials
//!
//! Stored form: `{"<model>": {"multiplier": f64, "rmbPerMTok": f64}}`.
//! Older rows may hold a bare number per model (multiplier only).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::error::{ServiceError, codes};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelBillingEntry {
    pub multiplier: f64,
    #[serde(rename = "rmbPerMTok")]
    pub rmb_per_m_tok: f64,
}

impl Default for ModelBillingEntry {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            rmb_per_m_tok: 0.0,
        }
    }
}

pub type ModelBillingMap = BTreeMap<String, ModelBillingEntry>;

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::bad_request(codes::INVALID_MODEL_BILLING, message)
}

fn valid_multiplier(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn valid_price(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Validate and normalize a map submitted by a credential owner
///
/// `null` and `{}` clear the map (`Ok(None)`). Anything else must be an
/// object of model name to number or `{multiplier?, rmbPerMTok?}`.
pub fn validate_model_billing(value: &JsonValue) -> Result<Option<ModelBillingMap>, ServiceError> {
    let obj = match value {
        JsonValue::Null => return Ok(None),
        JsonValue::Object(obj) => obj,
        _ => return Err(invalid("Model billing config must be an object")),
    };

    let mut map = ModelBillingMap::new();
    for (raw_key, raw_entry) in obj {
        let key = raw_key.trim();
        if key.is_empty() {
            return Err(invalid("Model name must not be empty"));
        }
        if map.contains_key(key) {
            return Err(invalid(format!("Duplicate model name: {}", key)));
        }

        let entry = match raw_entry {
            JsonValue::Number(n) => ModelBillingEntry {
                multiplier: n.as_f64().unwrap_or(f64::NAN),
                rmb_per_m_tok: 0.0,
            },
            JsonValue::Object(fields) => {
                let number = |name: &str, default: f64| -> Result<f64, ServiceError> {
                    match fields.get(name) {
                        None | Some(JsonValue::Null) => Ok(default),
                        Some(JsonValue::Number(n)) => Ok(n.as_f64().unwrap_or(f64::NAN)),
                        Some(_) => Err(invalid(format!("{} for model {} must be a number", name, key))),
                    }
                };
                ModelBillingEntry {
                    multiplier: number("multiplier", 1.0)?,
                    rmb_per_m_tok: number("rmbPerMTok", 0.0)?,
                }
            }
            _ => {
                return Err(invalid(format!(
                    "Billing entry for model {} must be a number or an object",
                    key
                )));
            }
        };

        if !valid_multiplier(entry.multiplier) {
            return Err(invalid(format!(
                "Multiplier for model {} must be a finite number greater than 0",
                key
            )));
        }
        if !valid_price(entry.rmb_per_m_tok) {
            return Err(invalid(format!(
                "rmbPerMTok for model {} must be a finite number of at least 0",
                key
            )));
        }

        map.insert(key.to_string(), entry);
    }

    Ok((!map.is_empty()).then_some(map))
}

/// Parse a stored map, skipping entries that do not read as valid
///
/// Rows are validated on write; this only guards against hand-edited data.
pub fn parse_stored(raw: Option<&str>) -> ModelBillingMap {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return ModelBillingMap::new();
    };

    let value: JsonValue = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable model billing config, ignoring");
            return ModelBillingMap::new();
        }
    };

    let JsonValue::Object(obj) = value else {
        return ModelBillingMap::new();
    };

    obj.into_iter()
        .filter_map(|(key, entry)| {
            let entry = match entry {
                JsonValue::Number(n) => ModelBillingEntry {
                    multiplier: n.as_f64()?,
                    rmb_per_m_tok: 0.0,
                },
                JsonValue::Object(fields) => ModelBillingEntry {
                    multiplier: fields.get("multiplier").and_then(JsonValue::as_f64).unwrap_or(1.0),
                    rmb_per_m_tok: fields
                        .get("rmbPerMTok")
                        .and_then(JsonValue::as_f64)
                        .unwrap_or(0.0),
                },
                _ => return None,
            };
            (valid_multiplier(entry.multiplier) && valid_price(entry.rmb_per_m_tok))
                .then(|| (key.trim().to_string(), entry))
        })
        .collect()
}

pub fn serialize_map(map: &ModelBillingMap) -> Result<String, ServiceError> {
    serde_json::to_string(map)
        .map_err(|e| ServiceError::internal(format!("Failed to serialize billing config: {}", e)))
}
