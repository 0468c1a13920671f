//! Domain error type
//!
//! Callers map `kind()` onto their own transport (HTTP status, CLI exit
//! code); `code()` is a stable machine-readable identifier.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::data::DataError;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    PaymentRequired,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    /// Check-in attempted before the cooldown elapsed
    #[error("Daily check-in already claimed, next available at {}", .next_available_at.to_rfc3339())]
    CheckInCooldown { next_available_at: DateTime<Utc> },

    #[error("{message}")]
    PaymentRequired { code: &'static str, message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl ServiceError {
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn payment_required(code: &'static str, message: impl Into<String>) -> Self {
        Self::PaymentRequired {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn workspace_user_not_found() -> Self {
        Self::not_found(codes::WORKSPACE_USER_NOT_FOUND, "Workspace User Not Found")
    }

    pub fn credential_not_found(id: &str) -> Self {
        Self::not_found(
            codes::CREDENTIAL_NOT_FOUND,
            format!("Credential {} not found", id),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BadRequest { .. } | Self::CheckInCooldown { .. } => ErrorKind::BadRequest,
            Self::PaymentRequired { .. } => ErrorKind::PaymentRequired,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { code, .. }
            | Self::BadRequest { code, .. }
            | Self::PaymentRequired { code, .. } => code,
            Self::CheckInCooldown { .. } => codes::CHECKIN_ALREADY_CLAIMED,
            Self::Internal { .. } => codes::INTERNAL_ERROR,
        }
    }
}

impl From<DataError> for ServiceError {
    fn from(e: DataError) -> Self {
        tracing::error!(
            error = %e,
            backend = e.backend(),
            transient = e.is_transient(),
            "Data error"
        );
        Self::Internal {
            message: "Database operation failed".to_string(),
        }
    }
}

/// Stable error codes
pub mod codes {
    pub const WORKSPACE_USER_NOT_FOUND: &str = "WORKSPACE_USER_NOT_FOUND";
    pub const CREDENTIAL_NOT_FOUND: &str = "CREDENTIAL_NOT_FOUND";
    pub const INVALID_CREDENTIAL: &str = "INVALID_CREDENTIAL";
    pub const INVALID_AMOUNT: &str = "INVALID_AMOUNT";
    pub const INVALID_DATE_RANGE: &str = "INVALID_DATE_RANGE";
    pub const INVALID_PAGINATION: &str = "INVALID_PAGINATION";
    pub const INVALID_MULTIPLIER: &str = "INVALID_MULTIPLIER";
    pub const INVALID_MODEL_BILLING: &str = "INVALID_MODEL_BILLING";
    pub const CHECKIN_MIN_CREDIT: &str = "CHECKIN_MIN_CREDIT";
    pub const CHECKIN_ALREADY_CLAIMED: &str = "CHECKIN_ALREADY_CLAIMED";
    pub const INSUFFICIENT_CREDIT: &str = "INSUFFICIENT_CREDIT";
    pub const WORKSPACE_CONFLICT: &str = "WORKSPACE_CONFLICT";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_kind_and_code() {
        let err = ServiceError::workspace_user_not_found();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), codes::WORKSPACE_USER_NOT_FOUND);
        assert_eq!(err.to_string(), "Workspace User Not Found");

        let err = ServiceError::payment_required(codes::INSUFFICIENT_CREDIT, "Insufficient credit");
        assert_eq!(err.kind(), ErrorKind::PaymentRequired);
    }

    #[test]
    fn test_cooldown_is_bad_request() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let err = ServiceError::CheckInCooldown {
            next_available_at: at,
        };
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.code(), codes::CHECKIN_ALREADY_CLAIMED);
        assert!(err.to_string().contains("2025-01-02T03:04:05"));
    }

    #[test]
    fn test_data_error_becomes_internal() {
        let err: ServiceError = DataError::Conflict("dup".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.code(), codes::INTERNAL_ERROR);
        assert!(!err.to_string().contains("dup"));
    }
}
