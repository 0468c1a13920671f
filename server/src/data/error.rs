//! Unified error type for the data layer
//!
//! Wraps the backend-specific errors (SQLite, PostgreSQL) while keeping
//! track of which backend produced them.

use thiserror::Error;

use crate::data::cache::CacheError;
use crate::data::postgres::PostgresError;
use crate::data::sqlite::SqliteError;

#[derive(Error, Debug)]
pub enum DataError {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    /// PostgreSQL database error
    #[error("PostgreSQL error: {0}")]
    Postgres(sqlx::Error),

    #[error("Migration {version} ({name}) failed on {backend}: {error}")]
    MigrationFailed {
        backend: &'static str,
        version: i32,
        name: String,
        error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Conflict error (e.g. duplicate entry)
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl DataError {
    pub fn migration_failed(backend: &'static str, version: i32, name: &str, error: &str) -> Self {
        Self::MigrationFailed {
            backend,
            version,
            name: name.to_string(),
            error: error.to_string(),
        }
    }

    /// Connection or lock errors that may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(e) | Self::Postgres(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => {
                    // SQLITE_BUSY / SQLITE_LOCKED, postgres serialization_failure / deadlock
                    matches!(
                        db.code().as_deref(),
                        Some("5") | Some("6") | Some("40001") | Some("40P01")
                    )
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Backend name that generated this error
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
            Self::MigrationFailed { backend, .. } => backend,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Conflict(_) => {
                "unknown"
            }
        }
    }
}

impl From<SqliteError> for DataError {
    fn from(e: SqliteError) -> Self {
        match e {
            SqliteError::Database(e) => Self::Sqlite(e),
            SqliteError::MigrationFailed {
                version,
                name,
                error,
            } => Self::MigrationFailed {
                backend: "sqlite",
                version,
                name,
                error,
            },
            SqliteError::Io(e) => Self::Io(e),
            SqliteError::Serialization(msg) => Self::Serialization(msg),
            SqliteError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<PostgresError> for DataError {
    fn from(e: PostgresError) -> Self {
        match e {
            PostgresError::Database(e) => Self::Postgres(e),
            PostgresError::MigrationFailed {
                version,
                name,
                error,
            } => Self::MigrationFailed {
                backend: "postgres",
                version,
                name,
                error,
            },
            PostgresError::Config(msg) => Self::Config(msg),
            PostgresError::Io(e) => Self::Io(e),
            PostgresError::Serialization(msg) => Self::Serialization(msg),
            PostgresError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<CacheError> for DataError {
    fn from(e: CacheError) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failed_error_display() {
        let err = DataError::migration_failed("postgres", 2, "add_model_billing", "syntax error");
        assert_eq!(
            err.to_string(),
            "Migration 2 (add_model_billing) failed on postgres: syntax error"
        );
    }

    #[test]
    fn test_backend_method() {
        assert_eq!(DataError::Sqlite(sqlx::Error::RowNotFound).backend(), "sqlite");
        assert_eq!(DataError::Postgres(sqlx::Error::PoolClosed).backend(), "postgres");
        assert_eq!(
            DataError::migration_failed("sqlite", 1, "test", "error").backend(),
            "sqlite"
        );
        assert_eq!(DataError::Config("x".into()).backend(), "unknown");
    }

    #[test]
    fn test_is_transient() {
        assert!(DataError::Sqlite(sqlx::Error::PoolTimedOut).is_transient());
        assert!(DataError::Postgres(sqlx::Error::PoolClosed).is_transient());
        assert!(!DataError::Sqlite(sqlx::Error::RowNotFound).is_transient());
        assert!(!DataError::Config("bad config".into()).is_transient());
        assert!(!DataError::migration_failed("sqlite", 1, "test", "error").is_transient());
    }

    #[test]
    fn test_from_sqlite_error() {
        let err: DataError = SqliteError::Conflict("duplicate".into()).into();
        assert!(matches!(err, DataError::Conflict(ref m) if m == "duplicate"));

        let err: DataError = SqliteError::Database(sqlx::Error::RowNotFound).into();
        assert_eq!(err.backend(), "sqlite");
    }

    #[test]
    fn test_from_postgres_error() {
        let err: DataError = PostgresError::Config("missing URL".into()).into();
        assert_eq!(err.to_string(), "Configuration error: missing URL");
    }
}
