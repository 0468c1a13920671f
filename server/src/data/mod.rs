//! Data storage layer
//!
//! - `sqlite` - Embedded transactional backend (default)
//! - `postgres` - Transactional backend for multi-node deployments
//! - `cache` - In-process cache for credential reads
//! - `types` - Row types shared by both backends
//! - `traits` - Repository traits the domain layer is written against
//! - `error` - Unified error type for all backends

pub mod cache;
pub mod error;
pub mod postgres;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use postgres::PostgresService;
pub use sqlite::SqliteService;

pub use error::DataError;

pub use traits::{CreditLedgerTx, TransactionalRepository};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::{PostgresConfig, TransactionalBackend};
use crate::core::storage::AppStorage;

/// Transactional database service
///
/// Wraps the backend-specific service selected at startup.
pub enum TransactionalService {
    /// SQLite backend (default, embedded)
    Sqlite(Arc<SqliteService>),
    /// PostgreSQL backend
    Postgres(Arc<PostgresService>),
}

impl TransactionalService {
    /// Initialize the configured backend
    ///
    /// SQLite lives under the storage data directory; PostgreSQL requires
    /// a `PostgresConfig`.
    pub async fn init(
        backend: TransactionalBackend,
        storage: &AppStorage,
        postgres_config: Option<&PostgresConfig>,
    ) -> Result<Self, DataError> {
        match backend {
            TransactionalBackend::Sqlite => {
                let service = SqliteService::init(storage).await?;
                Ok(Self::Sqlite(Arc::new(service)))
            }
            TransactionalBackend::Postgres => {
                let config = postgres_config.ok_or_else(|| {
                    DataError::Config("PostgreSQL configuration required".to_string())
                })?;
                let service = PostgresService::init(config).await?;
                Ok(Self::Postgres(Arc::new(service)))
            }
        }
    }

    /// Run a WAL checkpoint (SQLite); no-op for PostgreSQL
    pub async fn checkpoint(&self) -> Result<(), DataError> {
        match self {
            Self::Sqlite(s) => s.checkpoint().await.map_err(Into::into),
            Self::Postgres(_) => Ok(()),
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Sqlite(s) => s.close().await,
            Self::Postgres(p) => p.close().await,
        }
    }

    /// Checkpoint task for SQLite, health check task for PostgreSQL
    pub fn start_maintenance_task(&self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        match self {
            Self::Sqlite(s) => s.start_checkpoint_task(shutdown_rx),
            Self::Postgres(p) => p.start_health_check_task(shutdown_rx),
        }
    }

    pub fn backend(&self) -> TransactionalBackend {
        match self {
            Self::Sqlite(_) => TransactionalBackend::Sqlite,
            Self::Postgres(_) => TransactionalBackend::Postgres,
        }
    }

    /// Backend-agnostic repository handle
    pub fn repository(&self) -> Box<dyn TransactionalRepository + Send + Sync> {
        match self {
            Self::Sqlite(s) => Box::new(Arc::clone(s)),
            Self::Postgres(p) => Box::new(Arc::clone(p)),
        }
    }

    #[cfg(test)]
    pub async fn in_memory() -> Arc<Self> {
        Arc::new(Self::Sqlite(SqliteService::open_in_memory().await))
    }

    #[cfg(test)]
    pub async fn sqlite_file(db_path: &std::path::Path, max_connections: u32) -> Arc<Self> {
        Arc::new(Self::Sqlite(
            SqliteService::open_file_for_test(db_path, max_connections).await,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend() {
        let db = TransactionalService::in_memory().await;
        assert_eq!(db.backend(), TransactionalBackend::Sqlite);
        db.checkpoint().await.unwrap();

        let repo = db.repository();
        repo.ensure_organization("org1", "Acme", 1).await.unwrap();
        repo.ensure_workspace("ws1", "org1", "Main", 1).await.unwrap();
        repo.ensure_user("u1", None, None, 1).await.unwrap();
        repo.ensure_workspace_member("ws1", "u1", 1).await.unwrap();
        assert!(repo.get_workspace_member("ws1", "u1").await.unwrap().is_some());
        db.close().await;
    }

    #[tokio::test]
    async fn test_postgres_requires_config() {
        let storage = AppStorage::init_for_test(std::env::temp_dir());
        let result =
            TransactionalService::init(TransactionalBackend::Postgres, &storage, None).await;
        assert!(matches!(result, Err(DataError::Config(_))));
    }
}
