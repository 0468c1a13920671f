//! In-process cache
//!
//! A `moka` cache holding JSON-encoded values with per-entry TTLs. Built
//! once at startup and passed by reference to repository reads that opt in.

mod error;
mod key;

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use error::CacheError;
pub use key::CacheKey;

use crate::core::config::CacheConfig;

#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    ttl: Option<Duration>,
}

/// Per-entry expiry so callers can override the default TTL
struct VariableTtlExpiry;

impl Expiry<String, CacheEntry> for VariableTtlExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_read(
        &self,
        _key: &String,
        _value: &CacheEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        duration_until_expiry
    }
}

pub struct CacheService {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("entries", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl CacheService {
    pub fn new(config: &CacheConfig) -> Self {
        tracing::debug!(
            max_entries = config.max_entries,
            ttl_secs = config.ttl_secs,
            "Initializing in-memory cache"
        );

        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .initial_capacity((config.max_entries as usize / 4).min(10_000))
            .expire_after(VariableTtlExpiry)
            .build();

        Self {
            cache,
            default_ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Get a typed value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(serde_json::from_slice(&entry.data)?)),
            None => Ok(None),
        }
    }

    /// Store a typed value; `None` uses the configured default TTL
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data: serde_json::to_vec(value)?,
            ttl: Some(ttl.unwrap_or(self.default_ttl)),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    /// Remove a key, returning whether it was present
    pub async fn delete(&self, key: &str) -> bool {
        self.cache.remove(key).await.is_some()
    }

    /// Remove a key, logging at trace level
    pub async fn invalidate_key(&self, key: &str) {
        if self.delete(key).await {
            tracing::trace!(key = %key, "Cache entry invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CacheConfig {
        CacheConfig {
            max_entries: 100,
            ttl_secs: 60,
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
    struct Billing {
        id: String,
        multiplier: f64,
    }

    #[tokio::test]
    async fn test_typed_get_set() {
        let service = CacheService::new(&test_config());
        let value = Billing {
            id: "c1".to_string(),
            multiplier: 1.5,
        };

        service.set("credential:c1", &value, None).await.unwrap();
        let fetched: Option<Billing> = service.get("credential:c1").await.unwrap();
        assert_eq!(fetched, Some(value));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let service = CacheService::new(&test_config());
        let fetched: Option<Billing> = service.get("missing").await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let service = CacheService::new(&test_config());
        service.set("k", &1_i64, None).await.unwrap();
        assert!(service.delete("k").await);
        assert!(!service.delete("k").await);
        service.invalidate_key("k").await;
        assert!(service.get::<i64>("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let service = CacheService::new(&test_config());
        service
            .set("k", &"v", Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(service.get::<String>("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        service.cache.run_pending_tasks().await;

        assert!(service.get::<String>("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_error() {
        let service = CacheService::new(&test_config());
        service.set("k", &"text", None).await.unwrap();
        assert!(service.get::<i64>("k").await.is_err());
    }
}
