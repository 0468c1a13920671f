use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_CHECKIN_COOLDOWN_HOURS, DEFAULT_CHECKIN_MIN_CREDIT, DEFAULT_CHECKIN_REWARD_MAX,
    DEFAULT_CHECKIN_REWARD_MIN, DEFAULT_MIN_CREDIT_TO_INTERACT, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS, POSTGRES_DEFAULT_MAX_CONNECTIONS,
    POSTGRES_DEFAULT_MAX_LIFETIME_SECS, POSTGRES_DEFAULT_MIN_CONNECTIONS,
    POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

// =============================================================================
// Transactional Backend Enum (SQLite or PostgreSQL)
// =============================================================================

/// Transactional database backend for ledger and usage storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionalBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for TransactionalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionalBackend::Sqlite => write!(f, "sqlite"),
            TransactionalBackend::Postgres => write!(f, "postgres"),
        }
    }
}

// =============================================================================
// File Config (JSON, every field optional)
// =============================================================================

/// PostgreSQL configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PostgresFileConfig {
    /// PostgreSQL connection URL (or use FLOWCREDIT_POSTGRES_URL env var)
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_lifetime_secs: Option<u64>,
    /// Statement timeout in seconds, 0 to disable
    pub statement_timeout_secs: Option<u64>,
}

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// Transactional backend: sqlite (default) or postgres
    pub transactional: Option<TransactionalBackend>,
    pub postgres: Option<PostgresFileConfig>,
}

/// Credit ledger section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CreditFileConfig {
    pub min_credit_to_interact: Option<i64>,
    pub checkin_min_credit: Option<i64>,
    pub checkin_reward_min: Option<i64>,
    pub checkin_reward_max: Option<i64>,
    pub checkin_cooldown_hours: Option<u32>,
}

/// Cache section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CacheFileConfig {
    pub max_entries: Option<u64>,
    pub ttl_secs: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub database: Option<DatabaseFileConfig>,
    pub credit: Option<CreditFileConfig>,
    pub cache: Option<CacheFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `target` only when `value` is set
fn merge_field<T: fmt::Debug>(target: &mut Option<T>, value: Option<T>, name: &str) {
    if value.is_some() {
        tracing::trace!(value = ?value, "Merging {}", name);
        *target = value;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(database) = other.database {
            let current = self.database.get_or_insert_with(DatabaseFileConfig::default);
            merge_field(
                &mut current.transactional,
                database.transactional,
                "database.transactional",
            );
            if let Some(pg) = database.postgres {
                let cur = current.postgres.get_or_insert_with(PostgresFileConfig::default);
                merge_field(&mut cur.url, pg.url, "database.postgres.url");
                merge_field(
                    &mut cur.max_connections,
                    pg.max_connections,
                    "database.postgres.max_connections",
                );
                merge_field(
                    &mut cur.min_connections,
                    pg.min_connections,
                    "database.postgres.min_connections",
                );
                merge_field(
                    &mut cur.acquire_timeout_secs,
                    pg.acquire_timeout_secs,
                    "database.postgres.acquire_timeout_secs",
                );
                merge_field(
                    &mut cur.idle_timeout_secs,
                    pg.idle_timeout_secs,
                    "database.postgres.idle_timeout_secs",
                );
                merge_field(
                    &mut cur.max_lifetime_secs,
                    pg.max_lifetime_secs,
                    "database.postgres.max_lifetime_secs",
                );
                merge_field(
                    &mut cur.statement_timeout_secs,
                    pg.statement_timeout_secs,
                    "database.postgres.statement_timeout_secs",
                );
            }
        }

        if let Some(credit) = other.credit {
            let current = self.credit.get_or_insert_with(CreditFileConfig::default);
            merge_field(
                &mut current.min_credit_to_interact,
                credit.min_credit_to_interact,
                "credit.min_credit_to_interact",
            );
            merge_field(
                &mut current.checkin_min_credit,
                credit.checkin_min_credit,
                "credit.checkin_min_credit",
            );
            merge_field(
                &mut current.checkin_reward_min,
                credit.checkin_reward_min,
                "credit.checkin_reward_min",
            );
            merge_field(
                &mut current.checkin_reward_max,
                credit.checkin_reward_max,
                "credit.checkin_reward_max",
            );
            merge_field(
                &mut current.checkin_cooldown_hours,
                credit.checkin_cooldown_hours,
                "credit.checkin_cooldown_hours",
            );
        }

        if let Some(cache) = other.cache {
            let current = self.cache.get_or_insert_with(CacheFileConfig::default);
            merge_field(&mut current.max_entries, cache.max_entries, "cache.max_entries");
            merge_field(&mut current.ttl_secs, cache.ttl_secs, "cache.ttl_secs");
        }

        merge_field(&mut self.debug, other.debug, "debug");
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

/// PostgreSQL configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// Statement timeout in seconds (0 = default)
    pub statement_timeout_secs: u64,
}

/// Database configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub transactional: TransactionalBackend,
    /// Only populated when transactional = postgres
    pub postgres: Option<PostgresConfig>,
}

/// Credit ledger configuration (final/runtime)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditConfig {
    /// Pre-flight gate threshold; 0 disables the gate
    pub min_credit_to_interact: i64,
    /// Balance required to claim the check-in reward
    pub checkin_min_credit: i64,
    pub checkin_reward_min: i64,
    pub checkin_reward_max: i64,
    pub checkin_cooldown_hours: u32,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            min_credit_to_interact: DEFAULT_MIN_CREDIT_TO_INTERACT,
            checkin_min_credit: DEFAULT_CHECKIN_MIN_CREDIT,
            checkin_reward_min: DEFAULT_CHECKIN_REWARD_MIN,
            checkin_reward_max: DEFAULT_CHECKIN_REWARD_MAX,
            checkin_cooldown_hours: DEFAULT_CHECKIN_COOLDOWN_HOURS,
        }
    }
}

/// In-process cache configuration (final/runtime)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub credit: CreditConfig,
    pub cache: CacheConfig,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.flowcredit/flowcredit.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::resolve(file_config, cli)
    }

    /// Layer CLI/env values over merged file values and defaults, then validate
    fn resolve(file_config: FileConfig, cli: &CliConfig) -> Result<Self> {
        let file_database = file_config.database.unwrap_or_default();
        let file_credit = file_config.credit.unwrap_or_default();
        let file_cache = file_config.cache.unwrap_or_default();

        let debug = cli.debug || file_config.debug.unwrap_or(false);

        let transactional = cli
            .transactional_backend
            .or(file_database.transactional)
            .unwrap_or_default();

        let postgres = if transactional == TransactionalBackend::Postgres {
            let file_pg = file_database.postgres.unwrap_or_default();
            Some(PostgresConfig {
                url: cli.postgres_url.clone().or(file_pg.url).unwrap_or_default(),
                max_connections: file_pg
                    .max_connections
                    .unwrap_or(POSTGRES_DEFAULT_MAX_CONNECTIONS),
                min_connections: file_pg
                    .min_connections
                    .unwrap_or(POSTGRES_DEFAULT_MIN_CONNECTIONS),
                acquire_timeout_secs: file_pg
                    .acquire_timeout_secs
                    .unwrap_or(POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS),
                idle_timeout_secs: file_pg
                    .idle_timeout_secs
                    .unwrap_or(POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS),
                max_lifetime_secs: file_pg
                    .max_lifetime_secs
                    .unwrap_or(POSTGRES_DEFAULT_MAX_LIFETIME_SECS),
                statement_timeout_secs: file_pg
                    .statement_timeout_secs
                    .unwrap_or(POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS),
            })
        } else {
            None
        };

        let defaults = CreditConfig::default();
        let credit = CreditConfig {
            min_credit_to_interact: cli
                .min_credit_to_interact
                .or(file_credit.min_credit_to_interact)
                .unwrap_or(defaults.min_credit_to_interact),
            checkin_min_credit: cli
                .checkin_min_credit
                .or(file_credit.checkin_min_credit)
                .unwrap_or(defaults.checkin_min_credit),
            checkin_reward_min: file_credit
                .checkin_reward_min
                .unwrap_or(defaults.checkin_reward_min),
            checkin_reward_max: file_credit
                .checkin_reward_max
                .unwrap_or(defaults.checkin_reward_max),
            checkin_cooldown_hours: file_credit
                .checkin_cooldown_hours
                .unwrap_or(defaults.checkin_cooldown_hours),
        };

        let cache = CacheConfig {
            max_entries: file_cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            ttl_secs: file_cache.ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        };

        let config = Self {
            database: DatabaseConfig {
                transactional,
                postgres,
            },
            credit,
            cache,
            debug,
        };

        config.validate()?;

        tracing::debug!(
            transactional_backend = %config.database.transactional,
            min_credit_to_interact = config.credit.min_credit_to_interact,
            checkin_min_credit = config.credit.checkin_min_credit,
            checkin_reward_min = config.credit.checkin_reward_min,
            checkin_reward_max = config.credit.checkin_reward_max,
            checkin_cooldown_hours = config.credit.checkin_cooldown_hours,
            cache_max_entries = config.cache.max_entries,
            cache_ttl_secs = config.cache.ttl_secs,
            debug = config.debug,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.credit.min_credit_to_interact < 0 {
            anyhow::bail!("Configuration error: credit.min_credit_to_interact must not be negative");
        }
        if self.credit.checkin_min_credit < 0 {
            anyhow::bail!("Configuration error: credit.checkin_min_credit must not be negative");
        }
        if self.credit.checkin_reward_min < 1
            || self.credit.checkin_reward_max < self.credit.checkin_reward_min
        {
            anyhow::bail!(
                "Configuration error: check-in reward range [{}, {}] must be non-empty and start at 1 or more",
                self.credit.checkin_reward_min,
                self.credit.checkin_reward_max
            );
        }
        if self.credit.checkin_cooldown_hours == 0 {
            anyhow::bail!("Configuration error: credit.checkin_cooldown_hours must be greater than 0");
        }

        if self.cache.max_entries == 0 {
            tracing::warn!("cache.max_entries is 0, credential billing lookups will not be cached");
        }

        if self.database.transactional == TransactionalBackend::Postgres {
            match self.database.postgres {
                Some(ref pg) if pg.url.is_empty() => anyhow::bail!(
                    "Configuration error: database.postgres.url is required when database.transactional is 'postgres'. \
                     Set via FLOWCREDIT_POSTGRES_URL env var or database.postgres.url in config file."
                ),
                Some(_) => {}
                None => anyhow::bail!(
                    "Configuration error: PostgreSQL configuration missing when database.transactional is 'postgres'"
                ),
            }
        }

        Ok(())
    }
}

/// Get the profile config path (~/.flowcredit/flowcredit.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
