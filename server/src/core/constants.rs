// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "FlowCredit";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "flowcredit";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".flowcredit";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "flowcredit.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "FLOWCREDIT_CONFIG";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "FLOWCREDIT_DEBUG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "FLOWCREDIT_LOG";

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "FLOWCREDIT_DATA_DIR";

/// Environment variable for transactional backend (sqlite or postgres)
pub const ENV_TRANSACTIONAL_BACKEND: &str = "FLOWCREDIT_TRANSACTIONAL_BACKEND";

/// Environment variable for PostgreSQL connection URL
pub const ENV_POSTGRES_URL: &str = "FLOWCREDIT_POSTGRES_URL";

/// Environment variable for the pre-flight credit gate threshold
pub const ENV_MIN_CREDIT_TO_INTERACT: &str = "FLOWCREDIT_MIN_CREDIT_TO_INTERACT";

/// Environment variable for the minimum balance required to check in
pub const ENV_CHECKIN_MIN_CREDIT: &str = "FLOWCREDIT_CHECKIN_MIN_CREDIT";

// =============================================================================
// SQLite
// =============================================================================

/// Database file name inside the sqlite data subdirectory
pub const SQLITE_DB_FILENAME: &str = "flowcredit.db";

/// Connection pool size
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// Busy timeout; ledger writers queue on the database write lock
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Page cache size (negative = KiB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// Pages between automatic WAL checkpoints
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";

/// Interval for the background WAL checkpoint task
pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// PostgreSQL Defaults
// =============================================================================

pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;

pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;

pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Cache
// =============================================================================

/// Cache key version prefix; bump to orphan every cached entry
pub const CACHE_KEY_VERSION: &str = "v1";

/// Default cache capacity
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

/// Default TTL for cached credential billing config
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

// =============================================================================
// Credit Ledger
// =============================================================================

/// Default balance required before a model invocation is allowed (0 = off)
pub const DEFAULT_MIN_CREDIT_TO_INTERACT: i64 = 1;

/// Default balance required to claim the daily check-in reward
pub const DEFAULT_CHECKIN_MIN_CREDIT: i64 = 1;

/// Default check-in reward bounds (inclusive)
pub const DEFAULT_CHECKIN_REWARD_MIN: i64 = 1;
pub const DEFAULT_CHECKIN_REWARD_MAX: i64 = 100;

/// Default hours between check-ins
pub const DEFAULT_CHECKIN_COOLDOWN_HOURS: u32 = 24;

/// Description stored for top-ups without one
pub const DEFAULT_TOPUP_DESCRIPTION: &str = "Manual top-up";

/// Description stored for adjustments without one
pub const DEFAULT_ADJUST_DESCRIPTION: &str = "Manual adjustment";

/// Description stored for check-in rewards
pub const CHECKIN_DESCRIPTION: &str = "Daily check-in reward";

/// Transaction listing page bounds
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Tolerance subtracted before rounding credit up
pub const CREDIT_ROUNDING_EPSILON: f64 = 1e-9;

/// Credit units per currency unit (minor units)
pub const CREDITS_PER_CURRENCY_UNIT: f64 = 100.0;

/// Tokens per priced unit (prices are per million tokens)
pub const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

// =============================================================================
// Usage Metering
// =============================================================================

/// Model bucket for usage entries without a resolvable model
pub const UNKNOWN_MODEL: &str = "unknown";

/// Name recorded for credential accesses without one
pub const UNKNOWN_CREDENTIAL_NAME: &str = "Unknown Credential";

/// Number of payload keys included in skip diagnostics
pub const PAYLOAD_KEY_SAMPLE: usize = 30;

/// Default lookback for usage summaries
pub const DEFAULT_SUMMARY_WINDOW_HOURS: i64 = 24;

/// Executions returned in a usage summary
pub const SUMMARY_RECENT_EXECUTIONS: usize = 30;

/// User name shown when the user row is missing
pub const UNKNOWN_USER_NAME: &str = "Unknown";
