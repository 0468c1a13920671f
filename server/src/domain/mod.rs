//! Metering and billing logic
//!
//! - `usage` - usage extraction, aggregation, attribution and recording
//! - `billing` - per-credential/per-model billing resolution
//! - `credit` - the workspace credit ledger
//! - `credentials` - billing configuration writes

pub mod billing;
pub mod credentials;
pub mod credit;
pub mod error;
pub mod usage;

pub use credentials::{CreateCredential, CredentialService};
pub use credit::{CreditLedger, CreditUsage, TransactionQuery};
pub use error::{ErrorKind, ServiceError};
pub use usage::{RecordOutcome, RecordTokenUsageInput, TokenUsageService};
