//! Token usage metering
//!
//! Pure stages (`extract`, `aggregate`, `distribute`) turn raw payloads into
//! per-credential shares; `TokenUsageService` persists them and hands the
//! billable totals to the credit ledger.

pub mod aggregate;
pub mod distribute;
pub mod extract;
pub mod metrics;
mod recorder;
mod summary;

use std::sync::Arc;

pub use aggregate::{AggregatedUsage, aggregate};
pub use distribute::distribute;
pub use extract::{UsageEntry, extract_usage_entries};
pub use metrics::{UsageMetrics, derive_metrics};
pub use recorder::{CredentialAccess, RecordOutcome, RecordTokenUsageInput, SkipReason};
pub use summary::{UsageSummary, UserUsage};

use crate::data::TransactionalService;
use crate::domain::credit::CreditLedger;
use crate::utils::time::Clock;

/// Records executions and reports usage
pub struct TokenUsageService {
    database: Arc<TransactionalService>,
    ledger: Arc<CreditLedger>,
    clock: Arc<dyn Clock>,
}

impl TokenUsageService {
    pub fn new(
        database: Arc<TransactionalService>,
        ledger: Arc<CreditLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            database,
            ledger,
            clock,
        }
    }
}
