//! Shared data types for the transactional backends (SQLite, PostgreSQL)

mod credit;
mod enums;
mod transactional;
mod usage;

pub use enums::{CreditTransactionType, FlowType};

pub use transactional::{
    CredentialRow, NewCredential, OrganizationRow, UserRow, WorkspaceMemberRow, WorkspaceRow,
};

pub use usage::{
    NewUsageCredential, NewUsageExecution, TokenCounts, TokenMetric, UsageCredentialRow,
    UsageExecutionRow,
};

pub use credit::{CreditTransactionRow, ListCreditTransactionsParams, NewCreditEntry};
