use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::TransactionalBackend;
use super::constants::{
    ENV_CHECKIN_MIN_CREDIT, ENV_CONFIG, ENV_DEBUG, ENV_MIN_CREDIT_TO_INTERACT, ENV_POSTGRES_URL,
    ENV_TRANSACTIONAL_BACKEND,
};

#[derive(Parser)]
#[command(name = "flowcredit")]
#[command(version, about = "Token usage metering and workspace credit ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug mode (verbose configuration logging)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Transactional database backend (sqlite or postgres)
    #[arg(long, global = true, env = ENV_TRANSACTIONAL_BACKEND, value_parser = parse_transactional_backend)]
    pub transactional_backend: Option<TransactionalBackend>,

    /// PostgreSQL connection URL (when using postgres backend)
    #[arg(long, global = true, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    /// Minimum balance required before model invocation (0 disables the gate)
    #[arg(long, global = true, env = ENV_MIN_CREDIT_TO_INTERACT)]
    pub min_credit_to_interact: Option<i64>,

    /// Minimum balance required to claim the daily check-in
    #[arg(long, global = true, env = ENV_CHECKIN_MIN_CREDIT)]
    pub checkin_min_credit: Option<i64>,
}

/// Parse transactional backend from CLI/env string
fn parse_transactional_backend(s: &str) -> Result<TransactionalBackend, String> {
    match s.to_lowercase().as_str() {
        "sqlite" => Ok(TransactionalBackend::Sqlite),
        "postgres" | "postgresql" => Ok(TransactionalBackend::Postgres),
        _ => Err(format!(
            "Invalid transactional backend '{}'. Valid options: sqlite, postgres",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Workspace membership bootstrap
    Member {
        #[command(subcommand)]
        command: MemberCommands,
    },
    /// Workspace credit ledger
    Credit {
        #[command(subcommand)]
        command: CreditCommands,
    },
    /// Credential billing configuration
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
    /// Token usage metering
    Usage {
        #[command(subcommand)]
        command: UsageCommands,
    },
    /// System maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

/// Identifies one workspace membership
#[derive(clap::Args, Clone, Debug)]
pub struct MemberArgs {
    /// Workspace ID
    #[arg(long, short = 'w')]
    pub workspace: String,

    /// User ID
    #[arg(long, short = 'u')]
    pub user: String,
}

#[derive(Subcommand, Clone, Debug)]
pub enum MemberCommands {
    /// Ensure the organization, workspace, user and membership rows exist
    Add {
        /// Organization ID
        #[arg(long, short = 'o')]
        organization: String,

        #[command(flatten)]
        member: MemberArgs,

        /// User email
        #[arg(long)]
        email: Option<String>,

        /// User display name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum CreditCommands {
    /// Show the current balance
    Balance {
        #[command(flatten)]
        member: MemberArgs,
    },
    /// List ledger transactions, newest first
    Transactions {
        #[command(flatten)]
        member: MemberArgs,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        page_size: Option<u32>,

        /// Inclusive start (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Inclusive end (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Add credit to a balance
    Topup {
        #[command(flatten)]
        member: MemberArgs,

        #[arg(long)]
        amount: i64,

        #[arg(long)]
        description: Option<String>,
    },
    /// Apply a signed manual correction
    Adjust {
        #[command(flatten)]
        member: MemberArgs,

        #[arg(long, allow_hyphen_values = true)]
        amount: i64,

        #[arg(long)]
        description: Option<String>,
    },
    /// Claim the daily check-in reward
    Checkin {
        #[command(flatten)]
        member: MemberArgs,
    },
    /// Pre-flight check: fails when the balance is below the gate threshold
    Gate {
        #[command(flatten)]
        member: MemberArgs,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum CredentialCommands {
    /// Register a credential for billing
    Create {
        /// Workspace ID
        #[arg(long, short = 'w')]
        workspace: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Credential type (e.g. openAIApi)
        #[arg(long = "type")]
        credential_type: String,

        /// Flat credit consumption multiplier
        #[arg(long)]
        multiplier: Option<f64>,

        /// JSON file holding the per-model billing map
        #[arg(long)]
        model_billing: Option<PathBuf>,
    },
    /// Set the flat credit consumption multiplier
    SetMultiplier {
        /// Credential ID
        #[arg(long)]
        id: String,

        #[arg(long)]
        value: f64,
    },
    /// Replace the per-model billing map (JSON file; `null` clears it)
    SetModelBilling {
        /// Credential ID
        #[arg(long)]
        id: String,

        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum UsageCommands {
    /// Meter one execution from a JSON document of payloads and credential accesses
    Record {
        #[arg(long, short = 'i')]
        input: PathBuf,
    },
    /// Summarize token usage for an organization
    Summary {
        /// Organization ID
        #[arg(long, short = 'o')]
        organization: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SystemCommands {
    /// Delete local data directory (databases). Requires confirmation.
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub transactional_backend: Option<TransactionalBackend>,
    pub postgres_url: Option<String>,
    pub min_credit_to_interact: Option<i64>,
    pub checkin_min_credit: Option<i64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        debug: cli.debug,
        config: cli.config,
        transactional_backend: cli.transactional_backend,
        postgres_url: cli.postgres_url,
        min_credit_to_interact: cli.min_credit_to_interact,
        checkin_min_credit: cli.checkin_min_credit,
    };
    (config, cli.command)
}
