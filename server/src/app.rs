//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;

use crate::core::cli::{
    self, CliConfig, Commands, CredentialCommands, CreditCommands, MemberArgs, MemberCommands,
    SystemCommands, UsageCommands,
};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::storage::AppStorage;
use crate::data::TransactionalService;
use crate::data::cache::CacheService;
use crate::domain::{
    CreateCredential, CredentialService, CreditLedger, RecordTokenUsageInput, TokenUsageService,
    TransactionQuery,
};
use crate::utils::file::read_json;
use crate::utils::time::{Clock, SystemClock};

pub struct CoreApp {
    pub config: AppConfig,
    pub storage: AppStorage,
    pub database: Arc<TransactionalService>,
    pub cache: Arc<CacheService>,
    pub ledger: Arc<CreditLedger>,
    pub credentials: CredentialService,
    pub usage: TokenUsageService,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        if let Commands::System {
            command: system_cmd,
        } = command
        {
            return Self::handle_system_command(system_cmd);
        }

        let app = Self::init(&cli_config).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let maintenance = app.database.start_maintenance_task(shutdown_rx);

        let result = app.dispatch(command).await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = maintenance.await {
            tracing::warn!(error = %e, "Maintenance task did not stop cleanly");
        }
        app.database.close().await;

        result
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init().await?;

        let database = Arc::new(
            TransactionalService::init(
                config.database.transactional,
                &storage,
                config.database.postgres.as_ref(),
            )
            .await?,
        );

        let cache = Arc::new(CacheService::new(&config.cache));
        tracing::debug!(
            max_entries = config.cache.max_entries,
            ttl_secs = config.cache.ttl_secs,
            "Cache initialized"
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = Arc::new(CreditLedger::new(
            database.clone(),
            cache.clone(),
            config.credit.clone(),
            clock.clone(),
        ));
        let credentials = CredentialService::new(database.clone(), cache.clone(), clock.clone());
        let usage = TokenUsageService::new(database.clone(), ledger.clone(), clock);

        Ok(Self {
            config,
            storage,
            database,
            cache,
            ledger,
            credentials,
            usage,
        })
    }

    async fn dispatch(&self, command: Commands) -> Result<()> {
        tracing::debug!(
            backend = ?self.database.backend(),
            data_dir = %self.storage.data_dir().display(),
            "Dispatching command"
        );

        match command {
            Commands::Member { command } => self.handle_member_command(command).await,
            Commands::Credit { command } => self.handle_credit_command(command).await,
            Commands::Credential { command } => self.handle_credential_command(command).await,
            Commands::Usage { command } => self.handle_usage_command(command).await,
            Commands::System { command } => Self::handle_system_command(command),
        }
    }

    async fn handle_member_command(&self, cmd: MemberCommands) -> Result<()> {
        match cmd {
            MemberCommands::Add {
                organization,
                member: MemberArgs { workspace, user },
                email,
                name,
            } => {
                let row = self
                    .ledger
                    .ensure_workspace_member(
                        &organization,
                        &workspace,
                        &user,
                        email.as_deref(),
                        name.as_deref(),
                    )
                    .await?;
                print_json(&row)
            }
        }
    }

    async fn handle_credit_command(&self, cmd: CreditCommands) -> Result<()> {
        match cmd {
            CreditCommands::Balance { member } => {
                print_json(&self.ledger.get_summary(&member.workspace, &member.user).await?)
            }
            CreditCommands::Transactions {
                member,
                page,
                page_size,
                start,
                end,
            } => {
                let query = TransactionQuery {
                    page,
                    page_size,
                    start,
                    end,
                };
                let page = self
                    .ledger
                    .get_transactions(&member.workspace, &member.user, &query)
                    .await?;
                print_json(&page)
            }
            CreditCommands::Topup {
                member,
                amount,
                description,
            } => {
                let result = self
                    .ledger
                    .topup(&member.workspace, &member.user, amount, description.as_deref())
                    .await?;
                print_json(&result)
            }
            CreditCommands::Adjust {
                member,
                amount,
                description,
            } => {
                let result = self
                    .ledger
                    .adjust(&member.workspace, &member.user, amount, description.as_deref())
                    .await?;
                print_json(&result)
            }
            CreditCommands::Checkin { member } => {
                let result = self
                    .ledger
                    .daily_check_in(&member.workspace, &member.user)
                    .await?;
                print_json(&result)
            }
            CreditCommands::Gate { member } => {
                self.ledger
                    .assert_sufficient_credit(&member.workspace, &member.user)
                    .await?;
                print_json(&serde_json::json!({
                    "workspace_id": member.workspace,
                    "user_id": member.user,
                    "allowed": true,
                    "min_credit_to_interact": self.config.credit.min_credit_to_interact,
                }))
            }
        }
    }

    async fn handle_credential_command(&self, cmd: CredentialCommands) -> Result<()> {
        match cmd {
            CredentialCommands::Create {
                workspace,
                name,
                credential_type,
                multiplier,
                model_billing,
            } => {
                let model_billing = model_billing.as_deref().map(read_json).transpose()?;
                let row = self
                    .credentials
                    .create(&CreateCredential {
                        workspace_id: workspace,
                        name,
                        credential_name: credential_type,
                        multiplier,
                        model_billing,
                    })
                    .await?;
                print_json(&row)
            }
            CredentialCommands::SetMultiplier { id, value } => {
                print_json(&self.credentials.update_credit_multiplier(&id, value).await?)
            }
            CredentialCommands::SetModelBilling { id, file } => {
                let value = read_json(&file)?;
                print_json(&self.credentials.update_model_billing(&id, &value).await?)
            }
        }
    }

    async fn handle_usage_command(&self, cmd: UsageCommands) -> Result<()> {
        match cmd {
            UsageCommands::Record { input } => {
                let document = read_json(&input)?;
                let request: RecordTokenUsageInput = serde_json::from_value(document)
                    .with_context(|| format!("Invalid usage record: {}", input.display()))?;
                print_json(&self.usage.record_token_usage(&request).await?)
            }
            UsageCommands::Summary {
                organization,
                start,
                end,
            } => {
                let summary = self
                    .usage
                    .usage_summary(&organization, start.as_deref(), end.as_deref())
                    .await?;
                print_json(&summary)
            }
        }
    }

    fn handle_system_command(cmd: SystemCommands) -> Result<()> {
        match cmd {
            SystemCommands::Prune { yes } => Self::prune_data(yes),
        }
    }

    fn prune_data(skip_confirm: bool) -> Result<()> {
        let data_dir = AppStorage::resolve_data_dir();

        if !data_dir.exists() {
            println!(
                "Nothing to prune. Data directory does not exist: {}",
                data_dir.display()
            );
            return Ok(());
        }

        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);

        println!("This will permanently delete the local ledger data:");
        println!("  {}", data_dir.display());

        if !skip_confirm {
            print!("\nContinue? [y/N] ");
            std::io::Write::flush(&mut std::io::stdout())?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;

            if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
                println!("Aborted.");
                return Ok(());
            }
        }

        std::fs::remove_dir_all(&data_dir)
            .with_context(|| format!("Failed to delete data directory: {}", data_dir.display()))?;
        println!("Pruned: {}", data_dir.display());
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}
