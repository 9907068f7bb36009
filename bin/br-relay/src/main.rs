//! busrelay - one-shot file relay
//!
//! Sends each non-blank line of a text file as one message to a Service Bus
//! topic. The connection string is read from Azure Key Vault (or the
//! environment), and an execution ledger keeps a file from being sent twice.
//!
//! Configuration is read from TOML (see `br_config`) with `BUSRELAY_*`
//! environment overrides; Key Vault credentials come from `KVT_TENANT_ID`,
//! `KVT_CLIENT_ID` and `KVT_CLIENT_SECRET`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use br_config::{AppConfig, ConfigLoader};
use br_dispatch::{pacing, DispatchOutcome, Dispatcher, FileLedger, LedgerOrdering};
use br_queue::ServiceBusClient;
use br_secrets::{EnvProvider, FetchFailurePolicy, Provider, SecretResolver, ServicePrincipalCredentials};

/// busrelay file relay
#[derive(Parser, Debug)]
#[command(name = "br-relay")]
#[command(about = "Send each line of a file as a message to a Service Bus topic")]
struct Args {
    /// Message file; one message per non-blank line
    file: Option<PathBuf>,

    /// Configuration file (default: search busrelay.toml, config.toml)
    #[arg(long, env = "BUSRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Print an example configuration and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    br_common::logging::init_logging();

    let args = Args::parse();

    if args.example_config {
        print!("{}", AppConfig::example_toml());
        return;
    }

    let Some(file) = args.file else {
        println!("Usage: br-relay <file> [--config <path>]");
        return;
    };

    if let Err(e) = run(&file, args.config).await {
        error!("Relay run failed: {:#}", e);
    }
}

async fn run(file: &Path, config_path: Option<PathBuf>) -> Result<()> {
    let loader = match config_path {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;
    config.validate()?;

    let connection_string = resolve_connection_string(&config).await?;

    let client = ServiceBusClient::from_connection_string(&connection_string)?;
    let result = relay(&client, &config, file).await;
    client.close().await;

    match result? {
        DispatchOutcome::AlreadyProcessed { path } => {
            info!(path = %path.display(), "Nothing to do");
        }
        DispatchOutcome::Dispatched {
            path, sent, skipped, ..
        } => {
            info!(path = %path.display(), sent, skipped, "Relay complete");
        }
    }

    Ok(())
}

async fn resolve_connection_string(config: &AppConfig) -> Result<String> {
    let secret_name = &config.service_bus.connection_secret_name;

    match config.secrets.provider.as_str() {
        "env" => Ok(EnvProvider::new().get(secret_name).await?),
        _ => {
            let policy: FetchFailurePolicy = config.secrets.on_fetch_failure.parse()?;
            let resolver = SecretResolver::new()
                .with_authority_host(config.key_vault.authority_host.as_str())
                .with_failure_policy(policy);
            let credentials = ServicePrincipalCredentials::from_env();

            Ok(resolver
                .resolve_at(&config.key_vault.endpoint(), secret_name, &credentials)
                .await?)
        }
    }
}

async fn relay(client: &ServiceBusClient, config: &AppConfig, file: &Path) -> Result<DispatchOutcome> {
    let sender = client.create_sender(&config.service_bus.topic_name)?;
    info!(
        topic = %config.service_bus.topic_name,
        subscription = %config.service_bus.subscription_name,
        "Opened topic sender"
    );

    let pacer = pacing::from_settings(
        &config.pacing.strategy,
        config.pacing.burst_threshold,
        Duration::from_secs(config.pacing.pause_secs),
        config.pacing.rate_per_second,
    )?;
    let ordering: LedgerOrdering = config.ledger.ordering.parse()?;
    let ledger = Arc::new(FileLedger::new(&config.ledger.path));

    let mut dispatcher = Dispatcher::new(Arc::new(sender), ledger)
        .with_pacing(pacer)
        .with_ledger_ordering(ordering);

    Ok(dispatcher.dispatch(file).await?)
}
