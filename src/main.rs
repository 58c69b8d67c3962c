//! Sandbox CLI: drives the ledger gateway against an in-memory ledger whose
//! state is kept in a JSON snapshot between runs.

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::Context;
use campaign_ledger::{
    config::GatewayConfig,
    gateway::{LedgerGateway, StaticIdentity, TransactionOutcome},
    ledger::{LedgerSnapshot, MemoryLedger},
    transaction::CampaignForm,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "campaign-ledger", version, about = "Crowdfunding ledger sandbox")]
struct Cli {
    /// Ledger snapshot file, created on first write.
    #[arg(long, global = true, default_value = "ledger-state.json")]
    state: PathBuf,

    /// Account acting as the caller; omit to act unauthenticated.
    #[arg(long, global = true)]
    account: Option<String>,

    /// TOML gateway configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish a new campaign owned by --account.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Target in whole units, e.g. 1.5
        #[arg(long)]
        target: String,
        /// 2030-01-01, 2030-01-01T12:00 or RFC 3339
        #[arg(long)]
        deadline: String,
        #[arg(long, default_value = "")]
        image: String,
    },
    /// Donate to campaign <id> from --account.
    Donate {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        amount: String,
    },
    /// List campaigns as JSON.
    Campaigns {
        /// Only campaigns owned by --account.
        #[arg(long)]
        mine: bool,
    },
    /// List donations to campaign <id> as JSON.
    Donations {
        #[arg(long)]
        id: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    config.apply_env_overrides()?;
    debug!(chain_id = config.chain_id, contract = %config.contract_address, "config loaded");

    let ledger = Arc::new(load_ledger(&cli.state)?);
    let gateway = LedgerGateway::from_config(ledger.clone(), StaticIdentity(cli.account), &config)?;

    let outcome = match cli.command {
        Command::Create {
            title,
            description,
            target,
            deadline,
            image,
        } => {
            let form = CampaignForm {
                title,
                description,
                target,
                deadline,
                image,
            };
            gateway.create_campaign(&form).await
        }
        Command::Donate { id, amount } => gateway.donate(id, &amount).await,
        Command::Campaigns { mine } => {
            let campaigns = if mine {
                gateway.list_owned_campaigns().await?
            } else {
                gateway.list_campaigns().await?
            };
            print_json(&campaigns)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Donations { id } => {
            print_json(&gateway.list_donations(id).await?)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    match outcome {
        TransactionOutcome::Confirmed { transaction_id } => {
            save_ledger(&cli.state, &ledger.snapshot().await)?;
            println!("{transaction_id}");
            Ok(ExitCode::SUCCESS)
        }
        TransactionOutcome::Rejected { cause } => {
            eprintln!("rejected: {cause}");
            Ok(ExitCode::from(1))
        }
        TransactionOutcome::Unknown { waited } => {
            eprintln!("no outcome after {waited:?}; the write may still land");
            Ok(ExitCode::from(3))
        }
    }
}

fn load_ledger(path: &Path) -> anyhow::Result<MemoryLedger> {
    if !path.exists() {
        return Ok(MemoryLedger::new());
    }
    let raw = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let snapshot: LedgerSnapshot =
        serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(MemoryLedger::restore(snapshot)?)
}

fn save_ledger(path: &Path, snapshot: &LedgerSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
