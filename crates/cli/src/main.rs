//! Star Notary command line
//!
//! Acts as the execution context for the star registry: each invocation
//! identifies the caller, attaches a payment where needed, runs exactly one
//! registry call against the on-disk state, and writes the new state back
//! only if the call succeeded.

mod config;
mod state;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use starnotary_registry::{
    AccountId, AccountLedger, Amount, Call, CallContext, StarId, StarRegistry,
};
use state::{StateFile, StateStore};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "starnotary")]
#[command(about = "Star Notary registry command line", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./starnotary.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// State file, overriding the configured `state_path`
    #[arg(long)]
    state: Option<PathBuf>,

    /// Calling account: an `i…` address or `@label`
    #[arg(long, global = true)]
    caller: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a star owned by the caller
    Create {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        name: String,
        /// Empty selects the default symbol
        #[arg(long, default_value = "")]
        symbol: String,
    },
    /// Put one of the caller's stars up for sale (price 0 delists)
    Sell {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        price: Amount,
    },
    /// Withdraw one of the caller's stars from sale
    Unlist {
        #[arg(long)]
        id: u64,
    },
    /// Buy a listed star, attaching `value` from the caller's funds
    Buy {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        value: Amount,
    },
    /// Swap the owners of two stars
    Exchange {
        #[arg(long)]
        first: u64,
        #[arg(long)]
        second: u64,
    },
    /// Transfer one of the caller's stars
    Transfer {
        #[arg(long)]
        to: String,
        #[arg(long)]
        id: u64,
    },
    /// Show a star's metadata
    Lookup {
        #[arg(long)]
        id: u64,
    },
    /// Show a star's owner
    Owner {
        #[arg(long)]
        id: u64,
    },
    /// Show a star's listing price
    Price {
        #[arg(long)]
        id: u64,
    },
    /// List the stars held by an account
    Stars { owner: String },
    /// Count the stars in existence
    Supply,
    /// Credit an account in the settlement ledger (local deposit, not authorized against --caller)
    Fund { account: String, amount: Amount },
    /// Show an account's settlement balance
    Funds { account: String },
    /// Print the address for an account label
    Address { label: String },
}

impl Commands {
    /// Registry call for this command, with attached value.
    fn registry_call(&self) -> Result<Option<(Call, Amount)>> {
        let call = match self {
            Commands::Create { id, name, symbol } => Call::CreateStar {
                name: name.clone(),
                id: StarId(*id),
                symbol: symbol.clone(),
            },
            Commands::Sell { id, price } => Call::PutUpForSale {
                id: StarId(*id),
                price: *price,
            },
            Commands::Unlist { id } => Call::WithdrawFromSale { id: StarId(*id) },
            Commands::Buy { id, value } => return Ok(Some((Call::BuyStar { id: StarId(*id) }, *value))),
            Commands::Exchange { first, second } => Call::ExchangeStars {
                first: StarId(*first),
                second: StarId(*second),
            },
            Commands::Transfer { to, id } => Call::TransferStar {
                to: parse_account(to)?,
                id: StarId(*id),
            },
            Commands::Lookup { id } => Call::Lookup { id: StarId(*id) },
            Commands::Owner { id } => Call::OwnerOf { id: StarId(*id) },
            Commands::Price { id } => Call::SalePrice { id: StarId(*id) },
            Commands::Stars { owner } => Call::StarsOf {
                owner: parse_account(owner)?,
            },
            Commands::Supply => Call::TotalSupply,
            Commands::Fund { .. } | Commands::Funds { .. } | Commands::Address { .. } => {
                return Ok(None)
            }
        };
        Ok(Some((call, 0)))
    }
}

/// Accept either an encoded address or an `@label` alias.
fn parse_account(value: &str) -> Result<AccountId> {
    match value.strip_prefix('@') {
        Some(label) if !label.is_empty() => Ok(AccountId::from_label(label)),
        _ => value
            .parse()
            .with_context(|| format!("Invalid account '{}'", value)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config)?;

    if let Commands::Address { label } = &cli.command {
        println!("{}", parse_account(&format!("@{}", label.trim_start_matches('@')))?);
        return Ok(());
    }

    let state_path = cli.state.clone().unwrap_or_else(|| config.state_path.clone());
    let store = StateStore::open(&state_path)?;
    let state = store.load()?;
    let registry = StarRegistry::restore(config.registry.clone(), state.registry, state.ledger)
        .with_context(|| format!("State in {} is inconsistent", state_path.display()))?;

    let committed = match &cli.command {
        Commands::Fund { account, amount } => {
            let account = parse_account(account)?;
            registry.with_ledger(|ledger| ledger.credit(&account, *amount))?;
            info!("Funded {} with {}", account, amount);
            println!("{}", registry.account_balance(&account));
            true
        }
        Commands::Funds { account } => {
            println!("{}", registry.account_balance(&parse_account(account)?));
            false
        }
        command => {
            let (call, value) = command
                .registry_call()?
                .context("Command does not map to a registry call")?;
            let mutation = call.is_mutation();
            let caller = match (&cli.caller, mutation) {
                (Some(caller), _) => parse_account(caller)?,
                (None, false) => AccountId::NULL,
                (None, true) => anyhow::bail!("--caller is required for this command"),
            };

            let outcome = registry
                .dispatch(&CallContext::with_value(caller, value), call)
                .inspect_err(|err| warn!("Call rejected ({}): {}", err.kind(), err))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            mutation
        }
    };

    if committed {
        store.commit(&StateFile {
            registry: registry.snapshot(),
            ledger: registry.with_ledger(|ledger| ledger.clone()),
        })?;
    }

    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
