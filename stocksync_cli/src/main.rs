mod commands;
mod output;
mod progress;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use stocksync_lib::{Config, RestStore, SqliteStore, Store};
use tokio_util::sync::CancellationToken;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "stocksync")]
#[command(about = "Sync stock listings, market caps and fundamentals into a relational store")]
struct Cli {
    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// Write to a local SQLite database instead of the hosted store
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge an exchange listing file into stocks_search
    MergeListings(commands::merge_listings::MergeListingsArgs),
    /// Fetch market caps for stocks_search rows that lack one
    FillMarketCaps(commands::fill_market_caps::FillMarketCapsArgs),
    /// Refresh stale metrics and quarterly fundamentals for every stock
    RefreshFundamentals(commands::refresh_fundamentals::RefreshFundamentalsArgs),
}

fn open_store(sqlite: Option<&PathBuf>, config: &Config) -> Result<Box<dyn Store>> {
    match sqlite {
        Some(path) => {
            let store = SqliteStore::open(path)?;
            store.init()?;
            tracing::info!("Using SQLite store at {}", path.display());
            Ok(Box::new(store))
        }
        None => {
            let supabase = config
                .supabase
                .as_ref()
                .ok_or_else(|| anyhow!("SUPABASE_URL and SUPABASE_KEY must be set"))?;
            Ok(Box::new(RestStore::new(&supabase.url, &supabase.key)?))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("stocksync=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let config = Config::from_env(cli.sqlite.is_none())?;
    let store = open_store(cli.sqlite.as_ref(), &config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current item");
            on_interrupt.cancel();
        }
    });

    match &cli.command {
        Commands::MergeListings(args) => {
            commands::merge_listings::run(args, store.as_ref(), &format).await?
        }
        Commands::FillMarketCaps(args) => {
            commands::fill_market_caps::run(args, store.as_ref(), &config, &cancel, &format).await?
        }
        Commands::RefreshFundamentals(args) => {
            commands::refresh_fundamentals::run(args, store.as_ref(), &config, &cancel, &format)
                .await?
        }
    }

    Ok(())
}
