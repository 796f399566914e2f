//! The `fill-market-caps` subcommand.

use anyhow::{bail, Result};
use clap::Args;
use stocksync_lib::upsert::DEFAULT_CHUNK_SIZE;
use stocksync_lib::{fill_market_caps, Config, FillOptions, RemoteQuoteClient, Store};
use tokio_util::sync::CancellationToken;

use crate::output::{self, OutputFormat};
use crate::progress::BarProgress;

#[derive(Args)]
pub struct FillMarketCapsArgs {
    /// Maximum rows to process this run (default: all)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Updates buffered per upsert request (1-10000)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

pub async fn run(
    args: &FillMarketCapsArgs,
    store: &dyn Store,
    config: &Config,
    cancel: &CancellationToken,
    format: &OutputFormat,
) -> Result<()> {
    let quotes = RemoteQuoteClient::from_config(config)?;
    let options = FillOptions {
        limit: args.limit,
        chunk_size: args.chunk_size,
    };
    let progress = BarProgress::new("fetching market caps...");

    let summary = fill_market_caps(store, &quotes, cancel, &options, &progress).await?;
    output::print_fill_summary(&summary, &quotes.tracker_summaries(), format);

    if summary.report.failed() > 0 {
        bail!("{} rows could not be written", summary.report.failed());
    }
    Ok(())
}
