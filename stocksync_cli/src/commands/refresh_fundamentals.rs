//! The `refresh-fundamentals` subcommand.

use anyhow::{bail, Result};
use clap::Args;
use stocksync_lib::{refresh_fundamentals, Config, RefreshOptions, RemoteQuoteClient, Store};
use tokio_util::sync::CancellationToken;

use crate::output::{self, OutputFormat};
use crate::progress::BarProgress;

#[derive(Args)]
pub struct RefreshFundamentalsArgs {
    /// Maximum stocks to check this run (default: all)
    #[arg(long)]
    pub limit: Option<usize>,
}

pub async fn run(
    args: &RefreshFundamentalsArgs,
    store: &dyn Store,
    config: &Config,
    cancel: &CancellationToken,
    format: &OutputFormat,
) -> Result<()> {
    let quotes = RemoteQuoteClient::from_config(config)?;
    let options = RefreshOptions {
        limit: args.limit,
        ..Default::default()
    };
    let progress = BarProgress::new("refreshing fundamentals...");

    let summary = refresh_fundamentals(store, &quotes, cancel, &options, &progress).await?;
    output::print_refresh_summary(&summary, &quotes.tracker_summaries(), format);

    let failed = summary.metrics_report.failed() + summary.fundamentals_report.failed();
    if failed > 0 {
        bail!("{} rows could not be written", failed);
    }
    if summary.item_failed > 0 {
        bail!("{} stocks were skipped after store errors", summary.item_failed);
    }
    Ok(())
}
