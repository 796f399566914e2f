//! The `merge-listings` subcommand.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use stocksync_lib::upsert::DEFAULT_CHUNK_SIZE;
use stocksync_lib::{merge_listings, Store};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct MergeListingsArgs {
    /// JSON listing file: [{symbol, name, sector, industry, market_cap}]
    #[arg(long)]
    pub file: PathBuf,

    /// Exchange name written with every listed row
    #[arg(long)]
    pub exchange: String,

    /// Rows per upsert request (1-10000)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

pub async fn run(args: &MergeListingsArgs, store: &dyn Store, format: &OutputFormat) -> Result<()> {
    let summary = merge_listings(store, &args.file, &args.exchange, args.chunk_size).await?;
    output::print_merge_summary(&summary, format);

    let failed = summary.insert_report.failed() + summary.update_report.failed();
    if failed > 0 {
        bail!("{} rows could not be written", failed);
    }
    Ok(())
}
