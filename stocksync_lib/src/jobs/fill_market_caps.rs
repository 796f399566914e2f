//! Fill missing market caps in `stocks_search` from live quotes.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{ItemPhase, ItemState, JobError, Progress};
use crate::quote::RemoteQuoteClient;
use crate::reconcile::{decide, market_cap_missing, EntityId, ReconciliationDecision, Snapshot};
use crate::store::{Order, SelectQuery, Store};
use crate::upsert::{BatchReport, BatchUpserter, ConflictPolicy, DEFAULT_CHUNK_SIZE};
use crate::validation::validate_chunk_size;

const TABLE: &str = "stocks_search";

#[derive(Debug, Clone)]
pub struct FillOptions {
    /// Stop after this many candidates.
    pub limit: Option<usize>,
    /// Updates buffered before a write.
    pub chunk_size: usize,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            limit: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FillSummary {
    /// Rows with a null or zero market cap at start.
    pub candidates: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    /// Fetched, but the provider reported no market cap.
    pub no_market_cap: usize,
    pub updated: usize,
    pub cancelled: bool,
    pub report: BatchReport,
}

#[derive(Debug, Clone, Serialize)]
struct MarketCapUpdate {
    id: EntityId,
    ticker: String,
    market_cap: Decimal,
}

/// Fetches each row whose market cap is null or zero and writes the fetched
/// market cap back by id.
pub async fn fill_market_caps(
    store: &dyn Store,
    quotes: &RemoteQuoteClient,
    cancel: &CancellationToken,
    options: &FillOptions,
    progress: &dyn Progress,
) -> Result<FillSummary, JobError> {
    let chunk_size = validate_chunk_size(options.chunk_size)?;
    let rows = store
        .select(
            TABLE,
            &SelectQuery::new()
                .columns(&["id", "ticker", "market_cap"])
                .order_by("id", Order::Asc),
        )
        .await?;
    let snapshot = Snapshot::from_rows(&rows, "id", &["ticker"], Some("market_cap"))?;

    let candidates: Vec<String> = snapshot
        .iter()
        .filter(|entry| market_cap_missing(entry))
        .map(|entry| entry.key.clone())
        .take(options.limit.unwrap_or(usize::MAX))
        .collect();

    let mut summary = FillSummary {
        candidates: candidates.len(),
        ..Default::default()
    };
    tracing::info!(
        "{} of {} rows in {} need a market cap",
        candidates.len(),
        snapshot.len(),
        TABLE
    );

    let upserter = BatchUpserter::new(store);
    let conflict = ConflictPolicy::update_on("id");
    let mut pending: Vec<MarketCapUpdate> = Vec::new();
    progress.start(candidates.len() as u64);

    for ticker in &candidates {
        if cancel.is_cancelled() {
            tracing::warn!("Cancelled; stopping before {}", ticker);
            summary.cancelled = true;
            break;
        }
        let mut state = ItemState::new(ticker);

        state.advance(ItemPhase::Fetching);
        let record = match quotes.fetch(ticker).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", ticker, e);
                summary.fetch_failed += 1;
                progress.advance(ticker);
                continue;
            }
        };
        summary.fetched += 1;

        state.advance(ItemPhase::Reconciling);
        let Some(market_cap) = record.market_cap else {
            tracing::warn!("No market cap reported for {} by {}", ticker, record.source);
            summary.no_market_cap += 1;
            progress.advance(ticker);
            continue;
        };
        match decide(&record, &snapshot, market_cap_missing) {
            ReconciliationDecision::Update(id) => {
                state.advance(ItemPhase::Writing);
                pending.push(MarketCapUpdate {
                    id,
                    ticker: ticker.clone(),
                    market_cap,
                });
                if pending.len() >= chunk_size {
                    flush(&upserter, &mut pending, chunk_size, &conflict, &mut summary.report).await?;
                }
            }
            decision => {
                tracing::debug!("{}: nothing to write ({:?})", ticker, decision);
            }
        }

        state.advance(ItemPhase::Done);
        progress.advance(ticker);
    }

    flush(&upserter, &mut pending, chunk_size, &conflict, &mut summary.report).await?;
    progress.finish();
    summary.updated = summary.report.written();
    Ok(summary)
}

async fn flush(
    upserter: &BatchUpserter<'_>,
    pending: &mut Vec<MarketCapUpdate>,
    chunk_size: usize,
    conflict: &ConflictPolicy,
    report: &mut BatchReport,
) -> Result<(), JobError> {
    if pending.is_empty() {
        return Ok(());
    }
    let batch = upserter.upsert_all(TABLE, pending.as_slice(), chunk_size, conflict).await?;
    report.append(batch);
    pending.clear();
    Ok(())
}
