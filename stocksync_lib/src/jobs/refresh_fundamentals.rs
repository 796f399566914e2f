//! Refresh `stock_metrics` and quarterly `stock_fundamentals` for every row
//! of `stocks`.
//!
//! Metrics go stale after [`METRICS_TTL`], fundamentals after
//! [`FUNDAMENTALS_TTL`]. A stock with nothing stale is not fetched.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{parse_timestamp, ItemPhase, ItemState, JobError, Progress};
use crate::quote::{QuarterlyFundamentals, QuoteRecord, RemoteQuoteClient};
use crate::reconcile::{always, classify, EntityId, Keyed, Snapshot};
use crate::retry::jittered;
use crate::store::{Order, SelectQuery, Store};
use crate::upsert::{BatchReport, BatchUpserter, ConflictPolicy};

const STOCKS: &str = "stocks";
const METRICS: &str = "stock_metrics";
const FUNDAMENTALS: &str = "stock_fundamentals";

pub const METRICS_TTL: Duration = Duration::from_secs(15 * 60);
pub const FUNDAMENTALS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Rows differ in which columns they carry once nulls are dropped, so each
/// row is written on its own.
const ROW_CHUNK: usize = 1;

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub limit: Option<usize>,
    pub metrics_ttl: Duration,
    pub fundamentals_ttl: Duration,
    /// Pause between fetched stocks, plus up to `item_jitter`.
    pub item_delay: Duration,
    pub item_jitter: Duration,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            limit: None,
            metrics_ttl: METRICS_TTL,
            fundamentals_ttl: FUNDAMENTALS_TTL,
            item_delay: Duration::from_secs(3),
            item_jitter: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub stocks: usize,
    /// Stocks with nothing stale.
    pub fresh: usize,
    pub refreshed: usize,
    pub fetch_failed: usize,
    /// Stocks skipped because a store read or write failed mid-item.
    pub item_failed: usize,
    pub quarters_inserted: usize,
    pub quarters_updated: usize,
    pub cancelled: bool,
    pub metrics_report: BatchReport,
    pub fundamentals_report: BatchReport,
}

#[derive(Debug, Clone, Serialize)]
struct MetricsRow {
    metric_id: String,
    stock_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_cap: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pe_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ps_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debt_to_equity_ratio: Option<Decimal>,
    updated_at: String,
}

impl MetricsRow {
    fn from_record(record: &QuoteRecord, now: DateTime<Utc>) -> Self {
        Self {
            metric_id: format!("{}_{}", record.symbol, now.to_rfc3339()),
            stock_id: record.symbol.clone(),
            current_price: Some(record.price),
            market_cap: record.market_cap,
            pe_ratio: record.ratios.pe,
            ps_ratio: record.ratios.ps,
            debt_to_equity_ratio: record.ratios.debt_to_equity,
            updated_at: now.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FundamentalsRow {
    #[serde(skip)]
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<EntityId>,
    stock_id: String,
    period_type: &'static str,
    quarter: u32,
    year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    revenue: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expenses: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assets: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    liabilities: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operating_cashflow: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    investing_cashflow: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    financing_cashflow: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pe_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ps_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    roe: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debt_to_equity: Option<Decimal>,
    created_at: String,
}

impl FundamentalsRow {
    fn from_quarter(record: &QuoteRecord, q: &QuarterlyFundamentals, now: DateTime<Utc>) -> Self {
        Self {
            key: format!("{}:{}:{}", record.symbol, q.quarter(), q.year()),
            id: None,
            stock_id: record.symbol.clone(),
            period_type: "QUARTER",
            quarter: q.quarter(),
            year: q.year(),
            revenue: q.revenue,
            expenses: q.expenses,
            profit: q.profit,
            assets: q.assets,
            liabilities: q.liabilities,
            operating_cashflow: q.operating_cashflow,
            investing_cashflow: q.investing_cashflow,
            financing_cashflow: q.financing_cashflow,
            pe_ratio: record.ratios.pe,
            ps_ratio: record.ratios.ps,
            roe: record.ratios.roe,
            debt_to_equity: record.ratios.debt_to_equity,
            created_at: now.to_rfc3339(),
        }
    }
}

impl Keyed for FundamentalsRow {
    fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Staleness {
    metrics: bool,
    fundamentals: bool,
}

fn is_stale(last: Option<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(ts) => match (now - ts).to_std() {
            Ok(age) => age > ttl,
            // Timestamp in the future.
            Err(_) => false,
        },
    }
}

async fn latest_timestamp(
    store: &dyn Store,
    table: &str,
    column: &str,
    ticker: &str,
) -> Result<Option<DateTime<Utc>>, JobError> {
    let rows = store
        .select(
            table,
            &SelectQuery::new()
                .columns(&[column])
                .eq("stock_id", ticker)
                .order_by(column, Order::Desc)
                .limit(1),
        )
        .await?;
    Ok(rows
        .first()
        .and_then(|row| row.get(column))
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp))
}

async fn staleness(
    store: &dyn Store,
    ticker: &str,
    options: &RefreshOptions,
    now: DateTime<Utc>,
) -> Result<Staleness, JobError> {
    let metrics = latest_timestamp(store, METRICS, "updated_at", ticker).await?;
    let fundamentals = latest_timestamp(store, FUNDAMENTALS, "created_at", ticker).await?;
    Ok(Staleness {
        metrics: is_stale(metrics, options.metrics_ttl, now),
        fundamentals: is_stale(fundamentals, options.fundamentals_ttl, now),
    })
}

enum ItemOutcome {
    Refreshed,
    FetchFailed,
}

/// Fetches one stale stock and writes its metrics and quarters. Written rows
/// are added to `summary` as they land, so a later error keeps them counted.
async fn refresh_item(
    store: &dyn Store,
    upserter: &BatchUpserter<'_>,
    quotes: &RemoteQuoteClient,
    ticker: &str,
    stale: Staleness,
    now: DateTime<Utc>,
    summary: &mut RefreshSummary,
) -> Result<ItemOutcome, JobError> {
    let mut state = ItemState::new(ticker);
    state.advance(ItemPhase::Fetching);
    tracing::info!(
        "Refreshing {} (metrics stale: {}, fundamentals stale: {})",
        ticker,
        stale.metrics,
        stale.fundamentals
    );
    let record = match quotes.fetch(ticker).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("Skipping {}: {}", ticker, e);
            return Ok(ItemOutcome::FetchFailed);
        }
    };

    state.advance(ItemPhase::Reconciling);
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    if stale.fundamentals && !record.quarters.is_empty() {
        let existing = store
            .select(
                FUNDAMENTALS,
                &SelectQuery::new()
                    .columns(&["id", "stock_id", "quarter", "year"])
                    .eq("stock_id", ticker)
                    .order_by("id", Order::Asc),
            )
            .await?;
        let snapshot = Snapshot::from_rows(&existing, "id", &["stock_id", "quarter", "year"], None)?;
        let quarters = record
            .quarters
            .iter()
            .map(|q| FundamentalsRow::from_quarter(&record, q, now));
        let classification = classify(quarters, &snapshot, always);
        inserts = classification.to_insert;
        updates = classification
            .to_update
            .into_iter()
            .map(|pending| FundamentalsRow {
                id: Some(pending.id),
                ..pending.record
            })
            .collect();
    }

    state.advance(ItemPhase::Writing);
    if stale.metrics {
        let report = upserter
            .upsert_all(
                METRICS,
                &[MetricsRow::from_record(&record, now)],
                ROW_CHUNK,
                &ConflictPolicy::update_on("stock_id"),
            )
            .await?;
        summary.metrics_report.append(report);
    }
    let inserted = upserter
        .upsert_all(
            FUNDAMENTALS,
            &inserts,
            ROW_CHUNK,
            &ConflictPolicy::ignore_duplicates("stock_id,quarter,year"),
        )
        .await?;
    summary.quarters_inserted += inserted.written();
    summary.fundamentals_report.append(inserted);
    let updated = upserter
        .upsert_all(FUNDAMENTALS, &updates, ROW_CHUNK, &ConflictPolicy::update_on("id"))
        .await?;
    summary.quarters_updated += updated.written();
    summary.fundamentals_report.append(updated);

    state.advance(ItemPhase::Done);
    Ok(ItemOutcome::Refreshed)
}

/// Refreshes stale metrics and fundamentals, one stock at a time.
///
/// Only the initial `stocks` read can fail the run. A store error while
/// handling one stock is logged, counted in `item_failed`, and the run moves
/// on to the next stock.
pub async fn refresh_fundamentals(
    store: &dyn Store,
    quotes: &RemoteQuoteClient,
    cancel: &CancellationToken,
    options: &RefreshOptions,
    progress: &dyn Progress,
) -> Result<RefreshSummary, JobError> {
    let rows = store
        .select(STOCKS, &SelectQuery::new().columns(&["ticker"]).order_by("ticker", Order::Asc))
        .await?;
    let tickers: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("ticker").and_then(|v| v.as_str()))
        .map(str::to_string)
        .take(options.limit.unwrap_or(usize::MAX))
        .collect();

    let mut summary = RefreshSummary {
        stocks: tickers.len(),
        ..Default::default()
    };
    tracing::info!("Checking {} stocks for stale data", tickers.len());

    let upserter = BatchUpserter::new(store);
    let mut paced = false;
    progress.start(tickers.len() as u64);

    for ticker in &tickers {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let now = Utc::now();
        let stale = match staleness(store, ticker, options, now).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", ticker, e);
                summary.item_failed += 1;
                progress.advance(ticker);
                continue;
            }
        };
        if !stale.metrics && !stale.fundamentals {
            tracing::debug!("{}: metrics and fundamentals are fresh", ticker);
            summary.fresh += 1;
            progress.advance(ticker);
            continue;
        }

        if paced {
            let delay = jittered(options.item_delay, options.item_jitter);
            tokio::select! {
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        paced = true;

        match refresh_item(store, &upserter, quotes, ticker, stale, now, &mut summary).await {
            Ok(ItemOutcome::Refreshed) => summary.refreshed += 1,
            Ok(ItemOutcome::FetchFailed) => summary.fetch_failed += 1,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", ticker, e);
                summary.item_failed += 1;
            }
        }
        progress.advance(ticker);
    }

    progress.finish();
    Ok(summary)
}
