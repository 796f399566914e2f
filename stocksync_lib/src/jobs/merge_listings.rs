//! Merge an exchange listing file into `stocks_search`.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::JobError;
use crate::quote::decimal_from_json;
use crate::reconcile::{classify, market_cap_is_null, EntityId, Keyed, Snapshot};
use crate::store::{Order, SelectQuery, Store};
use crate::upsert::{BatchReport, BatchUpserter, ConflictPolicy};
use crate::validation::{validate_chunk_size, validate_exchange, validate_symbol};

const TABLE: &str = "stocks_search";

/// One entry of a listing file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListingEntry {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    /// A number, a numeric string, or a placeholder such as `"N/A"`.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub market_cap: Option<Decimal>,
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_json))
}

/// A `stocks_search` row as written.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct ListingRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<EntityId>,
    ticker: String,
    company_name: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    market_cap: Option<Decimal>,
    exchange: String,
}

impl Keyed for ListingRow {
    fn key(&self) -> &str {
        &self.ticker
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeSummary {
    /// Entries in the listing file.
    pub listed: usize,
    /// Entries dropped for an unusable symbol.
    pub invalid: usize,
    /// Rows already in the table before the merge.
    pub existing: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub insert_report: BatchReport,
    pub update_report: BatchReport,
}

/// Reads a JSON listing file.
pub fn read_listing(path: &Path) -> Result<Vec<ListingEntry>, JobError> {
    let content = std::fs::read_to_string(path).map_err(|source| JobError::ReadListing {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| JobError::ParseListing {
        path: path.to_path_buf(),
        source,
    })
}

/// Inserts listed tickers missing from `stocks_search` and fills in rows whose
/// market cap is still null.
pub async fn merge_listings(
    store: &dyn Store,
    path: &Path,
    exchange: &str,
    chunk_size: usize,
) -> Result<MergeSummary, JobError> {
    let exchange = validate_exchange(exchange)?;
    let chunk_size = validate_chunk_size(chunk_size)?;
    let entries = read_listing(path)?;
    tracing::info!("Read {} listings from {}", entries.len(), path.display());

    let mut summary = MergeSummary {
        listed: entries.len(),
        ..Default::default()
    };

    let rows: Vec<ListingRow> = entries
        .into_iter()
        .filter_map(|entry| match validate_symbol(&entry.symbol) {
            Ok(ticker) => Some(ListingRow {
                id: None,
                ticker,
                company_name: entry.name,
                sector: entry.sector,
                industry: entry.industry,
                market_cap: entry.market_cap,
                exchange: exchange.clone(),
            }),
            Err(e) => {
                tracing::warn!("Skipping listing entry '{}': {}", entry.symbol, e);
                summary.invalid += 1;
                None
            }
        })
        .collect();

    let stored = store
        .select(
            TABLE,
            &SelectQuery::new()
                .columns(&["id", "ticker", "market_cap"])
                .order_by("id", Order::Asc),
        )
        .await?;
    let snapshot = Snapshot::from_rows(&stored, "id", &["ticker"], Some("market_cap"))?;
    summary.existing = snapshot.len();
    tracing::info!("Found {} existing rows in {}", snapshot.len(), TABLE);

    let classification = classify(rows, &snapshot, market_cap_is_null);
    summary.skipped = classification.skipped;
    let updates: Vec<ListingRow> = classification
        .to_update
        .into_iter()
        .map(|pending| ListingRow {
            id: Some(pending.id),
            ..pending.record
        })
        .collect();
    tracing::info!(
        "{} new tickers, {} rows to update, {} unchanged",
        classification.to_insert.len(),
        updates.len(),
        summary.skipped
    );

    let upserter = BatchUpserter::new(store);
    summary.insert_report = upserter
        .upsert_all(
            TABLE,
            &classification.to_insert,
            chunk_size,
            &ConflictPolicy::ignore_duplicates("ticker"),
        )
        .await?;
    summary.update_report = upserter
        .upsert_all(TABLE, &updates, chunk_size, &ConflictPolicy::update_on("id"))
        .await?;
    summary.inserted = summary.insert_report.written();
    summary.updated = summary.update_report.written();

    Ok(summary)
}
