//! Ingestion jobs.
//!
//! Every job takes its [`Store`](crate::store::Store) and quote client as
//! arguments, processes items one at a time, and returns a summary.
//! Item-by-item jobs check a cancellation token between items and still
//! return what they completed when cancelled.

pub mod fill_market_caps;
pub mod merge_listings;
pub mod refresh_fundamentals;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::StockSyncError;
use crate::reconcile::ReconcileError;
use crate::store::StoreError;
use crate::upsert::UpsertError;

pub use fill_market_caps::{fill_market_caps, FillOptions, FillSummary};
pub use merge_listings::{merge_listings, ListingEntry, MergeSummary};
pub use refresh_fundamentals::{refresh_fundamentals, RefreshOptions, RefreshSummary};

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Upsert(#[from] UpsertError),
    #[error("failed to read listing file {}: {source}", path.display())]
    ReadListing {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid listing file {}: {source}", path.display())]
    ParseListing {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Validation(#[from] StockSyncError),
}

/// Where an item is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemPhase {
    Fetching,
    Reconciling,
    Writing,
    Done,
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemPhase::Fetching => "fetching",
            ItemPhase::Reconciling => "reconciling",
            ItemPhase::Writing => "writing",
            ItemPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Forward-only phase tracker for one item.
#[derive(Debug)]
pub struct ItemState<'a> {
    symbol: &'a str,
    phase: Option<ItemPhase>,
}

impl<'a> ItemState<'a> {
    pub fn new(symbol: &'a str) -> Self {
        Self {
            symbol,
            phase: None,
        }
    }

    pub fn phase(&self) -> Option<ItemPhase> {
        self.phase
    }

    /// Moves to `next`. Returns `false` (and stays put) if that would not be
    /// a forward move.
    pub fn advance(&mut self, next: ItemPhase) -> bool {
        if self.phase.is_some_and(|current| current >= next) {
            tracing::debug!(
                "{}: ignoring transition {:?} -> {}",
                self.symbol,
                self.phase,
                next
            );
            return false;
        }
        tracing::debug!("{}: {}", self.symbol, next);
        self.phase = Some(next);
        true
    }
}

/// Progress reporting hook for long-running jobs.
pub trait Progress: Send + Sync {
    fn start(&self, total: u64);
    fn advance(&self, symbol: &str);
    fn finish(&self);
}

/// Reports nothing.
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&self, _total: u64) {}
    fn advance(&self, _symbol: &str) {}
    fn finish(&self) {}
}

/// Parses a stored timestamp: RFC 3339, or a naive date-time taken as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
