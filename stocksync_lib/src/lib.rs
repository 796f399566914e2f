//! Library layer for stocksync: provider fallback, retry with rate-limit
//! cool-off, reconciliation against stored rows, and chunked upserts.
//!
//! Wraps the `stocksync_api` clients with retry/pacing, normalizes their
//! responses into [`QuoteRecord`]s, and writes them through a [`Store`].

pub mod config;
pub mod error;
pub mod jobs;
pub mod quote;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod upsert;
pub mod validation;

pub use stocksync_api;

pub use config::{Config, ConfigError, SupabaseConfig};
pub use error::StockSyncError;
pub use jobs::{
    fill_market_caps, merge_listings, refresh_fundamentals, FillOptions, FillSummary, ItemPhase,
    JobError, MergeSummary, NoProgress, Progress, RefreshOptions, RefreshSummary,
};
pub use quote::{
    FetchError, PartialDataPolicy, Provider, QuoteRecord, QuoteSource, RemoteQuoteClient,
};
pub use reconcile::{
    classify, decide, Classification, EntityId, ReconciliationDecision, Snapshot, StoredEntityRef,
};
pub use retry::{Pacer, RequestTracker, Retrier, RetryPolicy, TrackerSummary};
pub use store::{RestStore, SqliteStore, Store, StoreError};
pub use upsert::{BatchReport, BatchUpserter, ChunkOutcome, ConflictPolicy, UpsertError};
