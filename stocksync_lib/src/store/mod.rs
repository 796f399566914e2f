//! Relational store collaborator.
//!
//! Jobs talk to storage only through the [`Store`] trait, passed in
//! explicitly. Two implementations: [`RestStore`] for a hosted PostgREST
//! endpoint and [`SqliteStore`] for a local database file.

pub mod rest;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::upsert::ConflictPolicy;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// One row as column -> JSON value.
pub type Row = serde_json::Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode store response: {0}")]
    Decode(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("unsupported value in column '{column}'")]
    UnsupportedValue { column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Columns, equality filters, optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    /// Empty selects every column.
    pub columns: Vec<String>,
    pub filters: Vec<(String, Value)>,
    pub order: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError>;

    /// Idempotent bulk write.
    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict: &ConflictPolicy,
    ) -> Result<(), StoreError>;
}

/// Table and column names are interpolated into SQL and URLs, so only plain
/// identifiers are accepted.
pub(crate) fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid && name.len() <= 63 {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Splits and validates a comma-separated conflict target.
pub(crate) fn conflict_columns(conflict: &ConflictPolicy) -> Result<Vec<&str>, StoreError> {
    conflict
        .target()
        .split(',')
        .map(|c| validate_identifier(c.trim()))
        .collect()
}
