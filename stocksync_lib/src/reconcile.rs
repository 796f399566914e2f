//! Classifies incoming records against a snapshot of stored rows.
//!
//! A record whose natural key is absent from the snapshot is inserted. A
//! record whose key is present is updated only when the injected
//! `needs_refresh` predicate holds for the stored row; otherwise it is
//! dropped. Output lists preserve input order.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quote::{decimal_from_json, QuoteRecord};
use crate::store::Row;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("snapshot contains key '{0}' more than once")]
    DuplicateKey(String),
    #[error("snapshot row is missing column '{0}'")]
    MissingColumn(String),
    #[error("column '{column}' has unusable value {value}")]
    InvalidValue { column: String, value: String },
}

/// Store-assigned identifier: integer or string, depending on the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl EntityId {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) if !s.is_empty() => Some(EntityId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{}", i),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

/// Minimal view of a stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntityRef {
    pub id: EntityId,
    pub key: String,
    pub market_cap: Option<Decimal>,
}

/// Stored rows indexed by natural key; one entry per key.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: Vec<StoredEntityRef>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    pub fn new(refs: impl IntoIterator<Item = StoredEntityRef>) -> Result<Self, ReconcileError> {
        let mut snapshot = Snapshot::default();
        for entry in refs {
            if snapshot.index.contains_key(&entry.key) {
                return Err(ReconcileError::DuplicateKey(entry.key));
            }
            snapshot.index.insert(entry.key.clone(), snapshot.entries.len());
            snapshot.entries.push(entry);
        }
        Ok(snapshot)
    }

    /// Builds a snapshot from store rows. The key is the value of
    /// `key_columns` joined with `:` (one column for a plain natural key,
    /// several for a composite one).
    pub fn from_rows(
        rows: &[Row],
        id_column: &str,
        key_columns: &[&str],
        market_cap_column: Option<&str>,
    ) -> Result<Self, ReconcileError> {
        let refs = rows
            .iter()
            .map(|row| {
                let id_value = row
                    .get(id_column)
                    .ok_or_else(|| ReconcileError::MissingColumn(id_column.to_string()))?;
                let id = EntityId::from_json(id_value).ok_or_else(|| ReconcileError::InvalidValue {
                    column: id_column.to_string(),
                    value: id_value.to_string(),
                })?;
                let key = key_columns
                    .iter()
                    .map(|col| key_part(row, col))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(":");
                let market_cap = market_cap_column
                    .and_then(|col| row.get(col))
                    .and_then(decimal_from_json);
                Ok(StoredEntityRef { id, key, market_cap })
            })
            .collect::<Result<Vec<_>, ReconcileError>>()?;
        Snapshot::new(refs)
    }

    pub fn get(&self, key: &str) -> Option<&StoredEntityRef> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were read.
    pub fn iter(&self) -> impl Iterator<Item = &StoredEntityRef> {
        self.entries.iter()
    }
}

fn key_part(row: &Row, column: &str) -> Result<String, ReconcileError> {
    match row.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(ReconcileError::InvalidValue {
            column: column.to_string(),
            value: other.to_string(),
        }),
        None => Err(ReconcileError::MissingColumn(column.to_string())),
    }
}

/// Records with a natural key.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for QuoteRecord {
    fn key(&self) -> &str {
        &self.symbol
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationDecision {
    Insert,
    Update(EntityId),
    Skip,
}

/// A record headed for an update, tagged with the stored row's id.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate<R> {
    pub id: EntityId,
    pub record: R,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification<R> {
    pub to_insert: Vec<R>,
    pub to_update: Vec<PendingUpdate<R>>,
    /// Records dropped: predicate did not hold, or key already decided
    /// earlier in the batch.
    pub skipped: usize,
}

pub fn decide<R, P>(record: &R, snapshot: &Snapshot, needs_refresh: P) -> ReconciliationDecision
where
    R: Keyed,
    P: Fn(&StoredEntityRef) -> bool,
{
    match snapshot.get(record.key()) {
        None => ReconciliationDecision::Insert,
        Some(existing) if needs_refresh(existing) => {
            ReconciliationDecision::Update(existing.id.clone())
        }
        Some(_) => ReconciliationDecision::Skip,
    }
}

/// Partitions `incoming` into inserts, updates and drops.
///
/// Each key is decided once; later records repeating a key are skipped so
/// neither output list ever holds the same key twice.
pub fn classify<R, P>(
    incoming: impl IntoIterator<Item = R>,
    snapshot: &Snapshot,
    needs_refresh: P,
) -> Classification<R>
where
    R: Keyed,
    P: Fn(&StoredEntityRef) -> bool,
{
    let mut seen = HashSet::new();
    let mut out = Classification {
        to_insert: Vec::new(),
        to_update: Vec::new(),
        skipped: 0,
    };

    for record in incoming {
        if !seen.insert(record.key().to_string()) {
            tracing::debug!("skipping repeated key {}", record.key());
            out.skipped += 1;
            continue;
        }
        match decide(&record, snapshot, &needs_refresh) {
            ReconciliationDecision::Insert => out.to_insert.push(record),
            ReconciliationDecision::Update(id) => out.to_update.push(PendingUpdate { id, record }),
            ReconciliationDecision::Skip => out.skipped += 1,
        }
    }
    out
}

/// Refresh when the stored market cap is null.
pub fn market_cap_is_null(existing: &StoredEntityRef) -> bool {
    existing.market_cap.is_none()
}

/// Refresh when the stored market cap is null or zero.
pub fn market_cap_missing(existing: &StoredEntityRef) -> bool {
    existing.market_cap.map_or(true, |cap| cap.is_zero())
}

pub fn always(_: &StoredEntityRef) -> bool {
    true
}
