//! Chunked, failure-isolated writes through the [`Store`].

use serde::Serialize;
use serde_json::Value;

use crate::store::{Row, Store};

/// Default rows per upsert call.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// How the store resolves a row that collides with an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the stored row; `key` is the unique natural key (comma-separated
    /// for a composite key).
    IgnoreDuplicates { key: String },
    /// Overwrite the stored row matched on `column`.
    UpdateOnConflict { column: String },
}

impl ConflictPolicy {
    pub fn ignore_duplicates(key: &str) -> Self {
        Self::IgnoreDuplicates {
            key: key.to_string(),
        }
    }

    pub fn update_on(column: &str) -> Self {
        Self::UpdateOnConflict {
            column: column.to_string(),
        }
    }

    /// Conflict target column list.
    pub fn target(&self) -> &str {
        match self {
            Self::IgnoreDuplicates { key } => key,
            Self::UpdateOnConflict { column } => column,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UpsertError {
    #[error("chunk size must be at least 1, got {0}")]
    InvalidChunkSize(usize),
    #[error("record {index} did not serialize to a JSON object")]
    NotAnObject { index: usize },
    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of one chunk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub chunks: Vec<ChunkOutcome>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rows in chunks that were written.
    pub fn written(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.error.is_none())
            .map(|c| c.count)
            .sum()
    }

    /// Rows in chunks that failed.
    pub fn failed(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.error.is_some())
            .map(|c| c.count)
            .sum()
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks.iter().filter(|c| c.error.is_some())
    }

    /// Appends another report's chunks, renumbering them after ours.
    pub fn append(&mut self, other: BatchReport) {
        let offset = self.chunks.len();
        self.chunks.extend(other.chunks.into_iter().map(|mut c| {
            c.chunk_index += offset;
            c
        }));
    }
}

pub struct BatchUpserter<'a> {
    store: &'a dyn Store,
}

impl<'a> BatchUpserter<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Writes `records` in consecutive chunks of at most `chunk_size`, one
    /// store upsert per chunk. A failed chunk is logged and recorded; later
    /// chunks are still attempted.
    pub async fn upsert_all<R: Serialize>(
        &self,
        table: &str,
        records: &[R],
        chunk_size: usize,
        conflict: &ConflictPolicy,
    ) -> Result<BatchReport, UpsertError> {
        if chunk_size == 0 {
            return Err(UpsertError::InvalidChunkSize(chunk_size));
        }

        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| match serde_json::to_value(record)? {
                Value::Object(map) => Ok(map),
                _ => Err(UpsertError::NotAnObject { index }),
            })
            .collect::<Result<Vec<Row>, UpsertError>>()?;

        let total = rows.len().div_ceil(chunk_size);
        let mut report = BatchReport::default();

        for (chunk_index, chunk) in rows.chunks(chunk_size).enumerate() {
            let error = match self.store.upsert(table, chunk, conflict).await {
                Ok(()) => {
                    tracing::info!(
                        "Upserted batch {}/{} into {} ({} rows)",
                        chunk_index + 1,
                        total,
                        table,
                        chunk.len()
                    );
                    None
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to upsert batch {}/{} into {} ({} rows): {}",
                        chunk_index + 1,
                        total,
                        table,
                        chunk.len(),
                        e
                    );
                    Some(e.to_string())
                }
            };
            report.chunks.push(ChunkOutcome {
                chunk_index,
                count: chunk.len(),
                error,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SelectQuery, StoreError};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every upsert call; fails the calls whose index is in `fail_on`.
    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<(String, usize, ConflictPolicy)>>,
        fail_on: HashSet<usize>,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn select(&self, _table: &str, _query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
            Ok(Vec::new())
        }

        async fn upsert(
            &self,
            table: &str,
            rows: &[Row],
            conflict: &ConflictPolicy,
        ) -> Result<(), StoreError> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push((table.to_string(), rows.len(), conflict.clone()));
            if self.fail_on.contains(&index) {
                return Err(StoreError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Serialize)]
    struct Item {
        ticker: String,
    }

    fn items(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| Item {
                ticker: format!("T{}", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let store = RecordingStore::default();
        let report = BatchUpserter::new(&store)
            .upsert_all::<Item>("stocks_search", &[], DEFAULT_CHUNK_SIZE, &ConflictPolicy::update_on("id"))
            .await
            .unwrap();
        assert!(report.is_empty());
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn splits_into_consecutive_chunks() {
        let store = RecordingStore::default();
        let conflict = ConflictPolicy::ignore_duplicates("ticker");
        let report = BatchUpserter::new(&store)
            .upsert_all("stocks_search", &items(1500), 1000, &conflict)
            .await
            .unwrap();

        let calls = store.calls.lock().unwrap();
        let sizes: Vec<usize> = calls.iter().map(|(_, n, _)| *n).collect();
        assert_eq!(sizes, vec![1000, 500]);
        assert!(calls.iter().all(|(t, _, c)| t == "stocks_search" && *c == conflict));
        assert_eq!(report.written(), 1500);
        assert_eq!(report.chunks[1].chunk_index, 1);
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_later_chunks() {
        let store = RecordingStore {
            fail_on: [0].into_iter().collect(),
            ..Default::default()
        };
        let report = BatchUpserter::new(&store)
            .upsert_all("stocks_search", &items(5), 2, &ConflictPolicy::update_on("id"))
            .await
            .unwrap();

        assert_eq!(store.calls.lock().unwrap().len(), 3);
        assert_eq!(report.chunks.len(), 3);
        assert!(report.chunks[0].error.as_deref().unwrap().contains("boom"));
        assert!(report.chunks[1].error.is_none());
        assert!(report.chunks[2].error.is_none());
        assert_eq!(report.failed(), 2);
        assert_eq!(report.written(), 3);
        assert_eq!(report.failed_chunks().count(), 1);
    }

    #[tokio::test]
    async fn zero_chunk_size_rejected() {
        let store = RecordingStore::default();
        let err = BatchUpserter::new(&store)
            .upsert_all("stocks_search", &items(1), 0, &ConflictPolicy::update_on("id"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpsertError::InvalidChunkSize(0)));
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_object_records_rejected_before_writing() {
        let store = RecordingStore::default();
        let err = BatchUpserter::new(&store)
            .upsert_all("stocks_search", &[1, 2], 10, &ConflictPolicy::update_on("id"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpsertError::NotAnObject { index: 0 }));
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn append_renumbers_chunks() {
        let mut a = BatchReport {
            chunks: vec![ChunkOutcome { chunk_index: 0, count: 2, error: None }],
        };
        let b = BatchReport {
            chunks: vec![
                ChunkOutcome { chunk_index: 0, count: 1, error: Some("x".into()) },
                ChunkOutcome { chunk_index: 1, count: 4, error: None },
            ],
        };
        a.append(b);
        let indices: Vec<usize> = a.chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(a.written(), 6);
        assert_eq!(a.failed(), 1);
    }
}
