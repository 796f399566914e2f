//! Local SQLite store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};

use super::{conflict_columns, validate_identifier, Order, Row, SelectQuery, Store, StoreError};
use crate::upsert::ConflictPolicy;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates the tables if they do not exist yet.
    pub fn init(&self) -> Result<(), StoreError> {
        let schema = include_str!("../../../schema/sqlite.sql");
        self.lock().execute_batch(schema)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another call panicked mid-statement;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn select_sql(table: &str, query: &SelectQuery) -> Result<String, StoreError> {
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|c| validate_identifier(c))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, validate_identifier(table)?);
        if !query.filters.is_empty() {
            let clauses = query
                .filters
                .iter()
                .map(|(column, value)| {
                    let column = validate_identifier(column)?;
                    Ok(if value.is_null() {
                        format!("{} IS NULL", column)
                    } else {
                        format!("{} = ?", column)
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some((column, order)) = &query.order {
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}", validate_identifier(column)?, dir));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(sql)
    }

    fn upsert_sql(
        table: &str,
        columns: &[&str],
        conflict: &ConflictPolicy,
    ) -> Result<String, StoreError> {
        let table = validate_identifier(table)?;
        let target = conflict_columns(conflict)?;
        for column in columns {
            validate_identifier(column)?;
        }
        let placeholders = vec!["?"; columns.len()].join(", ");

        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !target.contains(c))
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect();
        let action = match conflict {
            ConflictPolicy::UpdateOnConflict { .. } if !updates.is_empty() => {
                format!("DO UPDATE SET {}", updates.join(", "))
            }
            _ => "DO NOTHING".to_string(),
        };

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
            table,
            columns.join(", "),
            placeholders,
            target.join(", "),
            action
        ))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        let sql = Self::select_sql(table, query)?;
        let bound = query
            .filters
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(column, value)| to_sql(column, value))
            .collect::<Result<Vec<_>, _>>()?;

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(bound))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in names.iter().enumerate() {
                map.insert(name.clone(), from_sql(name, row.get_ref(i)?)?);
            }
            out.push(map);
        }
        Ok(out)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict: &ConflictPolicy,
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for row in rows {
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            let sql = Self::upsert_sql(table, &columns, conflict)?;
            let values = row
                .iter()
                .map(|(column, value)| to_sql(column, value))
                .collect::<Result<Vec<_>, _>>()?;
            tx.prepare_cached(&sql)?.execute(params_from_iter(values))?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn to_sql(column: &str, value: &Value) -> Result<SqlValue, StoreError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(StoreError::UnsupportedValue {
                    column: column.to_string(),
                })
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(StoreError::UnsupportedValue {
            column: column.to_string(),
        }),
    }
}

fn from_sql(column: &str, value: ValueRef<'_>) -> Result<Value, StoreError> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::from(i)),
        ValueRef::Real(f) => Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)),
        ValueRef::Text(bytes) => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(StoreError::UnsupportedValue {
            column: column.to_string(),
        }),
    }
}
