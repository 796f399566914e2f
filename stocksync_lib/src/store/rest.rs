//! Hosted store over PostgREST (the REST layer Supabase exposes at
//! `/rest/v1/{table}`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use super::{conflict_columns, validate_identifier, Order, Row, SelectQuery, Store, StoreError};
use crate::upsert::ConflictPolicy;

/// Rows requested per page when a select has no explicit limit.
const PAGE_SIZE: usize = 1000;

/// Paging needs a stable row order; used when a select does not name one.
const PAGE_ORDER: &str = "id.asc";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
}

impl RestStore {
    /// `base_url` is the project URL (e.g. `https://xyz.supabase.co`); `api_key`
    /// is sent both as `apikey` and as the bearer token.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|e| StoreError::Request(format!("invalid API key header: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| StoreError::Request(format!("invalid API key header: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> Result<String, StoreError> {
        Ok(format!("{}/rest/v1/{}", self.base_url, validate_identifier(table)?))
    }

    fn select_params(query: &SelectQuery) -> Result<Vec<(String, String)>, StoreError> {
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|c| validate_identifier(c))
                .collect::<Result<Vec<_>, _>>()?
                .join(",")
        };

        let mut params = vec![("select".to_string(), columns)];
        for (column, value) in &query.filters {
            params.push((validate_identifier(column)?.to_string(), filter_value(value)));
        }
        if let Some((column, order)) = &query.order {
            let dir = match order {
                Order::Asc => "asc",
                Order::Desc => "desc",
            };
            params.push((
                "order".to_string(),
                format!("{}.{}", validate_identifier(column)?, dir),
            ));
        }
        Ok(params)
    }

    async fn fetch_page(
        &self,
        url: &str,
        params: &[(String, String)],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Row>, StoreError> {
        tracing::debug!("GET {} {:?} limit={} offset={}", url, params, limit, offset);
        let response = self
            .http
            .get(url)
            .query(params)
            .query(&[("limit", limit), ("offset", offset)])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| StoreError::Decode(format!("{} | body: {}", e, snippet(&body))))
    }
}

#[async_trait]
impl Store for RestStore {
    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        let url = self.table_url(table)?;
        let mut params = Self::select_params(query)?;

        if let Some(limit) = query.limit {
            return self.fetch_page(&url, &params, limit, 0).await;
        }

        if query.order.is_none() {
            params.push(("order".to_string(), PAGE_ORDER.to_string()));
        }
        // PostgREST caps response size; page until an empty page comes back.
        let mut rows = Vec::new();
        loop {
            let page = self.fetch_page(&url, &params, PAGE_SIZE, rows.len()).await?;
            if page.is_empty() {
                break;
            }
            rows.extend(page);
        }
        Ok(rows)
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
        let url = self.table_url(table)?;
        let on_conflict = conflict_columns(conflict)?.join(",");
        let prefer = match conflict {
            ConflictPolicy::IgnoreDuplicates { .. } => "resolution=ignore-duplicates,return=minimal",
            ConflictPolicy::UpdateOnConflict { .. } => "resolution=merge-duplicates,return=minimal",
        };

        tracing::debug!("POST {} on_conflict={} ({} rows)", url, on_conflict, rows.len());
        let response = self
            .http
            .post(&url)
            .query(&[("on_conflict", on_conflict.as_str())])
            .header("Prefer", prefer)
            .json(rows)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body: snippet(&body),
        })
    }
}

/// PostgREST equality filter operand.
fn filter_value(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{}", s),
        other => format!("eq.{}", other),
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 500;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        format!("{}...[truncated]", body.chars().take(MAX).collect::<String>())
    }
}
