//! HTTP client for the Yahoo Finance chart and quoteSummary endpoints.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    types::{ChartResponse, QuoteSummaryResponse, QuoteSummaryResult},
    user_agent::get_user_agent,
    Error,
};

const PROVIDER: &str = "yahoo";

/// Modules requested from quoteSummary: annual and quarterly statements plus
/// key statistics.
const SUMMARY_MODULES: &str = concat!(
    "incomeStatementHistory,balanceSheetHistory,cashflowStatementHistory,",
    "incomeStatementHistoryQuarterly,balanceSheetHistoryQuarterly,cashflowStatementHistoryQuarterly,",
    "defaultKeyStatistics"
);

/// HTTP client for the Yahoo Finance chart API.
///
/// Holds a single `reqwest::Client` (and so a single connection pool) for
/// its whole lifetime. Requests carry a browser user agent picked once at
/// construction, with a 30-second timeout.
pub struct ChartClient {
    http: reqwest::Client,
    /// Base URL for the API. Defaults to `https://query1.finance.yahoo.com`.
    base_api_url: String,
}

impl Default for ChartClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartClient {
    /// Creates a new client pointing at the production Yahoo Finance API.
    pub fn new() -> Self {
        Self::with_base_url("https://query1.finance.yahoo.com")
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self {
            http,
            base_api_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_api_url).map_err(|e| {
            tracing::error!("Invalid base URL {}: {}", self.base_api_url, e);
            Error::RequestFailed(e.to_string())
        })?;
        url.path_segments_mut()
            .map_err(|_| Error::RequestFailed("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T>(&self, url: Url) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        tracing::debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to get resource: {}", e);
                Error::RequestFailed(e.to_string())
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            tracing::error!("Failed to read response body: {}", e);
            Error::RequestFailed(e.to_string())
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("we hit the rate limit for {}", PROVIDER);
            return Err(Error::RateLimited { provider: PROVIDER });
        }

        if !status.is_success() {
            let snippet = truncate_body(&body);
            tracing::error!("Request failed with status {}: {}", status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
            });
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse resource: {} | body: {}", e, snippet);
            Error::Malformed(e.to_string())
        })
    }

    /// Fetches the chart for a symbol (latest price and volume bars).
    pub async fn get_chart(&self, symbol: &str) -> Result<ChartResponse, Error> {
        let url = self.get_url(&["v8", "finance", "chart", symbol])?;
        let resp: ChartResponse = self.get(url).await?;
        if let Some(err) = &resp.chart.error {
            return Err(Error::Malformed(format!(
                "chart error {}: {}",
                err.code,
                err.description.as_deref().unwrap_or("")
            )));
        }
        Ok(resp)
    }

    /// Fetches statements and key statistics for a symbol.
    ///
    /// Returns the first result; an empty result list is a malformed response.
    pub async fn get_quote_summary(&self, symbol: &str) -> Result<QuoteSummaryResult, Error> {
        let mut url = self.get_url(&["v10", "finance", "quoteSummary", symbol])?;
        url.query_pairs_mut().append_pair("modules", SUMMARY_MODULES);
        let resp: QuoteSummaryResponse = self.get(url).await?;
        if let Some(err) = resp.quote_summary.error {
            return Err(Error::Malformed(format!(
                "quoteSummary error {}: {}",
                err.code,
                err.description.unwrap_or_default()
            )));
        }
        resp.quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| Error::Malformed(format!("empty quoteSummary for {}", symbol)))
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}
