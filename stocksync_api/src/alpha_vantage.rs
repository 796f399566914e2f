//! Alpha Vantage REST client for company fundamentals.
//!
//! Every endpoint is a `GET /query?function=...&symbol=...&apikey=...`.
//! Throttling is usually signalled with HTTP 200 and a `"Note"` or
//! `"Information"` message in the body instead of a 429, so each typed call
//! inspects the embedded notice before handing back data.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::client::truncate_body;
use crate::types::{
    ApiNotice, BalanceSheetResponse, CashFlowResponse, GlobalQuoteResponse,
    IncomeStatementResponse, OverviewResponse,
};
use crate::Error;

const PROVIDER: &str = "alpha_vantage";

/// Request timeout for Alpha Vantage calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The five endpoints needed to assemble one quote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaVantageFunction {
    Overview,
    GlobalQuote,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl AlphaVantageFunction {
    pub const ALL: [AlphaVantageFunction; 5] = [
        Self::Overview,
        Self::GlobalQuote,
        Self::IncomeStatement,
        Self::BalanceSheet,
        Self::CashFlow,
    ];

    /// Value of the `function` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Overview => "OVERVIEW",
            Self::GlobalQuote => "GLOBAL_QUOTE",
            Self::IncomeStatement => "INCOME_STATEMENT",
            Self::BalanceSheet => "BALANCE_SHEET",
            Self::CashFlow => "CASH_FLOW",
        }
    }
}

impl fmt::Display for AlphaVantageFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overview => "overview",
            Self::GlobalQuote => "quote",
            Self::IncomeStatement => "income",
            Self::BalanceSheet => "balance",
            Self::CashFlow => "cashflow",
        };
        f.write_str(name)
    }
}

/// Alpha Vantage REST client.
pub struct AlphaVantageClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
    /// Create a new client with the production base URL.
    pub fn new(api_key: String) -> Result<Self, Error> {
        Self::with_base_url("https://www.alphavantage.co", api_key)
    }

    /// Create a new client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: &str, api_key: String) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::RequestFailed(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn query<T>(&self, function: AlphaVantageFunction, symbol: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/query", self.base_url);
        tracing::debug!(
            "Alpha Vantage request: {}?function={}&symbol={}&apikey=***",
            url,
            function.as_param(),
            symbol
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("function", function.as_param()),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited { provider: PROVIDER });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::RequestFailed(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        // Throttle and error notices come back with status 200; check for them
        // before decoding the typed body so they are never mistaken for data.
        let notice: ApiNotice = serde_json::from_str(&body).map_err(|e| {
            Error::Malformed(format!(
                "{} body is not a JSON object: {} | body: {}",
                function,
                e,
                truncate_body(&body)
            ))
        })?;
        check_notice(&notice)?;

        serde_json::from_str::<T>(&body).map_err(|e| {
            Error::Malformed(format!(
                "Failed to deserialize {} response: {} | body: {}",
                function,
                e,
                truncate_body(&body)
            ))
        })
    }

    /// Company overview: market capitalization and valuation ratios.
    pub async fn get_overview(&self, symbol: &str) -> Result<OverviewResponse, Error> {
        self.query(AlphaVantageFunction::Overview, symbol).await
    }

    /// Latest price and volume.
    pub async fn get_global_quote(&self, symbol: &str) -> Result<GlobalQuoteResponse, Error> {
        let resp: GlobalQuoteResponse = self.query(AlphaVantageFunction::GlobalQuote, symbol).await?;
        // Unknown symbols come back as `{"Global Quote": {}}`.
        match &resp.global_quote {
            Some(q) if q.price.is_some() => Ok(resp),
            _ => Err(Error::Malformed(format!("empty global quote for {}", symbol))),
        }
    }

    /// Annual and quarterly income statements.
    pub async fn get_income_statement(
        &self,
        symbol: &str,
    ) -> Result<IncomeStatementResponse, Error> {
        self.query(AlphaVantageFunction::IncomeStatement, symbol)
            .await
    }

    /// Annual and quarterly balance sheets.
    pub async fn get_balance_sheet(&self, symbol: &str) -> Result<BalanceSheetResponse, Error> {
        self.query(AlphaVantageFunction::BalanceSheet, symbol).await
    }

    /// Annual and quarterly cash flow statements.
    pub async fn get_cash_flow(&self, symbol: &str) -> Result<CashFlowResponse, Error> {
        self.query(AlphaVantageFunction::CashFlow, symbol).await
    }
}

fn check_notice(notice: &ApiNotice) -> Result<(), Error> {
    if notice.is_throttled() {
        tracing::warn!("Alpha Vantage API limit reached");
        return Err(Error::RateLimited { provider: PROVIDER });
    }
    if let Some(msg) = &notice.error_message {
        return Err(Error::Malformed(msg.clone()));
    }
    if let Some(msg) = &notice.information {
        tracing::warn!("Alpha Vantage info: {}", msg);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_params() {
        let params: Vec<&str> = AlphaVantageFunction::ALL
            .iter()
            .map(|f| f.as_param())
            .collect();
        assert_eq!(
            params,
            vec!["OVERVIEW", "GLOBAL_QUOTE", "INCOME_STATEMENT", "BALANCE_SHEET", "CASH_FLOW"]
        );
    }

    #[test]
    fn notice_with_frequency_note_is_rate_limited() {
        let notice = ApiNotice {
            note: Some(
                "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
                    .to_string(),
            ),
            ..Default::default()
        };
        assert!(matches!(
            check_notice(&notice),
            Err(Error::RateLimited { provider: "alpha_vantage" })
        ));
    }

    #[test]
    fn notice_with_error_message_is_malformed() {
        let notice = ApiNotice {
            error_message: Some("Invalid API call.".to_string()),
            ..Default::default()
        };
        assert!(matches!(check_notice(&notice), Err(Error::Malformed(_))));
    }

    #[test]
    fn empty_notice_passes() {
        assert!(check_notice(&ApiNotice::default()).is_ok());
    }

    #[test]
    fn client_creation_with_base_url() {
        let client = AlphaVantageClient::with_base_url("http://localhost:1234", "k".to_string());
        assert!(client.is_ok());
    }
}
