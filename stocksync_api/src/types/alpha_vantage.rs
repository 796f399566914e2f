//! Alpha Vantage response schemas.
//!
//! Alpha Vantage encodes every number as a string and uses `"None"` or `"-"`
//! for missing values, so report fields stay `Option<String>` here and are
//! parsed when mapped into records.

use serde::{Deserialize, Serialize};

/// Status messages Alpha Vantage embeds in otherwise successful (HTTP 200)
/// bodies. Present on every endpoint.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct ApiNotice {
    #[serde(rename = "Note", default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "Information", default, skip_serializing_if = "Option::is_none")]
    pub information: Option<String>,
    #[serde(rename = "Error Message", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ApiNotice {
    /// True when the body is a throttle message rather than data.
    pub fn is_throttled(&self) -> bool {
        [&self.note, &self.information]
            .into_iter()
            .flatten()
            .any(|msg| is_throttle_message(msg))
    }
}

/// Matches the "call frequency" wording Alpha Vantage uses for throttling.
pub fn is_throttle_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("api call frequency") || lower.contains("rate limit")
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct OverviewResponse {
    #[serde(rename = "Symbol", default)]
    pub symbol: Option<String>,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Sector", default)]
    pub sector: Option<String>,
    #[serde(rename = "Industry", default)]
    pub industry: Option<String>,
    #[serde(rename = "MarketCapitalization", default)]
    pub market_capitalization: Option<String>,
    #[serde(rename = "PERatio", default)]
    pub pe_ratio: Option<String>,
    #[serde(rename = "PriceToSalesRatioTTM", default)]
    pub price_to_sales_ttm: Option<String>,
    #[serde(rename = "ReturnOnEquityTTM", default)]
    pub return_on_equity_ttm: Option<String>,
    #[serde(rename = "DebtToEquityRatio", default)]
    pub debt_to_equity: Option<String>,
    #[serde(flatten)]
    pub notice: ApiNotice,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    pub global_quote: Option<GlobalQuote>,
    #[serde(flatten)]
    pub notice: ApiNotice,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct GlobalQuote {
    #[serde(rename = "01. symbol", default)]
    pub symbol: Option<String>,
    #[serde(rename = "05. price", default)]
    pub price: Option<String>,
    #[serde(rename = "06. volume", default)]
    pub volume: Option<String>,
    #[serde(rename = "07. latest trading day", default)]
    pub latest_trading_day: Option<String>,
}

/// Shared shape of the INCOME_STATEMENT, BALANCE_SHEET and CASH_FLOW bodies.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse<R> {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default = "Vec::new")]
    pub annual_reports: Vec<R>,
    #[serde(default = "Vec::new")]
    pub quarterly_reports: Vec<R>,
    #[serde(flatten)]
    pub notice: ApiNotice,
}

pub type IncomeStatementResponse = StatementResponse<IncomeReport>;
pub type BalanceSheetResponse = StatementResponse<BalanceReport>;
pub type CashFlowResponse = StatementResponse<CashFlowReport>;

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IncomeReport {
    #[serde(default)]
    pub fiscal_date_ending: Option<String>,
    #[serde(default)]
    pub total_revenue: Option<String>,
    #[serde(default)]
    pub gross_profit: Option<String>,
    #[serde(default)]
    pub net_income: Option<String>,
    #[serde(default, alias = "operatingExpenses")]
    pub total_expenses: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    #[serde(default)]
    pub fiscal_date_ending: Option<String>,
    #[serde(default)]
    pub total_assets: Option<String>,
    #[serde(default)]
    pub total_liabilities: Option<String>,
    #[serde(default)]
    pub total_shareholder_equity: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowReport {
    #[serde(default)]
    pub fiscal_date_ending: Option<String>,
    #[serde(default)]
    pub operating_cashflow: Option<String>,
    #[serde(default)]
    pub capital_expenditures: Option<String>,
    #[serde(default)]
    pub cashflow_from_investment: Option<String>,
    #[serde(default)]
    pub cashflow_from_financing: Option<String>,
}
