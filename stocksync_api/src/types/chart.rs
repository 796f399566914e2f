//! Yahoo Finance response schemas (chart and quoteSummary endpoints).

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<YahooApiError>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct YahooApiError {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub indicators: Indicators,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub regular_market_volume: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteIndicator>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct QuoteIndicator {
    /// One entry per bar; Yahoo emits `null` for bars without trades.
    #[serde(default)]
    pub volume: Vec<Option<u64>>,
}

impl ChartResponse {
    /// The first (and in practice only) chart result.
    pub fn first_result(&self) -> Option<&ChartResult> {
        self.chart.result.as_ref().and_then(|r| r.first())
    }
}

impl ChartResult {
    /// First non-null volume bar of the first quote series.
    pub fn first_volume(&self) -> Option<u64> {
        self.indicators
            .quote
            .first()
            .and_then(|q| q.volume.iter().flatten().next().copied())
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummaryResponse {
    pub quote_summary: QuoteSummary,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QuoteSummary {
    #[serde(default)]
    pub result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    pub error: Option<YahooApiError>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummaryResult {
    #[serde(default)]
    pub default_key_statistics: Option<KeyStatistics>,
    /// Annual statements, most recent first.
    #[serde(default)]
    pub income_statement_history: Option<IncomeStatementHistory>,
    #[serde(default)]
    pub balance_sheet_history: Option<BalanceSheetHistory>,
    #[serde(default)]
    pub cashflow_statement_history: Option<CashflowStatementHistory>,
    /// Quarterly statements, most recent first.
    #[serde(default)]
    pub income_statement_history_quarterly: Option<IncomeStatementHistory>,
    #[serde(default)]
    pub balance_sheet_history_quarterly: Option<BalanceSheetHistory>,
    #[serde(default)]
    pub cashflow_statement_history_quarterly: Option<CashflowStatementHistory>,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}` and sends `{}` when
/// there is no value.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct RawValue {
    #[serde(default)]
    pub raw: Option<f64>,
}

/// Reads the raw number out of an optional wrapped value.
pub fn raw(value: &Option<RawValue>) -> Option<f64> {
    value.as_ref().and_then(|v| v.raw)
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatistics {
    #[serde(default)]
    pub shares_outstanding: Option<RawValue>,
    #[serde(default, rename = "forwardPE")]
    pub forward_pe: Option<RawValue>,
    #[serde(default)]
    pub price_to_sales_trailing12_months: Option<RawValue>,
    #[serde(default)]
    pub return_on_equity: Option<RawValue>,
    #[serde(default)]
    pub debt_to_equity: Option<RawValue>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatementHistory {
    #[serde(default)]
    pub income_statement_history: Vec<IncomeStatement>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatement {
    #[serde(default)]
    pub end_date: Option<RawValue>,
    #[serde(default)]
    pub total_revenue: Option<RawValue>,
    #[serde(default)]
    pub total_operating_expenses: Option<RawValue>,
    #[serde(default)]
    pub gross_profit: Option<RawValue>,
    #[serde(default)]
    pub net_income: Option<RawValue>,
}

impl IncomeStatement {
    /// Fiscal period end as a calendar date. `endDate.raw` is a unix timestamp.
    pub fn end_date(&self) -> Option<NaiveDate> {
        let secs = raw(&self.end_date)? as i64;
        DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheetHistory {
    #[serde(default)]
    pub balance_sheet_statements: Vec<BalanceSheetStatement>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheetStatement {
    #[serde(default)]
    pub total_assets: Option<RawValue>,
    #[serde(default, alias = "totalLiab")]
    pub total_liabilities: Option<RawValue>,
    #[serde(default)]
    pub total_stockholder_equity: Option<RawValue>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CashflowStatementHistory {
    #[serde(default)]
    pub cashflow_statements: Vec<CashflowStatement>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CashflowStatement {
    #[serde(default)]
    pub total_cash_from_operating_activities: Option<RawValue>,
    #[serde(default, alias = "totalCashflowsFromInvestingActivities")]
    pub total_cash_from_investing_activities: Option<RawValue>,
    #[serde(default)]
    pub total_cash_from_financing_activities: Option<RawValue>,
    #[serde(default)]
    pub capital_expenditures: Option<RawValue>,
}
