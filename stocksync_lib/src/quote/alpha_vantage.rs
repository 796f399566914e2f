//! Secondary quote source: five paced Alpha Vantage sub-requests merged into
//! one record.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use stocksync_api::types::{
    BalanceReport, BalanceSheetResponse, CashFlowReport, CashFlowResponse, IncomeReport,
    IncomeStatementResponse, OverviewResponse,
};
use stocksync_api::{AlphaVantageClient, AlphaVantageFunction};

use super::error::FetchError;
use super::record::{
    parse_decimal, Financials, PartialDataPolicy, Provider, QuarterlyFundamentals, QuoteRecord,
    Ratios, StatementKind, MAX_QUARTERS,
};
use super::yahoo::fields;
use super::QuoteSource;
use crate::retry::{Pacer, Retrier, RetryPolicy, TrackerSummary};

const PROVIDER: Provider = Provider::AlphaVantage;

pub struct AlphaVantageSource {
    client: AlphaVantageClient,
    retrier: Retrier,
    pacer: Pacer,
    partial_data: PartialDataPolicy,
}

impl AlphaVantageSource {
    pub fn new(client: AlphaVantageClient, policy: RetryPolicy, partial_data: PartialDataPolicy) -> Self {
        Self {
            client,
            retrier: Retrier::new(PROVIDER.as_str(), policy),
            pacer: Pacer::new(Duration::from_secs(2), Duration::from_secs(1)),
            partial_data,
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// One paced, retried sub-request.
    async fn sub_request<T, F, Fut>(
        &self,
        symbol: &str,
        function: AlphaVantageFunction,
        op: F,
    ) -> Result<T, stocksync_api::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, stocksync_api::Error>>,
    {
        let label = format!("alpha_vantage {} {}", function, symbol);
        let max = self.retrier.policy().max_attempts;
        let pacer = &self.pacer;
        let op = &op;
        self.retrier
            .call(&label, max, move || async move {
                pacer.wait().await;
                op().await
            })
            .await
    }

    /// Applies the partial data policy to a non-mandatory sub-request.
    fn optional<T>(
        &self,
        symbol: &str,
        function: AlphaVantageFunction,
        result: Result<T, stocksync_api::Error>,
    ) -> Result<Option<T>, FetchError> {
        match (result, self.partial_data) {
            (Ok(value), _) => Ok(Some(value)),
            (Err(e), PartialDataPolicy::Reject) => Err(FetchError::PartialData {
                symbol: symbol.to_string(),
                function: function.to_string(),
                reason: e.to_string(),
            }),
            (Err(e), PartialDataPolicy::FillNulls) => {
                tracing::warn!(
                    "Alpha Vantage {} failed for {}, leaving its fields empty: {}",
                    function,
                    symbol,
                    e
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageSource {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, FetchError> {
        let client = &self.client;

        // The price quote is mandatory and goes first, so a dead symbol or an
        // exhausted quota costs one request instead of five.
        let quote = self
            .sub_request(symbol, AlphaVantageFunction::GlobalQuote, || {
                client.get_global_quote(symbol)
            })
            .await
            .map_err(|e| FetchError::from_api(PROVIDER, e))?;

        let overview = self
            .sub_request(symbol, AlphaVantageFunction::Overview, || client.get_overview(symbol))
            .await;
        let overview = self.optional(symbol, AlphaVantageFunction::Overview, overview)?;

        let income = self
            .sub_request(symbol, AlphaVantageFunction::IncomeStatement, || {
                client.get_income_statement(symbol)
            })
            .await;
        let income = self.optional(symbol, AlphaVantageFunction::IncomeStatement, income)?;

        let balance = self
            .sub_request(symbol, AlphaVantageFunction::BalanceSheet, || {
                client.get_balance_sheet(symbol)
            })
            .await;
        let balance = self.optional(symbol, AlphaVantageFunction::BalanceSheet, balance)?;

        let cashflow = self
            .sub_request(symbol, AlphaVantageFunction::CashFlow, || client.get_cash_flow(symbol))
            .await;
        let cashflow = self.optional(symbol, AlphaVantageFunction::CashFlow, cashflow)?;

        let global = quote.global_quote.unwrap_or_default();
        let price = parse_decimal(global.price.as_deref())
            .ok_or_else(|| FetchError::malformed(PROVIDER, format!("no price for {}", symbol)))?;
        let volume = global
            .volume
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| FetchError::malformed(PROVIDER, format!("no volume for {}", symbol)))?;

        Ok(merge(symbol, price, volume, overview, income, balance, cashflow))
    }

    fn tracker_summary(&self) -> Option<TrackerSummary> {
        Some(self.retrier.tracker().summary())
    }
}

fn merge(
    symbol: &str,
    price: rust_decimal::Decimal,
    volume: u64,
    overview: Option<OverviewResponse>,
    income: Option<IncomeStatementResponse>,
    balance: Option<BalanceSheetResponse>,
    cashflow: Option<CashFlowResponse>,
) -> QuoteRecord {
    let overview = overview.unwrap_or_default();
    let (income_annual, income_quarters) = split(income.map(|r| (r.annual_reports, r.quarterly_reports)));
    let (balance_annual, balance_quarters) = split(balance.map(|r| (r.annual_reports, r.quarterly_reports)));
    let (cash_annual, cash_quarters) = split(cashflow.map(|r| (r.annual_reports, r.quarterly_reports)));

    QuoteRecord {
        symbol: symbol.to_string(),
        price,
        volume,
        market_cap: parse_decimal(overview.market_capitalization.as_deref()),
        financials: financials(
            income_annual.first(),
            balance_annual.first(),
            cash_annual.first(),
        ),
        ratios: Ratios {
            pe: parse_decimal(overview.pe_ratio.as_deref()),
            ps: parse_decimal(overview.price_to_sales_ttm.as_deref()),
            roe: parse_decimal(overview.return_on_equity_ttm.as_deref()),
            debt_to_equity: parse_decimal(overview.debt_to_equity.as_deref()),
        },
        quarters: quarters(&income_quarters, &balance_quarters, &cash_quarters),
        source: PROVIDER,
    }
}

fn split<R>(reports: Option<(Vec<R>, Vec<R>)>) -> (Vec<R>, Vec<R>) {
    reports.unwrap_or_else(|| (Vec::new(), Vec::new()))
}

fn num(value: &Option<String>) -> Option<rust_decimal::Decimal> {
    parse_decimal(value.as_deref())
}

/// Most recent annual report of each statement.
fn financials(
    income: Option<&IncomeReport>,
    balance: Option<&BalanceReport>,
    cashflow: Option<&CashFlowReport>,
) -> Financials {
    let mut out = Financials::new();
    out.insert(
        StatementKind::Income,
        fields([
            ("total_revenue", income.and_then(|r| num(&r.total_revenue))),
            ("net_income", income.and_then(|r| num(&r.net_income))),
            ("gross_profit", income.and_then(|r| num(&r.gross_profit))),
        ]),
    );
    out.insert(
        StatementKind::Balance,
        fields([
            ("total_assets", balance.and_then(|r| num(&r.total_assets))),
            ("total_liabilities", balance.and_then(|r| num(&r.total_liabilities))),
            ("total_equity", balance.and_then(|r| num(&r.total_shareholder_equity))),
        ]),
    );
    out.insert(
        StatementKind::CashFlow,
        fields([
            ("operating_cashflow", cashflow.and_then(|r| num(&r.operating_cashflow))),
            ("capital_expenditures", cashflow.and_then(|r| num(&r.capital_expenditures))),
        ]),
    );
    out
}

fn quarters(
    income: &[IncomeReport],
    balance: &[BalanceReport],
    cashflow: &[CashFlowReport],
) -> Vec<QuarterlyFundamentals> {
    income
        .iter()
        .enumerate()
        .take(MAX_QUARTERS)
        .filter_map(|(i, inc)| {
            let end = inc.fiscal_date_ending.as_deref()?;
            let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").ok()?;
            let mut q = QuarterlyFundamentals::ending(end);
            q.revenue = num(&inc.total_revenue);
            q.expenses = num(&inc.total_expenses);
            q.profit = num(&inc.gross_profit);
            if let Some(bal) = balance.get(i) {
                q.assets = num(&bal.total_assets);
                q.liabilities = num(&bal.total_liabilities);
            }
            if let Some(cf) = cashflow.get(i) {
                q.operating_cashflow = num(&cf.operating_cashflow);
                q.investing_cashflow = num(&cf.cashflow_from_investment);
                q.financing_cashflow = num(&cf.cashflow_from_financing);
            }
            Some(q)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn income(date: &str, revenue: &str) -> IncomeReport {
        IncomeReport {
            fiscal_date_ending: Some(date.to_string()),
            total_revenue: Some(revenue.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn quarters_zip_by_position_and_cap_at_four() {
        let incomes: Vec<IncomeReport> = (1..=6)
            .map(|m| income(&format!("2023-{:02}-28", 13 - m), &format!("{}", m * 100)))
            .collect();
        let balances = vec![BalanceReport {
            total_assets: Some("500".into()),
            ..Default::default()
        }];
        let qs = quarters(&incomes, &balances, &[]);
        assert_eq!(qs.len(), 4);
        assert_eq!(qs[0].period_end, NaiveDate::from_ymd_opt(2023, 12, 28).unwrap());
        assert_eq!(qs[0].revenue, Some(Decimal::from(100)));
        assert_eq!(qs[0].assets, Some(Decimal::from(500)));
        assert_eq!(qs[1].assets, None);
        assert_eq!(qs[0].operating_cashflow, None);
    }

    #[test]
    fn quarters_without_dates_are_dropped() {
        let incomes = vec![
            IncomeReport::default(),
            income("not-a-date", "1"),
            income("2024-03-31", "2"),
        ];
        let qs = quarters(&incomes, &[], &[]);
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].quarter(), 1);
    }

    #[test]
    fn merge_with_missing_statements_fills_nulls() {
        let overview = OverviewResponse {
            market_capitalization: Some("1000".into()),
            pe_ratio: Some("None".into()),
            ..Default::default()
        };
        let record = merge("IBM", Decimal::from(5), 10, Some(overview), None, None, None);
        assert_eq!(record.market_cap, Some(Decimal::from(1000)));
        assert_eq!(record.ratios.pe, None);
        assert!(record.quarters.is_empty());
        assert_eq!(record.financials.len(), 3);
        assert_eq!(record.financial(StatementKind::Income, "total_revenue"), None);
        assert!(record.financials[&StatementKind::Income].contains_key("total_revenue"));
    }
}
