//! Primary quote source: Yahoo Finance chart plus best-effort quoteSummary.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use stocksync_api::types::{
    raw, BalanceSheetStatement, CashflowStatement, IncomeStatement, KeyStatistics,
    QuoteSummaryResult,
};
use stocksync_api::ChartClient;

use super::error::FetchError;
use super::record::{
    decimal_from_f64, Financials, Provider, QuarterlyFundamentals, QuoteRecord, Ratios,
    StatementKind, MAX_QUARTERS,
};
use super::QuoteSource;
use crate::retry::{Pacer, Retrier, RetryPolicy, TrackerSummary};

const PROVIDER: Provider = Provider::Yahoo;

pub struct YahooSource {
    client: ChartClient,
    retrier: Retrier,
    pacer: Pacer,
}

impl YahooSource {
    /// Rate-limit responses are not cooled off here; they go straight back
    /// to the caller so the fallback source can take over.
    pub fn new(client: ChartClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            retrier: Retrier::new(PROVIDER.as_str(), policy.without_cool_off()),
            pacer: Pacer::new(Duration::from_secs(2), Duration::from_millis(500)),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    async fn summary(&self, symbol: &str) -> Option<QuoteSummaryResult> {
        let max = self.retrier.policy().max_attempts;
        let pacer = &self.pacer;
        let client = &self.client;
        let result = self
            .retrier
            .call(&format!("yahoo quoteSummary {}", symbol), max, move || async move {
                pacer.wait().await;
                client.get_quote_summary(symbol).await
            })
            .await;
        match result {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("quoteSummary unavailable for {}, continuing without fundamentals: {}", symbol, e);
                None
            }
        }
    }
}

#[async_trait]
impl QuoteSource for YahooSource {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, FetchError> {
        let max = self.retrier.policy().max_attempts;
        let pacer = &self.pacer;
        let client = &self.client;
        let chart = self
            .retrier
            .call(&format!("yahoo chart {}", symbol), max, move || async move {
                pacer.wait().await;
                client.get_chart(symbol).await
            })
            .await
            .map_err(|e| FetchError::from_api(PROVIDER, e))?;

        let result = chart
            .first_result()
            .ok_or_else(|| FetchError::malformed(PROVIDER, format!("no chart result for {}", symbol)))?;
        let price = result
            .meta
            .regular_market_price
            .and_then(decimal_from_f64)
            .ok_or_else(|| FetchError::malformed(PROVIDER, "missing regularMarketPrice"))?;
        let volume = result
            .first_volume()
            .or(result.meta.regular_market_volume)
            .ok_or_else(|| FetchError::malformed(PROVIDER, "no volume in chart"))?;

        let summary = self.summary(symbol).await.unwrap_or_default();
        let stats = summary.default_key_statistics.unwrap_or_default();

        let market_cap = raw(&stats.shares_outstanding)
            .and_then(decimal_from_f64)
            .and_then(|shares| price.checked_mul(shares));

        let annual_income = summary
            .income_statement_history
            .map(|h| h.income_statement_history)
            .unwrap_or_default();
        let annual_balance = summary
            .balance_sheet_history
            .map(|h| h.balance_sheet_statements)
            .unwrap_or_default();
        let annual_cashflow = summary
            .cashflow_statement_history
            .map(|h| h.cashflow_statements)
            .unwrap_or_default();
        let income = summary
            .income_statement_history_quarterly
            .map(|h| h.income_statement_history)
            .unwrap_or_default();
        let balance = summary
            .balance_sheet_history_quarterly
            .map(|h| h.balance_sheet_statements)
            .unwrap_or_default();
        let cashflow = summary
            .cashflow_statement_history_quarterly
            .map(|h| h.cashflow_statements)
            .unwrap_or_default();

        Ok(QuoteRecord {
            symbol: symbol.to_string(),
            price,
            volume,
            market_cap,
            financials: financials(
                annual_income.first(),
                annual_balance.first(),
                annual_cashflow.first(),
            ),
            ratios: ratios(&stats),
            quarters: quarters(&income, &balance, &cashflow),
            source: PROVIDER,
        })
    }

    fn tracker_summary(&self) -> Option<TrackerSummary> {
        Some(self.retrier.tracker().summary())
    }
}

fn dec(value: &Option<stocksync_api::types::RawValue>) -> Option<Decimal> {
    raw(value).and_then(decimal_from_f64)
}

fn ratios(stats: &KeyStatistics) -> Ratios {
    Ratios {
        pe: dec(&stats.forward_pe),
        ps: dec(&stats.price_to_sales_trailing12_months),
        roe: dec(&stats.return_on_equity),
        debt_to_equity: dec(&stats.debt_to_equity),
    }
}

/// Most recent annual report of each statement.
fn financials(
    income: Option<&IncomeStatement>,
    balance: Option<&BalanceSheetStatement>,
    cashflow: Option<&CashflowStatement>,
) -> Financials {
    let mut out = Financials::new();
    out.insert(
        StatementKind::Income,
        fields([
            ("total_revenue", income.and_then(|s| dec(&s.total_revenue))),
            ("net_income", income.and_then(|s| dec(&s.net_income))),
            ("gross_profit", income.and_then(|s| dec(&s.gross_profit))),
        ]),
    );
    out.insert(
        StatementKind::Balance,
        fields([
            ("total_assets", balance.and_then(|s| dec(&s.total_assets))),
            ("total_liabilities", balance.and_then(|s| dec(&s.total_liabilities))),
            ("total_equity", balance.and_then(|s| dec(&s.total_stockholder_equity))),
        ]),
    );
    out.insert(
        StatementKind::CashFlow,
        fields([
            (
                "operating_cashflow",
                cashflow.and_then(|s| dec(&s.total_cash_from_operating_activities)),
            ),
            (
                "capital_expenditures",
                cashflow.and_then(|s| dec(&s.capital_expenditures)),
            ),
        ]),
    );
    out
}

pub(crate) fn fields<const N: usize>(
    pairs: [(&str, Option<Decimal>); N],
) -> BTreeMap<String, Option<Decimal>> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Zips the quarterly statements by position; income statements carry the
/// period end, quarters without one are dropped.
fn quarters(
    income: &[IncomeStatement],
    balance: &[BalanceSheetStatement],
    cashflow: &[CashflowStatement],
) -> Vec<QuarterlyFundamentals> {
    income
        .iter()
        .enumerate()
        .take(MAX_QUARTERS)
        .filter_map(|(i, inc)| {
            let mut q = QuarterlyFundamentals::ending(inc.end_date()?);
            q.revenue = dec(&inc.total_revenue);
            q.expenses = dec(&inc.total_operating_expenses);
            q.profit = dec(&inc.gross_profit);
            if let Some(bal) = balance.get(i) {
                q.assets = dec(&bal.total_assets);
                q.liabilities = dec(&bal.total_liabilities);
            }
            if let Some(cf) = cashflow.get(i) {
                q.operating_cashflow = dec(&cf.total_cash_from_operating_activities);
                q.investing_cashflow = dec(&cf.total_cash_from_investing_activities);
                q.financing_cashflow = dec(&cf.total_cash_from_financing_activities);
            }
            Some(q)
        })
        .collect()
}
