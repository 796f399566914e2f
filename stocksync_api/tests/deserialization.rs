use chrono::NaiveDate;
use stocksync_api::types::{
    raw, BalanceSheetResponse, CashFlowResponse, ChartResponse, GlobalQuoteResponse,
    IncomeStatementResponse, OverviewResponse, QuoteSummaryResponse,
};

fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}

#[test]
fn deserialize_chart() {
    let json = load_fixture("chart.json");
    let resp: ChartResponse = serde_json::from_str(&json).unwrap();
    let result = resp.first_result().unwrap();
    assert_eq!(result.meta.regular_market_price, Some(189.84));
    assert_eq!(result.meta.symbol.as_deref(), Some("AAPL"));
    // The first bar has a null volume; the first non-null one is used.
    assert_eq!(result.first_volume(), Some(52280100));
    assert!(resp.chart.error.is_none());
}

#[test]
fn deserialize_chart_not_found() {
    let json = load_fixture("chart_not_found.json");
    let resp: ChartResponse = serde_json::from_str(&json).unwrap();
    assert!(resp.first_result().is_none());
    let err = resp.chart.error.unwrap();
    assert_eq!(err.code, "Not Found");
}

#[test]
fn deserialize_quote_summary_statement_modules() {
    let json = load_fixture("quote_summary.json");
    let resp: QuoteSummaryResponse = serde_json::from_str(&json).unwrap();
    let result = resp.quote_summary.result.unwrap().into_iter().next().unwrap();

    let stats = result.default_key_statistics.unwrap();
    assert_eq!(raw(&stats.shares_outstanding), Some(15334099968.0));
    assert_eq!(raw(&stats.forward_pe), Some(28.5));
    // `{}` means "no value".
    assert_eq!(raw(&stats.price_to_sales_trailing12_months), None);
    assert_eq!(raw(&stats.return_on_equity), None);

    let annual = result.income_statement_history.unwrap().income_statement_history;
    assert_eq!(annual.len(), 1);
    assert_eq!(annual[0].end_date(), NaiveDate::from_ymd_opt(2023, 9, 30));

    let income = result
        .income_statement_history_quarterly
        .unwrap()
        .income_statement_history;
    assert_eq!(income.len(), 2);
    assert_eq!(
        income[0].end_date(),
        NaiveDate::from_ymd_opt(2024, 3, 31)
    );
    assert_eq!(raw(&income[1].total_operating_expenses), None);

    let balance = result
        .balance_sheet_history_quarterly
        .unwrap()
        .balance_sheet_statements;
    assert_eq!(raw(&balance[0].total_liabilities), Some(263217000000.0));

    let cashflow = result
        .cashflow_statement_history_quarterly
        .unwrap()
        .cashflow_statements;
    assert_eq!(
        raw(&cashflow[0].total_cash_from_investing_activities),
        Some(-310000000.0)
    );
}

#[test]
fn deserialize_overview() {
    let json = load_fixture("av_overview.json");
    let resp: OverviewResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(resp.symbol.as_deref(), Some("IBM"));
    assert_eq!(resp.market_capitalization.as_deref(), Some("175234000000"));
    assert_eq!(resp.debt_to_equity.as_deref(), Some("None"));
    assert!(!resp.notice.is_throttled());
}

#[test]
fn deserialize_global_quote() {
    let json = load_fixture("av_global_quote.json");
    let resp: GlobalQuoteResponse = serde_json::from_str(&json).unwrap();
    let quote = resp.global_quote.unwrap();
    assert_eq!(quote.price.as_deref(), Some("191.2900"));
    assert_eq!(quote.volume.as_deref(), Some("3928145"));
}

#[test]
fn deserialize_statements() {
    let income: IncomeStatementResponse =
        serde_json::from_str(&load_fixture("av_income.json")).unwrap();
    assert_eq!(income.annual_reports.len(), 1);
    assert_eq!(income.quarterly_reports.len(), 2);
    // `operatingExpenses` is accepted for the expenses field.
    assert_eq!(
        income.quarterly_reports[0].total_expenses.as_deref(),
        Some("5786000000")
    );

    let balance: BalanceSheetResponse =
        serde_json::from_str(&load_fixture("av_balance.json")).unwrap();
    assert_eq!(
        balance.annual_reports[0].total_shareholder_equity.as_deref(),
        Some("22533000000")
    );

    let cashflow: CashFlowResponse =
        serde_json::from_str(&load_fixture("av_cashflow.json")).unwrap();
    assert_eq!(
        cashflow.quarterly_reports[1].capital_expenditures.as_deref(),
        Some("None")
    );
}

#[test]
fn deserialize_throttle_note() {
    let json = load_fixture("av_throttle_note.json");
    let resp: OverviewResponse = serde_json::from_str(&json).unwrap();
    assert!(resp.notice.is_throttled());
    assert!(resp.symbol.is_none());
}
