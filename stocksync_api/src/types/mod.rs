mod chart;
pub use self::chart::{
    raw, BalanceSheetHistory, BalanceSheetStatement, CashflowStatement,
    CashflowStatementHistory, Chart, ChartMeta, ChartResponse, ChartResult, IncomeStatement,
    IncomeStatementHistory, Indicators, KeyStatistics, QuoteIndicator, QuoteSummary,
    QuoteSummaryResponse, QuoteSummaryResult, RawValue, YahooApiError,
};

mod alpha_vantage;
pub use self::alpha_vantage::{
    is_throttle_message, ApiNotice, BalanceReport, BalanceSheetResponse, CashFlowReport,
    CashFlowResponse, GlobalQuote, GlobalQuoteResponse, IncomeReport, IncomeStatementResponse,
    OverviewResponse, StatementResponse,
};
