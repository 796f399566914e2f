//! Normalized quote record shared by both providers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which provider produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Yahoo,
    AlphaVantage,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Yahoo => "yahoo",
            Provider::AlphaVantage => "alpha_vantage",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Income,
    Balance,
    CashFlow,
}

/// Statement kind -> field -> value. Every field the provider defines for a
/// statement is present; values the provider did not report are `None`.
pub type Financials = BTreeMap<StatementKind, BTreeMap<String, Option<Decimal>>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ratios {
    pub pe: Option<Decimal>,
    pub ps: Option<Decimal>,
    pub roe: Option<Decimal>,
    pub debt_to_equity: Option<Decimal>,
}

/// One fiscal quarter of statement data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyFundamentals {
    pub period_end: NaiveDate,
    pub revenue: Option<Decimal>,
    pub expenses: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub assets: Option<Decimal>,
    pub liabilities: Option<Decimal>,
    pub operating_cashflow: Option<Decimal>,
    pub investing_cashflow: Option<Decimal>,
    pub financing_cashflow: Option<Decimal>,
}

impl QuarterlyFundamentals {
    /// An empty quarter ending on `period_end`.
    pub fn ending(period_end: NaiveDate) -> Self {
        Self {
            period_end,
            revenue: None,
            expenses: None,
            profit: None,
            assets: None,
            liabilities: None,
            operating_cashflow: None,
            investing_cashflow: None,
            financing_cashflow: None,
        }
    }

    /// Calendar quarter (1-4) of the period end.
    pub fn quarter(&self) -> u32 {
        (self.period_end.month() - 1) / 3 + 1
    }

    pub fn year(&self) -> i32 {
        self.period_end.year()
    }
}

/// Maximum number of quarters carried on a record.
pub const MAX_QUARTERS: usize = 4;

/// Normalized market data for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub price: Decimal,
    pub volume: u64,
    pub market_cap: Option<Decimal>,
    pub financials: Financials,
    pub ratios: Ratios,
    /// Most recent first.
    pub quarters: Vec<QuarterlyFundamentals>,
    pub source: Provider,
}

impl QuoteRecord {
    pub fn financial(&self, kind: StatementKind, field: &str) -> Option<Decimal> {
        self.financials.get(&kind)?.get(field).copied().flatten()
    }
}

/// Partial data policy for multi-request providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialDataPolicy {
    /// Any failed sub-request fails the whole fetch.
    #[default]
    Reject,
    /// Only the price quote is mandatory; other failed sub-requests leave
    /// their fields empty.
    FillNulls,
}

impl FromStr for PartialDataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "fill-nulls" | "fill_nulls" => Ok(Self::FillNulls),
            other => Err(format!(
                "unknown partial data policy '{}'. Valid values: reject, fill-nulls",
                other
            )),
        }
    }
}

/// Parses a provider number string. `"None"`, `"-"` and blank mean no value.
pub fn parse_decimal(value: Option<&str>) -> Option<Decimal> {
    let value = value?.trim();
    if value.is_empty() || value == "-" || value.eq_ignore_ascii_case("none") {
        return None;
    }
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

/// Reads a decimal out of a JSON value that may be a number, a numeric
/// string, or anything else (treated as no value).
pub fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(decimal_from_f64),
        },
        serde_json::Value::String(s) => parse_decimal(Some(s)),
        _ => None,
    }
}
