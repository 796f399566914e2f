//! Quote fetching with provider fallback.
//!
//! `RemoteQuoteClient` asks the primary source (Yahoo) first and falls back to
//! the secondary source (Alpha Vantage) on any failure, rate limits included.
//! Each source decodes its provider's schema at the HTTP boundary and maps it
//! into a single normalized [`QuoteRecord`].

pub mod alpha_vantage;
pub mod error;
pub mod record;
pub mod yahoo;

use async_trait::async_trait;
use stocksync_api::{AlphaVantageClient, ChartClient};

use crate::config::Config;
use crate::retry::TrackerSummary;

pub use alpha_vantage::AlphaVantageSource;
pub use error::FetchError;
pub use record::{
    decimal_from_f64, decimal_from_json, parse_decimal, Financials, PartialDataPolicy, Provider,
    QuarterlyFundamentals, QuoteRecord, Ratios, StatementKind,
};
pub use yahoo::YahooSource;

/// One upstream provider.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, FetchError>;

    /// Request counters for the end-of-run summary, if the source keeps any.
    fn tracker_summary(&self) -> Option<TrackerSummary> {
        None
    }
}

/// Fetches quote records from a primary source with an optional fallback.
pub struct RemoteQuoteClient {
    primary: Box<dyn QuoteSource>,
    secondary: Option<Box<dyn QuoteSource>>,
}

impl RemoteQuoteClient {
    pub fn new(primary: Box<dyn QuoteSource>, secondary: Option<Box<dyn QuoteSource>>) -> Self {
        Self { primary, secondary }
    }

    /// Yahoo as primary; Alpha Vantage as fallback when a key is configured.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let chart = match &config.yahoo_base_url {
            Some(url) => ChartClient::with_base_url(url),
            None => ChartClient::new(),
        };
        let primary = YahooSource::new(chart, config.retry.clone());

        let secondary = match &config.alpha_vantage_key {
            Some(key) => {
                let client = match &config.alpha_vantage_base_url {
                    Some(url) => AlphaVantageClient::with_base_url(url, key.clone()),
                    None => AlphaVantageClient::new(key.clone()),
                }
                .map_err(|e| FetchError::from_api(Provider::AlphaVantage, e))?;
                let source =
                    AlphaVantageSource::new(client, config.retry.clone(), config.partial_data);
                Some(Box::new(source) as Box<dyn QuoteSource>)
            }
            None => {
                tracing::info!("ALPHA_VANTAGE_API_KEY not set, fetching from Yahoo only");
                None
            }
        };

        Ok(Self::new(Box::new(primary), secondary))
    }

    pub async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, FetchError> {
        let primary_err = match self.primary.fetch(symbol).await {
            Ok(record) => return Ok(record),
            Err(e) => e,
        };

        let Some(secondary) = &self.secondary else {
            tracing::warn!(
                "{} failed for {} and no fallback is configured: {}",
                self.primary.provider(),
                symbol,
                primary_err
            );
            return Err(primary_err);
        };

        tracing::warn!(
            "{} failed for {}, trying {}: {}",
            self.primary.provider(),
            symbol,
            secondary.provider(),
            primary_err
        );

        match secondary.fetch(symbol).await {
            Ok(record) => Ok(record),
            Err(secondary_err) => {
                tracing::warn!(
                    "both providers failed for {}: {}: {}; {}: {}",
                    symbol,
                    self.primary.provider(),
                    primary_err,
                    secondary.provider(),
                    secondary_err
                );
                Err(secondary_err)
            }
        }
    }

    /// Request counters per provider, primary first.
    pub fn tracker_summaries(&self) -> Vec<(Provider, TrackerSummary)> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .filter_map(|s| s.tracker_summary().map(|t| (s.provider(), t)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        provider: Provider,
        result: Result<Decimal, FetchError>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QuoteSource for Scripted {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let price = self.result.clone()?;
            Ok(QuoteRecord {
                symbol: symbol.to_string(),
                price,
                volume: 1,
                market_cap: None,
                financials: Financials::new(),
                ratios: Ratios::default(),
                quarters: vec![],
                source: self.provider,
            })
        }
    }

    fn source(
        provider: Provider,
        result: Result<Decimal, FetchError>,
    ) -> (Box<dyn QuoteSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let s = Scripted {
            provider,
            result,
            calls: Arc::clone(&calls),
        };
        (Box::new(s), calls)
    }

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        let (primary, _) = source(Provider::Yahoo, Ok(Decimal::from(10)));
        let (secondary, secondary_calls) = source(Provider::AlphaVantage, Ok(Decimal::from(20)));
        let client = RemoteQuoteClient::new(primary, Some(secondary));

        let record = client.fetch("AAPL").await.unwrap();
        assert_eq!(record.source, Provider::Yahoo);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rate_limited_primary_falls_back() {
        let (primary, _) = source(
            Provider::Yahoo,
            Err(FetchError::RateLimited { provider: Provider::Yahoo }),
        );
        let (secondary, secondary_calls) = source(Provider::AlphaVantage, Ok(Decimal::from(20)));
        let client = RemoteQuoteClient::new(primary, Some(secondary));

        let record = client.fetch("AAPL").await.unwrap();
        assert_eq!(record.source, Provider::AlphaVantage);
        assert_eq!(record.price, Decimal::from(20));
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn both_failing_returns_secondary_error() {
        let (primary, _) = source(
            Provider::Yahoo,
            Err(FetchError::Network {
                provider: Provider::Yahoo,
                reason: "reset".into(),
            }),
        );
        let secondary_err = FetchError::MalformedResponse {
            provider: Provider::AlphaVantage,
            reason: "unknown symbol".into(),
        };
        let (secondary, _) = source(Provider::AlphaVantage, Err(secondary_err.clone()));
        let client = RemoteQuoteClient::new(primary, Some(secondary));

        assert_eq!(client.fetch("ZZZZ").await.unwrap_err(), secondary_err);
    }

    #[tokio::test]
    async fn primary_only_returns_primary_error() {
        let primary_err = FetchError::ProviderUnavailable {
            provider: Provider::Yahoo,
            reason: "HTTP 404".into(),
        };
        let (primary, primary_calls) = source(Provider::Yahoo, Err(primary_err.clone()));
        let client = RemoteQuoteClient::new(primary, None);

        assert_eq!(client.fetch("ZZZZ").await.unwrap_err(), primary_err);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert!(client.tracker_summaries().is_empty());
    }
}
