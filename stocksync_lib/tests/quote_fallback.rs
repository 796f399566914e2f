use std::time::Duration;

use rust_decimal::Decimal;
use stocksync_lib::quote::{AlphaVantageSource, FetchError, StatementKind, YahooSource};
use stocksync_lib::stocksync_api::{AlphaVantageClient, ChartClient};
use stocksync_lib::{Pacer, PartialDataPolicy, Provider, RemoteQuoteClient, RetryPolicy};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: Duration::ZERO,
        cool_off: Duration::from_millis(1),
        cool_off_jitter: Duration::ZERO,
        max_cool_off: Some(Duration::from_millis(10)),
    }
}

fn yahoo(server: &MockServer) -> YahooSource {
    YahooSource::new(ChartClient::with_base_url(&server.uri()), fast_policy())
        .with_pacer(Pacer::none())
}

fn alpha_vantage(server: &MockServer, partial: PartialDataPolicy) -> AlphaVantageSource {
    let client = AlphaVantageClient::with_base_url(&server.uri(), "test-key".to_string()).unwrap();
    AlphaVantageSource::new(client, fast_policy(), partial).with_pacer(Pacer::none())
}

async fn mount_av(server: &MockServer, function: &str, fixture: &str) {
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", function))
        .and(query_param("symbol", "IBM"))
        .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture(fixture)))
        .mount(server)
        .await;
}

async fn mount_all_av(server: &MockServer) {
    mount_av(server, "GLOBAL_QUOTE", "av_global_quote.json").await;
    mount_av(server, "OVERVIEW", "av_overview.json").await;
    mount_av(server, "INCOME_STATEMENT", "av_income.json").await;
    mount_av(server, "BALANCE_SHEET", "av_balance.json").await;
    mount_av(server, "CASH_FLOW", "av_cashflow.json").await;
}

#[tokio::test]
async fn primary_success_never_touches_secondary() {
    let yahoo_server = MockServer::start().await;
    let av_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("chart.json")))
        .expect(1)
        .mount(&yahoo_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("quote_summary.json")))
        .mount(&yahoo_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&av_server)
        .await;

    let client = RemoteQuoteClient::new(
        Box::new(yahoo(&yahoo_server)),
        Some(Box::new(alpha_vantage(&av_server, PartialDataPolicy::Reject))),
    );
    let record = client.fetch("AAPL").await.unwrap();

    assert_eq!(record.source, Provider::Yahoo);
    assert_eq!(record.price, Decimal::new(18984, 2));
    assert_eq!(record.volume, 52280100);
    assert_eq!(
        record.market_cap,
        Some(Decimal::new(18984, 2) * Decimal::from(15_334_099_968i64))
    );
    assert_eq!(record.ratios.pe, Some(Decimal::new(285, 1)));
    // Financials come from the annual report, quarters from the quarterly ones.
    assert_eq!(
        record.financial(StatementKind::Income, "total_revenue"),
        Some(Decimal::from(383_285_000_000i64))
    );
    assert_eq!(record.quarters.len(), 2);
    assert_eq!(record.quarters[0].revenue, Some(Decimal::from(90_753_000_000i64)));

    let summaries = client.tracker_summaries();
    assert_eq!(summaries[0].0, Provider::Yahoo);
    assert_eq!(summaries[0].1.requests_succeeded, 2);
    assert_eq!(summaries[1].1.requests_made, 0);
}

#[tokio::test]
async fn summary_failure_still_returns_primary_record() {
    let yahoo_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("chart.json")))
        .mount(&yahoo_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/AAPL"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Crumb"))
        .mount(&yahoo_server)
        .await;

    let client = RemoteQuoteClient::new(Box::new(yahoo(&yahoo_server)), None);
    let record = client.fetch("AAPL").await.unwrap();

    assert_eq!(record.source, Provider::Yahoo);
    assert_eq!(record.market_cap, None);
    assert!(record.quarters.is_empty());
}

#[tokio::test]
async fn rate_limited_primary_falls_back_to_alpha_vantage() {
    let yahoo_server = MockServer::start().await;
    let av_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/IBM"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .expect(1)
        .mount(&yahoo_server)
        .await;
    mount_all_av(&av_server).await;

    let client = RemoteQuoteClient::new(
        Box::new(yahoo(&yahoo_server)),
        Some(Box::new(alpha_vantage(&av_server, PartialDataPolicy::Reject))),
    );
    let record = client.fetch("IBM").await.unwrap();

    assert_eq!(record.source, Provider::AlphaVantage);
    assert_eq!(record.price, Decimal::new(1912900, 4));
    assert_eq!(record.volume, 3928145);
    assert_eq!(record.market_cap, Some(Decimal::from(175_234_000_000i64)));
    assert_eq!(record.ratios.debt_to_equity, None);
}

#[tokio::test]
async fn both_failing_returns_secondary_error() {
    let yahoo_server = MockServer::start().await;
    let av_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&yahoo_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"Error Message": "Invalid API call."}"#),
        )
        .expect(1)
        .mount(&av_server)
        .await;

    let client = RemoteQuoteClient::new(
        Box::new(yahoo(&yahoo_server)),
        Some(Box::new(alpha_vantage(&av_server, PartialDataPolicy::Reject))),
    );
    let err = client.fetch("ZZZZ").await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::MalformedResponse {
            provider: Provider::AlphaVantage,
            ..
        }
    ));
}

#[tokio::test]
async fn reject_policy_fails_on_missing_statement() {
    let av_server = MockServer::start().await;
    mount_av(&av_server, "GLOBAL_QUOTE", "av_global_quote.json").await;
    mount_av(&av_server, "OVERVIEW", "av_overview.json").await;
    Mock::given(method("GET"))
        .and(query_param("function", "INCOME_STATEMENT"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
        .mount(&av_server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("function", "BALANCE_SHEET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(0)
        .mount(&av_server)
        .await;

    let source = alpha_vantage(&av_server, PartialDataPolicy::Reject);
    let client = RemoteQuoteClient::new(Box::new(source), None);
    match client.fetch("IBM").await {
        Err(FetchError::PartialData { symbol, function, .. }) => {
            assert_eq!(symbol, "IBM");
            assert_eq!(function, "income");
        }
        other => panic!("expected PartialData, got {:?}", other),
    }
}

#[tokio::test]
async fn fill_nulls_policy_keeps_quote() {
    let av_server = MockServer::start().await;
    mount_av(&av_server, "GLOBAL_QUOTE", "av_global_quote.json").await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("av_throttle_note.json")))
        .mount(&av_server)
        .await;

    let source = alpha_vantage(&av_server, PartialDataPolicy::FillNulls);
    let client = RemoteQuoteClient::new(Box::new(source), None);
    let record = client.fetch("IBM").await.unwrap();

    assert_eq!(record.price, Decimal::new(1912900, 4));
    assert_eq!(record.market_cap, None);
    assert_eq!(record.financial(StatementKind::Income, "total_revenue"), None);
    assert_eq!(record.ratios, Default::default());
    assert!(record.quarters.is_empty());
}

#[tokio::test]
async fn throttle_note_cools_off_then_retries() {
    let av_server = MockServer::start().await;
    // First GLOBAL_QUOTE answer is a throttle notice with status 200.
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "GLOBAL_QUOTE"))
        .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("av_throttle_note.json")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&av_server)
        .await;
    mount_all_av(&av_server).await;

    // Real clock: the client's request timeout would fire under paused time
    // while wiremock answers.
    let policy = RetryPolicy {
        cool_off: Duration::from_millis(20),
        max_cool_off: Some(Duration::from_secs(1)),
        ..fast_policy()
    };
    let client = AlphaVantageClient::with_base_url(&av_server.uri(), "test-key".to_string()).unwrap();
    let source = AlphaVantageSource::new(client, policy, PartialDataPolicy::Reject)
        .with_pacer(Pacer::none());
    let client = RemoteQuoteClient::new(Box::new(source), None);

    let record = client.fetch("IBM").await.unwrap();

    assert_eq!(record.source, Provider::AlphaVantage);
    assert_eq!(record.price, Decimal::new(1912900, 4));
    let (provider, tracker) = &client.tracker_summaries()[0];
    assert_eq!(*provider, Provider::AlphaVantage);
    assert_eq!(tracker.requests_rate_limited, 1);
    assert_eq!(tracker.requests_failed, 0);
    assert!(tracker.total_backoff_secs > 0.019);
}
