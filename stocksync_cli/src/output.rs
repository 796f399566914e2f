use serde::Serialize;
use stocksync_lib::{
    BatchReport, FillSummary, MergeSummary, Provider, RefreshSummary, TrackerSummary,
};
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize, Debug, PartialEq)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    #[serde(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Tabled, Serialize, Debug, PartialEq)]
struct ProviderRow {
    #[tabled(rename = "Provider")]
    #[serde(rename = "provider")]
    provider: String,
    #[tabled(rename = "Requests")]
    #[serde(rename = "requests")]
    requests: u64,
    #[tabled(rename = "Succeeded")]
    #[serde(rename = "succeeded")]
    succeeded: u64,
    #[tabled(rename = "Rate Limited")]
    #[serde(rename = "rate_limited")]
    rate_limited: u64,
    #[tabled(rename = "Failed")]
    #[serde(rename = "failed")]
    failed: u64,
    #[tabled(rename = "Backoff")]
    #[serde(rename = "backoff_secs")]
    backoff: String,
}

/// JSON shape of a job run: the job summary plus per-provider counters.
#[derive(Serialize)]
struct RunReport<'a, T> {
    summary: &'a T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    providers: Vec<ProviderRow>,
}

// -- Row builders --

fn row(metric: &'static str, value: impl ToString) -> SummaryRow {
    SummaryRow {
        metric,
        value: value.to_string(),
    }
}

fn build_merge_rows(summary: &MergeSummary) -> Vec<SummaryRow> {
    vec![
        row("Listed", summary.listed),
        row("Invalid symbols", summary.invalid),
        row("Existing rows", summary.existing),
        row("Inserted", summary.inserted),
        row("Updated", summary.updated),
        row("Unchanged", summary.skipped),
        row(
            "Failed rows",
            summary.insert_report.failed() + summary.update_report.failed(),
        ),
    ]
}

fn build_fill_rows(summary: &FillSummary) -> Vec<SummaryRow> {
    vec![
        row("Candidates", summary.candidates),
        row("Fetched", summary.fetched),
        row("Fetch failed", summary.fetch_failed),
        row("No market cap", summary.no_market_cap),
        row("Updated", summary.updated),
        row("Failed rows", summary.report.failed()),
        row("Cancelled", yes_no(summary.cancelled)),
    ]
}

fn build_refresh_rows(summary: &RefreshSummary) -> Vec<SummaryRow> {
    vec![
        row("Stocks", summary.stocks),
        row("Fresh", summary.fresh),
        row("Refreshed", summary.refreshed),
        row("Fetch failed", summary.fetch_failed),
        row("Store errors", summary.item_failed),
        row("Quarters inserted", summary.quarters_inserted),
        row("Quarters updated", summary.quarters_updated),
        row(
            "Failed rows",
            summary.metrics_report.failed() + summary.fundamentals_report.failed(),
        ),
        row("Cancelled", yes_no(summary.cancelled)),
    ]
}

fn build_provider_rows(trackers: &[(Provider, TrackerSummary)]) -> Vec<ProviderRow> {
    trackers
        .iter()
        .map(|(provider, t)| ProviderRow {
            provider: provider.to_string(),
            requests: t.requests_made,
            succeeded: t.requests_succeeded,
            rate_limited: t.requests_rate_limited,
            failed: t.requests_failed,
            backoff: format!("{:.1}s", t.total_backoff_secs),
        })
        .collect()
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

// -- Printers --

pub fn print_merge_summary(summary: &MergeSummary, format: &OutputFormat) {
    print_failed_chunks("stocks_search inserts", &summary.insert_report);
    print_failed_chunks("stocks_search updates", &summary.update_report);
    print_run(build_merge_rows(summary), summary, &[], format);
}

pub fn print_fill_summary(
    summary: &FillSummary,
    trackers: &[(Provider, TrackerSummary)],
    format: &OutputFormat,
) {
    print_failed_chunks("stocks_search", &summary.report);
    print_run(build_fill_rows(summary), summary, trackers, format);
}

pub fn print_refresh_summary(
    summary: &RefreshSummary,
    trackers: &[(Provider, TrackerSummary)],
    format: &OutputFormat,
) {
    print_failed_chunks("stock_metrics", &summary.metrics_report);
    print_failed_chunks("stock_fundamentals", &summary.fundamentals_report);
    print_run(build_refresh_rows(summary), summary, trackers, format);
}

fn print_run<T: Serialize>(
    rows: Vec<SummaryRow>,
    summary: &T,
    trackers: &[(Provider, TrackerSummary)],
    format: &OutputFormat,
) {
    let providers = build_provider_rows(trackers);
    match format {
        OutputFormat::Table => {
            println!("{}", Table::new(rows));
            if !providers.is_empty() {
                println!("{}", Table::new(providers));
            }
        }
        OutputFormat::Json => print_json(&RunReport { summary, providers }),
    }
}

/// Failed chunks go to stderr so stdout stays parseable.
fn print_failed_chunks(label: &str, report: &BatchReport) {
    for chunk in report.failed_chunks() {
        eprintln!(
            "{}: chunk {} ({} rows) failed: {}",
            label,
            chunk.chunk_index + 1,
            chunk.count,
            chunk.error.as_deref().unwrap_or("unknown error")
        );
    }
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
