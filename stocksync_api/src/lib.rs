//! HTTP clients for the upstream quote providers.
//!
//! `ChartClient` talks to the Yahoo Finance chart and quoteSummary endpoints,
//! `AlphaVantageClient` to the Alpha Vantage query endpoint. Both decode into
//! the typed schemas in [`types`] and never return loosely-typed JSON.

mod alpha_vantage;
mod client;
mod errors;
pub mod types;
mod user_agent;
pub use self::alpha_vantage::{AlphaVantageClient, AlphaVantageFunction};
pub use self::client::ChartClient;
pub use self::errors::Error;
