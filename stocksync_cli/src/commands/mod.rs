//! CLI subcommand implementations.

pub mod fill_market_caps;
pub mod merge_listings;
pub mod refresh_fundamentals;
