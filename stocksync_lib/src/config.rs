//! Runtime configuration read from the process environment.
//!
//! Call `dotenvy::dotenv().ok()` before `Config::from_env` so a local `.env`
//! file is honored.

use crate::quote::PartialDataPolicy;
use crate::retry::RetryPolicy;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Credentials for the hosted PostgREST store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` only when the hosted store was not required.
    pub supabase: Option<SupabaseConfig>,
    pub alpha_vantage_key: Option<String>,
    pub yahoo_base_url: Option<String>,
    pub alpha_vantage_base_url: Option<String>,
    pub partial_data: PartialDataPolicy,
    pub retry: RetryPolicy,
}

impl Config {
    /// Reads configuration from the environment. `SUPABASE_URL` and
    /// `SUPABASE_KEY` are required when `require_store` is set.
    pub fn from_env(require_store: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(require_store, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        require_store: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Blank values count as unset.
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            (Some(url), Some(key)) => {
                url::Url::parse(&url).map_err(|e| ConfigError::Invalid {
                    var: "SUPABASE_URL",
                    reason: e.to_string(),
                })?;
                Some(SupabaseConfig { url, key })
            }
            (None, _) if require_store => return Err(ConfigError::Missing("SUPABASE_URL")),
            (_, None) if require_store => return Err(ConfigError::Missing("SUPABASE_KEY")),
            _ => None,
        };

        let partial_data = match get("STOCKSYNC_PARTIAL_DATA") {
            None => PartialDataPolicy::default(),
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                var: "STOCKSYNC_PARTIAL_DATA",
                reason,
            })?,
        };

        Ok(Self {
            supabase,
            alpha_vantage_key: get("ALPHA_VANTAGE_API_KEY"),
            yahoo_base_url: get("STOCKSYNC_YAHOO_BASE_URL"),
            alpha_vantage_base_url: get("STOCKSYNC_ALPHA_VANTAGE_BASE_URL"),
            partial_data,
            retry: RetryPolicy::from_lookup(&lookup),
        })
    }
}
