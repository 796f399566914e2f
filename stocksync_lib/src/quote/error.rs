use super::record::Provider;

/// Errors from fetching a quote record.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The provider answered with a non-success status, or is not configured.
    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable { provider: Provider, reason: String },

    #[error("{provider} rate limit exceeded")]
    RateLimited { provider: Provider },

    #[error("malformed {provider} response: {reason}")]
    MalformedResponse { provider: Provider, reason: String },

    /// Some sub-requests of a multi-request fetch failed.
    #[error("partial data for {symbol}: {function} failed: {reason}")]
    PartialData {
        symbol: String,
        function: String,
        reason: String,
    },

    #[error("network error talking to {provider}: {reason}")]
    Network { provider: Provider, reason: String },
}

impl FetchError {
    pub fn from_api(provider: Provider, err: stocksync_api::Error) -> Self {
        match err {
            stocksync_api::Error::RequestFailed(reason) => Self::Network { provider, reason },
            stocksync_api::Error::HttpStatus { status, body } => Self::ProviderUnavailable {
                provider,
                reason: format!("HTTP {}: {}", status, body),
            },
            stocksync_api::Error::RateLimited { .. } => Self::RateLimited { provider },
            stocksync_api::Error::Malformed(reason) => Self::MalformedResponse { provider, reason },
        }
    }

    pub(crate) fn malformed(provider: Provider, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            reason: reason.into(),
        }
    }
}
