//! Error types for the provider clients.

/// Errors that can occur when calling a quote provider.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request never produced a response (connect failure, timeout, bad URL).
    #[error("Request failed: {0}")]
    RequestFailed(String),
    /// The provider returned a non-success status with a body snippet.
    #[error("Request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// The provider throttled the request, either with HTTP 429 or with a
    /// throttle notice embedded in a successful body.
    #[error("Rate limited by {provider}")]
    RateLimited { provider: &'static str },
    /// The body could not be decoded, or decoded but lacks the data we need.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl Error {
    /// True for failures that may succeed if the same request is sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 408,
            Self::RateLimited { .. } | Self::Malformed(_) => false,
        }
    }
}
