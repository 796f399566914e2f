//! Error type for user input validation.

use std::fmt;

/// Errors produced when user-supplied input fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockSyncError {
    /// User-provided input failed validation.
    InvalidInput(String),
}

impl fmt::Display for StockSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for StockSyncError {}
