use crate::error::StockSyncError;

pub const MAX_SYMBOL_LENGTH: usize = 12;
pub const MAX_EXCHANGE_LENGTH: usize = 32;
pub const MAX_CHUNK_SIZE: usize = 10_000;

/// Strip ASCII control characters (0x00-0x1F except space 0x20), trim whitespace,
/// and enforce a byte-length limit.
pub fn sanitize_text(input: &str, max_len: usize) -> Result<String, StockSyncError> {
    if input.len() > max_len {
        return Err(StockSyncError::InvalidInput(format!(
            "input exceeds maximum length of {} bytes",
            max_len
        )));
    }
    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_ascii_control() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string();
    if sanitized.is_empty() {
        return Err(StockSyncError::InvalidInput(
            "input is empty after sanitization".to_string(),
        ));
    }
    Ok(sanitized)
}

/// Validate a ticker symbol: trim, uppercase, 1-12 characters of `A-Z`,
/// `0-9`, `.`, `^` or `-` (covers class shares like `BRK.B` and indices
/// like `^GSPC`).
pub fn validate_symbol(input: &str) -> Result<String, StockSyncError> {
    let upper = input.trim().to_uppercase();
    if upper.is_empty() {
        return Err(StockSyncError::InvalidInput("symbol is empty".to_string()));
    }
    if upper.len() > MAX_SYMBOL_LENGTH {
        return Err(StockSyncError::InvalidInput(format!(
            "symbol '{}' exceeds maximum length of {} characters",
            input.trim(),
            MAX_SYMBOL_LENGTH
        )));
    }
    if let Some(bad) = upper
        .chars()
        .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '^' | '-')))
    {
        return Err(StockSyncError::InvalidInput(format!(
            "symbol '{}' contains invalid character '{}'",
            input.trim(),
            bad
        )));
    }
    Ok(upper)
}

/// Validate an exchange name: sanitized and lowercased (`NASDAQ` -> `nasdaq`).
pub fn validate_exchange(input: &str) -> Result<String, StockSyncError> {
    Ok(sanitize_text(input, MAX_EXCHANGE_LENGTH)?.to_lowercase())
}

/// Validate an upsert chunk size (1 to 10,000 rows).
pub fn validate_chunk_size(size: usize) -> Result<usize, StockSyncError> {
    if (1..=MAX_CHUNK_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(StockSyncError::InvalidInput(format!(
            "chunk size must be between 1 and {}, got {}",
            MAX_CHUNK_SIZE, size
        )))
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
