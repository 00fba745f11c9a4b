//! Error types for the batch endpoint client.
//!
//! [`BatchApiError`] separates rate limiting, non-success HTTP answers and
//! network failures so the poller can tell transient trouble from a real
//! rejection.

use thiserror::Error;

/// Errors raised while talking to the bulk inference endpoint.
#[derive(Debug, Error)]
pub enum BatchApiError {
    /// HTTP 429. `retry_after_ms` comes from the `retry-after` header when present.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other 4xx/5xx answer, with the response body as message.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// DNS, connection, timeout or body decoding failure.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl BatchApiError {
    /// Whether repeating the same read-only request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BatchApiError::RateLimited { .. } | BatchApiError::NetworkError(_) => true,
            BatchApiError::ApiError { status, .. } => *status >= 500,
        }
    }
}
