//! Classification of registry HTTP failures into retryable and final ones.

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of attempts for a registry request.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Registry responses that will not improve on retry.
#[derive(Debug, Error)]
pub enum NonRetryableError {
    /// HTTP 429
    #[error("Rate limit exceeded: {0}. Try again later.")]
    RateLimitExceeded(String),
    /// HTTP 401
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    /// HTTP 404
    #[error("Not found: {0}")]
    NotFound(String),
    /// HTTP 403
    #[error("Access forbidden: {0}")]
    Forbidden(String),
    /// Any other 4xx status
    #[error("Request error: {0}")]
    ClientError(String),
    /// A successful response whose body is not the expected document
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Returns `Ok(())` if the error is worth retrying (connection problems,
/// timeouts, 5xx) and the final error otherwise.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        return Ok(());
    };
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "registry request".to_string());

    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(url)),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(url)),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(url)),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} for {}",
            s.as_u16(),
            url
        ))),
        _ => Ok(()),
    }
}

/// Converts an `error_for_status()` failure into an `anyhow::Error`, typed as
/// [`NonRetryableError`] when retrying is pointless.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
