/*
[INPUT]:  Error sources (HTTP transport, API status, response decoding, signer bridge)
[OUTPUT]: Structured error types with retry classification
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or changing retry classification
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the balance adapter
#[derive(Error, Debug)]
pub enum BalanceError {
    /// Network-level failure (connect, reset, timeout)
    #[error("HTTP transport error (timeout: {timeout}): {source}")]
    Transient {
        #[source]
        source: reqwest::Error,
        timeout: bool,
    },

    /// API answered 429
    #[error("Rate limited by API (status {status})")]
    RateLimited { status: u16 },

    /// 200 response without a usable `data` payload
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Any other non-200 status
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Signing oracle did not produce a usable signature
    #[error("Signer unavailable: {0}")]
    SignerUnavailable(String),

    /// Every attempt failed; carries the last attempt's error
    #[error("Gave up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Box<BalanceError>,
    },

    /// Work was interrupted by the shutdown token
    #[error("Request cancelled")]
    Cancelled,

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local I/O failed outside the signer pipe
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BalanceError {
    fn from(source: reqwest::Error) -> Self {
        let timeout = source.is_timeout();
        BalanceError::Transient { source, timeout }
    }
}

impl BalanceError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BalanceError::Transient { .. }
                | BalanceError::RateLimited { .. }
                | BalanceError::MalformedResponse(_)
                | BalanceError::UnexpectedStatus { .. }
                | BalanceError::SignerUnavailable(_)
        )
    }

    /// Check if the error is a transport timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, BalanceError::Transient { timeout: true, .. })
    }

    /// Build the error for a non-200 status
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return BalanceError::RateLimited {
                status: status.as_u16(),
            };
        }
        BalanceError::UnexpectedStatus {
            status: status.as_u16(),
            body: body.chars().take(256).collect(),
        }
    }
}

/// Result type alias for balance adapter operations
pub type Result<T> = std::result::Result<T, BalanceError>;
