use std::time::Duration;
use thiserror::Error;

/// Errors a [`PageFetcher`](crate::fetcher::PageFetcher) can report.
///
/// Every variant is scoped to one key: the coordinator records it on the slot,
/// leaves the cached items untouched and returns it to the caller. Messages
/// are kept as strings so a failure can be cloned into a host snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, reset).
    #[error("Network error: {0}")]
    Network(String),
    /// The request exceeded its deadline.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Non-2xx response.
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Coarse classification used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Decode,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) | FetchError::HttpStatus(_) => {
                ErrorKind::Network
            }
            FetchError::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Returns true if retrying the same intent later has a realistic chance
    /// of succeeding.
    ///
    /// Decode failures stay eligible for retry at the slot level, but this
    /// reports false so callers can avoid automatic retry loops.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) => true,
            FetchError::HttpStatus(status) => *status >= 500 || *status == 429,
            FetchError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}
