//! Error types shared by the resource clients.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;

/// A failed call against an external API.
///
/// The distinction that matters to callers is retryability: transport
/// errors, 5xx responses and rate limits are worth another attempt,
/// everything else fails fast.
#[derive(Debug)]
pub enum ApiError {
    /// The upstream answered with a non-success status.
    Status {
        status: StatusCode,
        body: String,
        /// Populated from a `Retry-After` header on rate-limit
        /// responses.
        retry_after: Option<Duration>,
    },
    /// The request never produced a response (connect error, timeout,
    /// body read failure).
    Http(reqwest::Error),
}

impl ApiError {
    pub fn status(status: StatusCode, body: String, retry_after: Option<Duration>) -> Self {
        ApiError::Status {
            status,
            body,
            retry_after,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Http(_) => true,
        }
    }

    /// Upstream-suggested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Status { retry_after, .. } => *retry_after,
            ApiError::Http(_) => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Status { status, body, .. } => {
                write!(f, "upstream returned {status}: {body}")
            }
            ApiError::Http(e) => write!(f, "request failed: {e}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Status { .. } => None,
            ApiError::Http(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Http(e)
    }
}
