//! B2 API Error Types
//!
//! Structured error handling for Backblaze B2 API operations.
//! Maps HTTP status codes and B2 error codes to variants for retry and
//! not-found decisions.

use super::types::B2ErrorBody;

/// B2 API error types
#[derive(Debug, thiserror::Error)]
pub enum B2Error {
    #[error("Authentication expired, token needs refresh")]
    AuthExpired,

    #[error("Rate limited, try again after backoff")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl B2Error {
    /// Whether this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            B2Error::RateLimited
                | B2Error::Timeout
                | B2Error::Network(_)
                | B2Error::Server(_, _)
                | B2Error::AuthExpired
        )
    }

    /// Whether this error is a passing outage rather than a rejected request
    ///
    /// Unlike `is_retryable`, an expired token is not transient: during
    /// authorization a 401 means the credentials are wrong.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            B2Error::RateLimited | B2Error::Timeout | B2Error::Network(_) | B2Error::Server(_, _)
        )
    }

    /// Create a B2Error from an HTTP status code and response body
    ///
    /// B2 reports several missing-file conditions as 400 with a specific
    /// `code` in the JSON body; those map to `NotFound` as well.
    pub fn from_status(status: u16, body: &str) -> Self {
        let code = serde_json::from_str::<B2ErrorBody>(body)
            .map(|b| b.code)
            .unwrap_or_default();

        match (status, code.as_str()) {
            (_, "file_not_present") | (_, "not_found") | (_, "no_such_file") => {
                B2Error::NotFound(body.to_string())
            }
            (401, _) => B2Error::AuthExpired,
            (403, _) => B2Error::Forbidden(body.to_string()),
            (404, _) => B2Error::NotFound(body.to_string()),
            (408, _) => B2Error::Timeout,
            (429, _) => B2Error::RateLimited,
            (500..=599, _) => B2Error::Server(status, body.to_string()),
            _ => B2Error::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for B2Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            B2Error::Timeout
        } else if e.is_connect() || e.is_request() {
            B2Error::Network(e.to_string())
        } else if e.is_decode() {
            B2Error::Decode(e.to_string())
        } else {
            B2Error::Request(e.to_string())
        }
    }
}
