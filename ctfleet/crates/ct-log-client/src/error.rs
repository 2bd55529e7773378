use std::time::Duration;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum CtLogError {
    /// Transport-level failure (timeout, connection refused, reset).
    #[error("Network error during {operation}: {message}")]
    Network { operation: &'static str, message: String },

    /// The log answered 429. `retry_after` is the parsed `Retry-After` header.
    #[error("Rate limited during {operation} (retry after {retry_after:?})")]
    RateLimited { operation: &'static str, retry_after: Option<Duration> },

    #[error("CT log server error during {operation} (status {status}): {body}")]
    Server { operation: &'static str, status: StatusCode, body: String },

    #[error("CT log rejected {operation} (status {status}): {body}")]
    Client { operation: &'static str, status: StatusCode, body: String },

    #[error("Failed to decode {operation} response: {message}")]
    Decode { operation: &'static str, message: String },

    #[error("Invalid CT log URL: {0}")]
    Url(String),
}

impl CtLogError {
    /// Transient upstream conditions: worth a bounded wait and another try.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CtLogError::Network { .. } | CtLogError::RateLimited { .. } | CtLogError::Server { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CtLogError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            CtLogError::Network { .. } => "network_error",
            CtLogError::RateLimited { .. } => "rate_limited",
            CtLogError::Server { .. } => "server_error",
            CtLogError::Client { .. } => "client_error",
            CtLogError::Decode { .. } => "decode_error",
            CtLogError::Url(_) => "url_error",
        }
    }

    pub(crate) fn from_reqwest(operation: &'static str, source: reqwest::Error) -> Self {
        if source.is_decode() {
            CtLogError::Decode { operation, message: source.to_string() }
        } else {
            CtLogError::Network { operation, message: source.to_string() }
        }
    }
}
