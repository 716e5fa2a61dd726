//! Centralized error types for Wayfarer.
//!
//! `FetchError` is the single taxonomy shared by every fetcher:
//! - Validation: caller-supplied parameters are missing or malformed
//! - Network: transport failure or timeout
//! - Api: non-2xx or an API-reported error state
//! - Parse: malformed or incomplete structured payload
//! - Storage: cache read/write failure
//!
//! None of these reach the UI layer. Fetchers collapse them into fallback
//! content; the types exist so logs and the rotation engine can tell them apart.

use thiserror::Error;

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,
}

/// Failure of a single upstream fetch, shared by all domain fetchers.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FetchError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        FetchError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        FetchError::Parse(message.into())
    }

    /// Whether a repeat of the same request could plausibly succeed.
    ///
    /// Only used to label failures; the rotation engine moves on to the next
    /// endpoint either way.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            // Another mirror may serve a well-formed body.
            FetchError::Parse(_) => true,
            FetchError::Validation(_) | FetchError::Storage(_) => false,
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_fetch_error(self) -> FetchError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_fetch_error(self) -> FetchError {
        if self.is_timeout() {
            FetchError::Network(NetworkError::Timeout)
        } else if self.is_decode() {
            FetchError::Parse(self.to_string())
        } else if let Some(status) = self.status() {
            FetchError::Api {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            FetchError::Network(NetworkError::ConnectionFailed(self.to_string()))
        }
    }
}
