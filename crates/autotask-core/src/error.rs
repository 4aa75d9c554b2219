//! Unified error handling for autotask-core

use thiserror::Error;

/// Core error type for autotask-core
#[derive(Error, Debug)]
pub enum Error {
    /// The governor refused the call because the remaining quota is below
    /// the configured floor. Never retried automatically.
    #[error("API quota exhausted: {remaining} calls remaining, resets {resets_in}")]
    QuotaExhausted { remaining: i64, resets_in: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for autotask-core
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a quota exhausted error
    pub fn quota_exhausted(remaining: i64, resets_in: impl Into<String>) -> Self {
        Error::QuotaExhausted {
            remaining,
            resets_in: resets_in.into(),
        }
    }

    /// Create an upstream API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error is a governor refusal rather than a transport failure
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Error::QuotaExhausted { .. })
    }
}
