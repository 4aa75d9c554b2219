//! Quota probe trait and error types
//!
//! Defines the interface the governor uses to ask the upstream API how much
//! of the call quota has been consumed.

use async_trait::async_trait;
use thiserror::Error;

use super::types::QuotaSnapshot;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when probing quota usage
///
/// The governor never propagates these; a failed probe keeps the last known
/// snapshot in place.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// API returned an error
    #[error("API error: {0}")]
    ApiError(String),

    /// Failed to parse API response
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<reqwest::Error> for QuotaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QuotaError::NetworkError("Request timed out".to_string())
        } else if err.is_connect() {
            QuotaError::NetworkError("Connection failed".to_string())
        } else if err.is_status() {
            match err.status() {
                Some(status) if status.as_u16() == 401 => {
                    QuotaError::Unauthorized("Invalid or expired credentials".to_string())
                }
                Some(status) if status.as_u16() == 403 => {
                    QuotaError::Unauthorized("Access forbidden".to_string())
                }
                Some(status) => QuotaError::ApiError(format!("HTTP {}", status)),
                None => QuotaError::NetworkError(err.to_string()),
            }
        } else {
            QuotaError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for QuotaError {
    fn from(err: serde_json::Error) -> Self {
        QuotaError::ParseError(err.to_string())
    }
}

// ============================================================================
// Probe Trait
// ============================================================================

/// Source of quota usage snapshots
///
/// The governor calls `probe` on its own schedule (every N governed calls)
/// and never runs two probes at once.
///
/// # Example Implementation
///
/// ```ignore
/// use async_trait::async_trait;
/// use autotask_core::services::quota::{QuotaError, QuotaProbe, QuotaSnapshot};
///
/// struct FixedProbe;
///
/// #[async_trait]
/// impl QuotaProbe for FixedProbe {
///     async fn probe(&self) -> Result<QuotaSnapshot, QuotaError> {
///         Ok(QuotaSnapshot::new(120, 10000, "within 60 minutes"))
///     }
/// }
/// ```
#[async_trait]
pub trait QuotaProbe: Send + Sync {
    /// Fetch current quota usage from the upstream API
    async fn probe(&self) -> Result<QuotaSnapshot, QuotaError>;
}

// ============================================================================
// Tests
// ============================================================================
