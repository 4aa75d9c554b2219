//! # autotask-core
//!
//! Quota-aware access to the Autotask REST API - shared by the CLI and any
//! other embedding host.
//!
//! This crate provides:
//! - Request governing: concurrency cap and quota tiers (`services::governor`)
//! - Quota snapshots and probes (`services::quota`)
//! - Query strategy planning for large result sets (`services::planner`)
//! - The reqwest transport (`services::autotask`)
//! - Unified error handling (`error` module)

pub mod error;
pub mod services;

// Re-exports for convenience
pub use error::{Error, Result};

// Re-export commonly used types from services
pub use services::{
    is_latest_query, AutotaskClient, AutotaskCredentials, FilterOp, Governor, GovernorConfig,
    GovernorStatus, PlannerSettings, QueryFilter, QueryPlanResult, QueryPlanner, QuotaError,
    QuotaProbe, QuotaSnapshot, RecordCounter, StrategyUsed, UsageTier,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_version_format() {
        let v = version();
        // Should be semver format: x.y.z
        let parts: Vec<&str> = v.split('.').collect();
        assert_eq!(parts.len(), 3, "Version should be in x.y.z format");
    }
}
