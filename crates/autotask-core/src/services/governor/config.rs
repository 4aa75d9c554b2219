//! Governor configuration
//!
//! Defaults, environment overrides and normalization for [`GovernorConfig`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default number of concurrent in-flight requests
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Default number of governed calls between quota checks
pub const DEFAULT_CHECK_EVERY_N_CALLS: u32 = 19;

/// Default high-usage threshold (percentage)
pub const DEFAULT_HIGH_USAGE_PERCENT: f64 = 50.0;

/// Default critical threshold (percentage)
pub const DEFAULT_CRITICAL_USAGE_PERCENT: f64 = 80.0;

/// Default floor of remaining calls below which all work is refused
pub const DEFAULT_MIN_CALLS_REMAINING: u64 = 100;

/// Check interval once usage is critical
pub const CRITICAL_CHECK_EVERY_N_CALLS: u32 = 9;

/// Environment variables read by [`GovernorConfig::from_env`]
pub const ENV_MAX_CONCURRENT: &str = "AUTOTASK_MAX_CONCURRENT";
pub const ENV_CHECK_EVERY_N_CALLS: &str = "AUTOTASK_CHECK_EVERY_N_CALLS";
pub const ENV_HIGH_USAGE_PERCENT: &str = "AUTOTASK_HIGH_USAGE_PERCENT";
pub const ENV_CRITICAL_USAGE_PERCENT: &str = "AUTOTASK_CRITICAL_USAGE_PERCENT";
pub const ENV_MIN_CALLS_REMAINING: &str = "AUTOTASK_MIN_CALLS_REMAINING";

// ============================================================================
// Configuration
// ============================================================================

/// Limits applied by the governor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Maximum in-flight requests while usage is normal
    pub max_concurrent: usize,
    /// Governed calls between quota checks
    pub check_every_n_calls: u32,
    /// Usage percentage at which execution becomes serial
    pub high_usage_percent: f64,
    /// Usage percentage at which quota checks tighten
    pub critical_usage_percent: f64,
    /// Remaining-call floor; fewer than this blocks all work
    pub min_calls_remaining: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            check_every_n_calls: DEFAULT_CHECK_EVERY_N_CALLS,
            high_usage_percent: DEFAULT_HIGH_USAGE_PERCENT,
            critical_usage_percent: DEFAULT_CRITICAL_USAGE_PERCENT,
            min_calls_remaining: DEFAULT_MIN_CALLS_REMAINING,
        }
    }
}

impl GovernorConfig {
    /// Build a configuration from the defaults plus any `AUTOTASK_*`
    /// environment overrides
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// Missing keys keep their default. Present but unparseable values are
    /// a configuration error rather than being silently ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            max_concurrent: parse_or(&lookup, ENV_MAX_CONCURRENT, defaults.max_concurrent)?,
            check_every_n_calls: parse_or(
                &lookup,
                ENV_CHECK_EVERY_N_CALLS,
                defaults.check_every_n_calls,
            )?,
            high_usage_percent: parse_or(
                &lookup,
                ENV_HIGH_USAGE_PERCENT,
                defaults.high_usage_percent,
            )?,
            critical_usage_percent: parse_or(
                &lookup,
                ENV_CRITICAL_USAGE_PERCENT,
                defaults.critical_usage_percent,
            )?,
            min_calls_remaining: parse_or(
                &lookup,
                ENV_MIN_CALLS_REMAINING,
                defaults.min_calls_remaining,
            )?,
        };

        Ok(config.validate())
    }

    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        Self {
            max_concurrent: self.max_concurrent.max(1),
            check_every_n_calls: self.check_every_n_calls.max(1),
            high_usage_percent: self.high_usage_percent.clamp(0.0, 100.0),
            critical_usage_percent: self.critical_usage_percent.clamp(0.0, 100.0),
            min_calls_remaining: self.min_calls_remaining,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{} has an invalid value: {:?}", key, raw))),
        _ => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = GovernorConfig::default();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.check_every_n_calls, 19);
        assert_eq!(config.high_usage_percent, 50.0);
        assert_eq!(config.critical_usage_percent, 80.0);
        assert_eq!(config.min_calls_remaining, 100);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = GovernorConfig::from_lookup(lookup_from(&[
            (ENV_MAX_CONCURRENT, "4"),
            (ENV_MIN_CALLS_REMAINING, " 250 "),
        ]))
        .unwrap();

        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.min_calls_remaining, 250);
        assert_eq!(config.check_every_n_calls, DEFAULT_CHECK_EVERY_N_CALLS);
    }

    #[test]
    fn test_from_lookup_empty_value_keeps_default() {
        let config =
            GovernorConfig::from_lookup(lookup_from(&[(ENV_HIGH_USAGE_PERCENT, "")])).unwrap();
        assert_eq!(config.high_usage_percent, DEFAULT_HIGH_USAGE_PERCENT);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = GovernorConfig::from_lookup(lookup_from(&[(ENV_CHECK_EVERY_N_CALLS, "often")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(ENV_CHECK_EVERY_N_CALLS));
    }

    #[test]
    fn test_config_validate() {
        let config = GovernorConfig {
            max_concurrent: 0,
            check_every_n_calls: 0,
            high_usage_percent: 150.0,
            critical_usage_percent: -10.0,
            min_calls_remaining: 100,
        };

        let validated = config.validate();
        assert_eq!(validated.max_concurrent, 1);
        assert_eq!(validated.check_every_n_calls, 1);
        assert_eq!(validated.high_usage_percent, 100.0);
        assert_eq!(validated.critical_usage_percent, 0.0);
    }
}
