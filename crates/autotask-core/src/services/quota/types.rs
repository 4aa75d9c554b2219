//! Quota tracking types
//!
//! Types describing how much of the upstream call quota has been consumed
//! and which usage tier that puts the client in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Snapshot Types
// ============================================================================

/// A point-in-time snapshot of quota usage
///
/// Produced by a [`QuotaProbe`](super::QuotaProbe). Snapshots are never
/// mutated; a newer snapshot simply supersedes the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Calls consumed in the current window
    pub used: u64,
    /// Calls allowed per window (0 when unknown)
    pub limit: u64,
    /// Percentage of quota used (0.0 - 100.0)
    pub percent_used: f64,
    /// Human-readable time until the window rolls over
    pub window_remaining: String,
    /// When this snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    /// Create a new quota snapshot, deriving `percent_used`
    pub fn new(used: u64, limit: u64, window_remaining: impl Into<String>) -> Self {
        let percent_used = if limit > 0 {
            used as f64 / limit as f64 * 100.0
        } else {
            0.0
        };

        Self {
            used,
            limit,
            percent_used,
            window_remaining: window_remaining.into(),
            captured_at: Utc::now(),
        }
    }

    /// Calls left before the limit is reached
    ///
    /// Negative when the upstream counter has overshot the limit.
    pub fn remaining(&self) -> i64 {
        self.limit as i64 - self.used as i64
    }
}

// ============================================================================
// Usage Tier
// ============================================================================

/// Usage tier derived from a quota snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageTier {
    /// Below the high-usage threshold
    #[default]
    Normal,
    /// Between the high-usage and critical thresholds
    HighUsage,
    /// At or above the critical threshold
    Critical,
    /// Fewer calls remain than the configured floor
    Blocked,
}

impl UsageTier {
    /// Determine the tier for a snapshot
    ///
    /// `Blocked` overrides the percentage tiers. A snapshot with an unknown
    /// limit (0) never blocks.
    pub fn from_snapshot(
        snapshot: &QuotaSnapshot,
        high_usage_percent: f64,
        critical_usage_percent: f64,
        min_calls_remaining: u64,
    ) -> Self {
        if snapshot.limit > 0 && snapshot.remaining() < min_calls_remaining as i64 {
            UsageTier::Blocked
        } else if snapshot.percent_used >= critical_usage_percent {
            UsageTier::Critical
        } else if snapshot.percent_used >= high_usage_percent {
            UsageTier::HighUsage
        } else {
            UsageTier::Normal
        }
    }

    /// Whether this tier forces serial execution
    pub fn is_throttled(self) -> bool {
        !matches!(self, UsageTier::Normal)
    }
}

impl std::fmt::Display for UsageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageTier::Normal => write!(f, "normal"),
            UsageTier::HighUsage => write!(f, "high_usage"),
            UsageTier::Critical => write!(f, "critical"),
            UsageTier::Blocked => write!(f, "blocked"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_percent_used() {
        let snapshot = QuotaSnapshot::new(2500, 10000, "within 60 minutes");
        assert_eq!(snapshot.percent_used, 25.0);
        assert_eq!(snapshot.remaining(), 7500);
    }

    #[test]
    fn test_snapshot_unknown_limit() {
        let snapshot = QuotaSnapshot::new(120, 0, "unknown");
        assert_eq!(snapshot.percent_used, 0.0);
    }

    #[test]
    fn test_snapshot_overshoot() {
        let snapshot = QuotaSnapshot::new(10050, 10000, "soon");
        assert_eq!(snapshot.remaining(), -50);
    }

    #[test]
    fn test_tier_from_snapshot() {
        let tier = |used| {
            UsageTier::from_snapshot(&QuotaSnapshot::new(used, 10000, ""), 50.0, 80.0, 100)
        };

        assert_eq!(tier(4999), UsageTier::Normal);
        assert_eq!(tier(5000), UsageTier::HighUsage);
        assert_eq!(tier(7999), UsageTier::HighUsage);
        assert_eq!(tier(8000), UsageTier::Critical);
        assert_eq!(tier(9900), UsageTier::Critical);
        assert_eq!(tier(9901), UsageTier::Blocked);
    }

    #[test]
    fn test_tier_unknown_limit_never_blocks() {
        let snapshot = QuotaSnapshot::new(50, 0, "");
        assert_eq!(
            UsageTier::from_snapshot(&snapshot, 50.0, 80.0, 100),
            UsageTier::Normal
        );
    }

    #[test]
    fn test_tier_display_matches_serde() {
        for tier in [
            UsageTier::Normal,
            UsageTier::HighUsage,
            UsageTier::Critical,
            UsageTier::Blocked,
        ] {
            assert_eq!(
                serde_json::to_value(tier).unwrap(),
                serde_json::Value::String(tier.to_string())
            );
        }
    }

    #[test]
    fn test_tier_is_throttled() {
        assert!(!UsageTier::Normal.is_throttled());
        assert!(UsageTier::HighUsage.is_throttled());
        assert!(UsageTier::Critical.is_throttled());
        assert!(UsageTier::Blocked.is_throttled());
    }
}
