//! Governor state
//!
//! The counters and quota tier the governor mutates under its lock, and the
//! read-only status view handed to observability tooling.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::config::{GovernorConfig, CRITICAL_CHECK_EVERY_N_CALLS};
use crate::services::quota::{QuotaSnapshot, UsageTier};

/// How long a blocked governor waits between recovery probes
pub const BLOCKED_RECHECK_INTERVAL_SECS: i64 = 60;

// ============================================================================
// Status
// ============================================================================

/// Read-only snapshot of the governor for status surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorStatus {
    /// Current usage tier
    pub tier: UsageTier,
    /// Requests currently executing
    pub active_count: usize,
    /// Current concurrency cap
    pub max_concurrent: usize,
    /// Concurrency cap while usage is normal
    pub configured_max_concurrent: usize,
    /// Requests waiting for a free slot
    pub queue_depth: usize,
    /// Calls executed since the last quota check
    pub calls_since_check: u32,
    /// Whether every request is currently refused
    pub blocked: bool,
    /// Whether usage is at or above the high-usage threshold
    pub high_usage: bool,
    /// Whether a quota check is running
    pub check_in_flight: bool,
    /// Most recent quota snapshot, if any check has succeeded
    pub last_snapshot: Option<QuotaSnapshot>,
}

// ============================================================================
// Tier Transition
// ============================================================================

/// Outcome of applying a snapshot, used for once-per-transition logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierTransition {
    pub from: UsageTier,
    pub to: UsageTier,
    pub previous_max: usize,
    pub max_concurrent: usize,
}

impl TierTransition {
    /// Whether the tier actually changed
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

// ============================================================================
// State
// ============================================================================

/// Mutable governor state, guarded by the governor's mutex
#[derive(Debug)]
pub struct GovernorState {
    config: GovernorConfig,
    pub active_count: usize,
    pub queue_depth: usize,
    pub calls_since_check: u32,
    pub last_snapshot: Option<QuotaSnapshot>,
    pub tier: UsageTier,
    pub high_usage: bool,
    pub blocked: bool,
    pub max_concurrent: usize,
    pub check_in_flight: bool,
    /// Completed quota checks, successful or not
    pub checks_completed: u64,
    /// Slots that must be retired as soon as they are released
    pub permit_debt: usize,
    last_check_at: Option<DateTime<Utc>>,
}

impl GovernorState {
    /// Create state for a fresh session
    pub fn new(config: GovernorConfig) -> Self {
        let config = config.validate();
        Self {
            max_concurrent: config.max_concurrent,
            config,
            active_count: 0,
            queue_depth: 0,
            calls_since_check: 0,
            last_snapshot: None,
            tier: UsageTier::Normal,
            high_usage: false,
            blocked: false,
            check_in_flight: false,
            checks_completed: 0,
            permit_debt: 0,
            last_check_at: None,
        }
    }

    /// The configuration this state was created with
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Calls between quota checks at the current usage level
    pub fn check_threshold(&self) -> u32 {
        match &self.last_snapshot {
            Some(snapshot) if snapshot.percent_used >= self.config.critical_usage_percent => self
                .config
                .check_every_n_calls
                .min(CRITICAL_CHECK_EVERY_N_CALLS),
            _ => self.config.check_every_n_calls,
        }
    }

    /// Whether a quota check is due and none is running
    pub fn should_check(&self) -> bool {
        !self.check_in_flight && self.calls_since_check >= self.check_threshold()
    }

    /// Whether a blocked governor should probe again to detect recovery
    pub fn recheck_due(&self, now: DateTime<Utc>) -> bool {
        if self.check_in_flight {
            return false;
        }
        match self.last_check_at {
            Some(at) => now - at >= Duration::seconds(BLOCKED_RECHECK_INTERVAL_SECS),
            None => true,
        }
    }

    /// Record that a quota check finished, whatever its outcome
    pub fn finish_check(&mut self, now: DateTime<Utc>) {
        self.check_in_flight = false;
        self.checks_completed += 1;
        self.calls_since_check = 0;
        self.last_check_at = Some(now);
    }

    /// Apply a quota snapshot and recompute the tier
    ///
    /// Applying the same snapshot twice leaves the state exactly as applying
    /// it once.
    pub fn apply_snapshot(&mut self, snapshot: QuotaSnapshot) -> TierTransition {
        let from = self.tier;
        let previous_max = self.max_concurrent;

        let tier = UsageTier::from_snapshot(
            &snapshot,
            self.config.high_usage_percent,
            self.config.critical_usage_percent,
            self.config.min_calls_remaining,
        );

        self.high_usage = snapshot.percent_used >= self.config.high_usage_percent;
        self.blocked = tier == UsageTier::Blocked;
        self.tier = tier;
        self.max_concurrent = if tier.is_throttled() {
            1
        } else {
            self.config.max_concurrent
        };
        self.calls_since_check = 0;
        self.last_snapshot = Some(snapshot);

        TierTransition {
            from,
            to: tier,
            previous_max,
            max_concurrent: self.max_concurrent,
        }
    }

    /// Calls left and time to reset, as reported in a refusal
    pub fn exhaustion_details(&self) -> (i64, String) {
        match &self.last_snapshot {
            Some(snapshot) => (snapshot.remaining(), snapshot.window_remaining.clone()),
            None => (0, "unknown".to_string()),
        }
    }

    /// Build the read-only status view
    pub fn status(&self) -> GovernorStatus {
        GovernorStatus {
            tier: self.tier,
            active_count: self.active_count,
            max_concurrent: self.max_concurrent,
            configured_max_concurrent: self.config.max_concurrent,
            queue_depth: self.queue_depth,
            calls_since_check: self.calls_since_check,
            blocked: self.blocked,
            high_usage: self.high_usage,
            check_in_flight: self.check_in_flight,
            last_snapshot: self.last_snapshot.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
