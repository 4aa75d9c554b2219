//! Request governor
//!
//! Bounds in-flight upstream requests and tracks consumed quota.
//!
//! # Usage tiers
//!
//! ```text
//!  percent used                        effect
//!  ───────────────────────────────────────────────────────────────
//!  < high                  Normal      configured concurrency
//!  high ..< critical       HighUsage   1 request at a time
//!  >= critical             Critical    1 at a time, check every 9 calls
//!  remaining < floor       Blocked     every call refused
//! ```

pub mod config;
pub mod service;
pub mod state;

pub use config::{
    GovernorConfig, CRITICAL_CHECK_EVERY_N_CALLS, DEFAULT_CHECK_EVERY_N_CALLS,
    DEFAULT_CRITICAL_USAGE_PERCENT, DEFAULT_HIGH_USAGE_PERCENT, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MIN_CALLS_REMAINING,
};
pub use service::Governor;
pub use state::{GovernorStatus, BLOCKED_RECHECK_INTERVAL_SECS};
