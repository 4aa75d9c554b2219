//! Quota tracking module
//!
//! Snapshot and tier types for the upstream call quota, and the probe
//! interface the governor polls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Governor                                                │
//! │   - every N governed calls: probe()                     │
//! │   - update_quota(snapshot) -> UsageTier                 │
//! └─────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ trait QuotaProbe                                        │
//! │   - probe() -> QuotaSnapshot                            │
//! └─────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ AutotaskClient (GET /ThresholdInformation)              │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod provider;
pub mod types;

// Re-export main types
pub use types::{QuotaSnapshot, UsageTier};

// Re-export probe trait and error
pub use provider::{QuotaError, QuotaProbe};
