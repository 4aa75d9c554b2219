//! Planner types
//!
//! Strategy names, the result returned from a planned query, and the limits
//! the planner works within.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::filter::QueryFilter;
use super::pagination::DEFAULT_PAGE_SIZE;
use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Result size above which the planner warns or narrows
pub const DEFAULT_WARN_THRESHOLD: u64 = 2500;

/// Result size above which only the first page is fetched
pub const DEFAULT_MAX_RESULTS: u64 = 5000;

/// Maximum pages fetched by a paginated plan
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// Reverse search windows, smallest first
pub const DEFAULT_TIME_WINDOWS_DAYS: [i64; 5] = [30, 90, 180, 365, 730];

/// Maximum number of halvings in a date binary search
pub const DEFAULT_MAX_SEARCH_DEPTH: u32 = 20;

// ============================================================================
// Strategy
// ============================================================================

/// Fetch plan chosen for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyUsed {
    /// Everything fit in one page
    Direct,
    /// Newest records found by widening a trailing time window
    ReverseWindow,
    /// Newest records found by halving a date range
    BinarySearch,
    /// Page-by-page fetch, capped
    Paginated,
}

impl std::fmt::Display for StrategyUsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyUsed::Direct => write!(f, "direct"),
            StrategyUsed::ReverseWindow => write!(f, "reverse_window"),
            StrategyUsed::BinarySearch => write!(f, "binary_search"),
            StrategyUsed::Paginated => write!(f, "paginated"),
        }
    }
}

// ============================================================================
// Result
// ============================================================================

/// Outcome of a planned query
///
/// Callers should surface `message` and `warning`, not just `items`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlanResult<T> {
    pub items: Vec<T>,
    /// Records matching the unbounded query
    pub total_count: u64,
    pub strategy_used: StrategyUsed,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub windows_searched: u32,
    pub pages_searched: u32,
}

impl<T> QueryPlanResult<T> {
    pub fn new(
        items: Vec<T>,
        total_count: u64,
        strategy_used: StrategyUsed,
        message: impl Into<String>,
    ) -> Self {
        Self {
            items,
            total_count,
            strategy_used,
            message: message.into(),
            warning: None,
            windows_searched: 0,
            pages_searched: 0,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_windows_searched(mut self, windows: u32) -> Self {
        self.windows_searched = windows;
        self
    }

    pub fn with_pages_searched(mut self, pages: u32) -> Self {
        self.pages_searched = pages;
        self
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Limits the planner works within
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    pub page_size: usize,
    pub warn_threshold: u64,
    pub max_results: u64,
    pub max_pages: u32,
    pub time_windows_days: Vec<i64>,
    pub max_search_depth: u32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            max_pages: DEFAULT_MAX_PAGES,
            time_windows_days: DEFAULT_TIME_WINDOWS_DAYS.to_vec(),
            max_search_depth: DEFAULT_MAX_SEARCH_DEPTH,
        }
    }
}

impl PlannerSettings {
    /// Use a different page size, keeping the other limits
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pages allowed when paginating inside a reverse-search window
    pub fn window_max_pages(&self) -> u32 {
        ((self.warn_threshold / self.page_size.max(1) as u64) as u32).max(1)
    }
}

// ============================================================================
// Count Probe
// ============================================================================

/// Counts records matching a filter set without fetching them
#[async_trait]
pub trait RecordCounter: Send + Sync {
    async fn count(&self, entity: &str, filters: &[QueryFilter]) -> Result<u64>;
}
