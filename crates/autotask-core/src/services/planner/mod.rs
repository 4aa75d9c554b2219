//! Query strategy planner
//!
//! Keeps every query bounded: the upstream API truncates oversized pages and
//! charges every call against the quota, so the planner counts before it
//! fetches and never pulls more than `max_results` records.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use autotask_core::services::governor::{Governor, GovernorConfig};
//! use autotask_core::services::planner::{is_latest_query, QueryFilter, QueryPlanner};
//!
//! let governor = Governor::new(GovernorConfig::default());
//! let planner = QueryPlanner::new(governor, Arc::new(client.clone()));
//!
//! let filters = vec![QueryFilter::eq("status", 1)];
//! let latest = is_latest_query(&filters, "createDate");
//! let result = planner
//!     .execute("Tickets", &filters, latest, "createDate", |filters, page_size, page| {
//!         client.query_page("Tickets", filters, page_size, page)
//!     })
//!     .await?;
//! println!("{}", result.message);
//! ```

pub mod filter;
pub mod pagination;
mod search;
pub mod segment;
pub mod strategy;
pub mod types;

pub use filter::{is_latest_query, FilterOp, QueryFilter};
pub use pagination::{page_count, resolve_page_size, trim_page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use segment::{format_timestamp, DateSegment};
pub use strategy::QueryPlanner;
pub use types::{
    PlannerSettings, QueryPlanResult, RecordCounter, StrategyUsed, DEFAULT_MAX_PAGES,
    DEFAULT_MAX_RESULTS, DEFAULT_MAX_SEARCH_DEPTH, DEFAULT_TIME_WINDOWS_DAYS,
    DEFAULT_WARN_THRESHOLD,
};
