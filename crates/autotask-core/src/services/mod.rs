//! Services module

pub mod autotask;
pub mod governor;
pub mod planner;
pub mod quota;

pub use autotask::{AutotaskClient, AutotaskCredentials};
pub use governor::{Governor, GovernorConfig, GovernorStatus};
pub use planner::{
    is_latest_query, resolve_page_size, FilterOp, PlannerSettings, QueryFilter, QueryPlanResult,
    QueryPlanner, RecordCounter, StrategyUsed,
};
pub use quota::{QuotaError, QuotaProbe, QuotaSnapshot, UsageTier};
