//! Query strategy selection
//!
//! [`QueryPlanner::execute`] sizes a query with one count call, then picks
//! the cheapest plan that keeps the result bounded:
//!
//! ```text
//! total <= page_size           -> Direct
//! latest-N query               -> ReverseWindow (may escalate to BinarySearch)
//! total >  max_results         -> Paginated, first page only, with warning
//! otherwise                    -> Paginated, up to max_pages pages
//! ```
//!
//! Every count and fetch runs through the governor.

use std::future::Future;
use std::sync::Arc;

use super::filter::QueryFilter;
use super::pagination::{page_count, trim_page};
use super::types::{PlannerSettings, QueryPlanResult, RecordCounter, StrategyUsed};
use crate::error::Result;
use crate::services::governor::Governor;

/// Chooses and drives a fetch plan for filtered queries
pub struct QueryPlanner {
    governor: Governor,
    counter: Arc<dyn RecordCounter>,
    settings: PlannerSettings,
}

impl QueryPlanner {
    /// Create a planner with the default limits
    pub fn new(governor: Governor, counter: Arc<dyn RecordCounter>) -> Self {
        Self {
            governor,
            counter,
            settings: PlannerSettings::default(),
        }
    }

    /// Replace the planner limits
    pub fn with_settings(mut self, settings: PlannerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Plan and run a query
    ///
    /// `fetch(filters, page_size, page)` performs one page fetch; the planner
    /// wraps each call in the governor, so `fetch` must not.
    ///
    /// # Errors
    ///
    /// Fetch failures and governor refusals propagate. Count failures do
    /// not: a failed count is treated as zero matching records.
    pub async fn execute<T, F, Fut>(
        &self,
        entity: &str,
        base_filters: &[QueryFilter],
        is_latest_query: bool,
        date_field: &str,
        fetch: F,
    ) -> Result<QueryPlanResult<T>>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let total = self.count(entity, base_filters).await?;
        let page_size = self.settings.page_size as u64;

        log::debug!(
            "[planner] {} matches {} records (latest={}, page_size={})",
            entity,
            total,
            is_latest_query,
            page_size
        );

        if total <= page_size {
            return self.direct(entity, base_filters, total, &fetch).await;
        }

        if is_latest_query {
            return self
                .reverse_window_search(entity, base_filters, date_field, total, &fetch)
                .await;
        }

        if total > self.settings.max_results {
            return self
                .first_page_only(entity, base_filters, date_field, total, &fetch)
                .await;
        }

        self.paginated(entity, base_filters, date_field, total, &fetch)
            .await
    }

    async fn direct<T, F, Fut>(
        &self,
        entity: &str,
        filters: &[QueryFilter],
        total: u64,
        fetch: &F,
    ) -> Result<QueryPlanResult<T>>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let items = self.fetch_page(entity, fetch, filters, None).await?;
        let message = if items.is_empty() {
            format!("No {} records match the given filters.", entity)
        } else {
            format!("Found {} {} records.", items.len(), entity)
        };

        Ok(QueryPlanResult::new(items, total, StrategyUsed::Direct, message).with_pages_searched(1))
    }

    async fn first_page_only<T, F, Fut>(
        &self,
        entity: &str,
        filters: &[QueryFilter],
        date_field: &str,
        total: u64,
        fetch: &F,
    ) -> Result<QueryPlanResult<T>>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let items = self.fetch_page(entity, fetch, filters, Some(1)).await?;
        let message = format!(
            "Showing the first {} of {} {} records.",
            items.len(),
            total,
            entity
        );
        let warning = format!(
            "{} {} records match this query, more than the {} that can be retrieved. \
             Narrow it with additional filters such as a {} range, status, or company.",
            total, entity, self.settings.max_results, date_field
        );

        Ok(
            QueryPlanResult::new(items, total, StrategyUsed::Paginated, message)
                .with_warning(warning)
                .with_pages_searched(1),
        )
    }

    async fn paginated<T, F, Fut>(
        &self,
        entity: &str,
        filters: &[QueryFilter],
        date_field: &str,
        total: u64,
        fetch: &F,
    ) -> Result<QueryPlanResult<T>>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let pages = page_count(total, self.settings.page_size, self.settings.max_pages);
        let (items, fetched) = self.fetch_pages(entity, fetch, filters, pages).await?;

        let message = format!(
            "Retrieved {} of {} {} records across {} pages.",
            items.len(),
            total,
            entity,
            fetched
        );
        let mut result = QueryPlanResult::new(items, total, StrategyUsed::Paginated, message)
            .with_pages_searched(fetched);

        if total > self.settings.warn_threshold {
            result = result.with_warning(format!(
                "Large result set: {} {} records. Consider narrowing the query with a {} range.",
                total, entity, date_field
            ));
        }

        Ok(result)
    }

    // ========================================================================
    // Governed calls
    // ========================================================================

    /// Count through the governor, treating transport failures as zero
    pub(super) async fn count(&self, entity: &str, filters: &[QueryFilter]) -> Result<u64> {
        let label = format!("count {}", entity);
        let counted = self
            .governor
            .run(&label, || self.counter.count(entity, filters))
            .await;

        match counted {
            Ok(count) => Ok(count),
            Err(e) if e.is_quota_exhausted() => Err(e),
            Err(e) => {
                log::warn!("[planner] Count for {} failed, treating as 0: {}", entity, e);
                Ok(0)
            }
        }
    }

    /// Fetch one page through the governor, trimmed to the page size
    pub(super) async fn fetch_page<T, F, Fut>(
        &self,
        entity: &str,
        fetch: &F,
        filters: &[QueryFilter],
        page: Option<u32>,
    ) -> Result<Vec<T>>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let page_size = self.settings.page_size;
        let label = format!("fetch {}", entity);
        let items = self
            .governor
            .run(&label, || fetch(filters.to_vec(), page_size, page))
            .await?;

        if items.len() > page_size {
            log::debug!(
                "[planner] {} returned {} records for page size {}, trimming",
                entity,
                items.len(),
                page_size
            );
        }
        Ok(trim_page(items, page_size))
    }

    /// Fetch pages `1..=pages`, stopping at the first short page
    pub(super) async fn fetch_pages<T, F, Fut>(
        &self,
        entity: &str,
        fetch: &F,
        filters: &[QueryFilter],
        pages: u32,
    ) -> Result<(Vec<T>, u32)>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let mut items = Vec::new();
        let mut fetched = 0;

        for page in 1..=pages {
            let batch = self.fetch_page(entity, fetch, filters, Some(page)).await?;
            fetched += 1;
            let short = batch.len() < self.settings.page_size;
            items.extend(batch);
            if short {
                break;
            }
        }

        Ok((items, fetched))
    }
}
