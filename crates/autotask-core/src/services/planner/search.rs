//! Date-bounded searches for "latest N" queries
//!
//! The reverse window search widens a trailing window until it contains
//! something. A window holding too many records is narrowed by halving the
//! date range, newest half first, until a segment fits in one page.

use std::future::Future;

use chrono::{Duration, Utc};

use super::filter::QueryFilter;
use super::pagination::page_count;
use super::segment::{format_timestamp, DateSegment};
use super::strategy::QueryPlanner;
use super::types::{QueryPlanResult, StrategyUsed};
use crate::error::Result;

impl QueryPlanner {
    pub(super) async fn reverse_window_search<T, F, Fut>(
        &self,
        entity: &str,
        base_filters: &[QueryFilter],
        date_field: &str,
        total: u64,
        fetch: &F,
    ) -> Result<QueryPlanResult<T>>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let settings = self.settings();
        let page_size = settings.page_size as u64;
        let now = Utc::now();
        let mut windows_searched = 0;

        for &days in &settings.time_windows_days {
            windows_searched += 1;
            let window = DateSegment::last_days(now, days);

            // Bounded above by `now` so the count covers exactly the range
            // the date search narrows; future-dated records are not recent.
            let filters = with_segment(base_filters, date_field, &window);

            let count = self.count(entity, &filters).await?;
            log::debug!(
                "[planner] {} window {}: {} records",
                entity,
                window.label,
                count
            );

            if count == 0 {
                continue;
            }

            if count > settings.warn_threshold {
                return self
                    .binary_search(
                        entity,
                        base_filters,
                        date_field,
                        window,
                        total,
                        windows_searched,
                        fetch,
                    )
                    .await;
            }

            let (items, pages) = if count <= page_size {
                let items = self.fetch_page(entity, fetch, &filters, None).await?;
                (items, 1)
            } else {
                let pages = page_count(count, settings.page_size, settings.window_max_pages());
                self.fetch_pages(entity, fetch, &filters, pages).await?
            };

            let message = format!(
                "Found {} {} records from the last {} days ({} total).",
                items.len(),
                entity,
                days,
                total
            );
            return Ok(
                QueryPlanResult::new(items, total, StrategyUsed::ReverseWindow, message)
                    .with_windows_searched(windows_searched)
                    .with_pages_searched(pages),
            );
        }

        let widest = settings.time_windows_days.last().copied().unwrap_or_default();
        let items = self.fetch_page(entity, fetch, base_filters, Some(1)).await?;
        let message = format!(
            "Showing the oldest {} of {} {} records.",
            items.len(),
            total,
            entity
        );
        let warning = format!(
            "No {} activity found in the last {} days; these are the oldest matching records, not the most recent.",
            entity, widest
        );

        Ok(
            QueryPlanResult::new(items, total, StrategyUsed::ReverseWindow, message)
                .with_warning(warning)
                .with_windows_searched(windows_searched)
                .with_pages_searched(1),
        )
    }

    /// Narrow `range` until a segment holds between 1 and `page_size`
    /// records, preferring the newer half
    ///
    /// Runs over an explicit work stack. Gives up, falling back to the first
    /// page of the unbounded query, when both halves are empty, the depth
    /// limit is reached, or a segment is narrower than one second.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn binary_search<T, F, Fut>(
        &self,
        entity: &str,
        base_filters: &[QueryFilter],
        date_field: &str,
        range: DateSegment,
        total: u64,
        windows_searched: u32,
        fetch: &F,
    ) -> Result<QueryPlanResult<T>>
    where
        F: Fn(Vec<QueryFilter>, usize, Option<u32>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let page_size = self.settings().page_size as u64;
        let max_depth = self.settings().max_search_depth;
        let mut stack = vec![(range, 0u32)];

        while let Some((segment, depth)) = stack.pop() {
            if depth >= max_depth || segment.width() < Duration::seconds(1) {
                log::debug!(
                    "[planner] Date search for {} stopped at depth {} ({})",
                    entity,
                    depth,
                    segment.label
                );
                break;
            }

            let (lower, upper) = segment.split();

            for half in [upper, lower] {
                let filters = with_segment(base_filters, date_field, &half);
                let count = self.count(entity, &filters).await?;
                log::debug!(
                    "[planner] {} segment {}: {} records (depth {})",
                    entity,
                    half.label,
                    count,
                    depth
                );

                if count == 0 {
                    continue;
                }

                if count <= page_size {
                    let items = self.fetch_page(entity, fetch, &filters, None).await?;
                    let message = format!(
                        "Found {} {} records between {} and {} ({} total).",
                        items.len(),
                        entity,
                        format_timestamp(half.start),
                        format_timestamp(half.end),
                        total
                    );
                    return Ok(QueryPlanResult::new(
                        items,
                        total,
                        StrategyUsed::BinarySearch,
                        message,
                    )
                    .with_windows_searched(windows_searched)
                    .with_pages_searched(1));
                }

                stack.push((half, depth + 1));
                break;
            }
        }

        let items = self.fetch_page(entity, fetch, base_filters, Some(1)).await?;
        let message = format!(
            "Showing the oldest {} of {} {} records.",
            items.len(),
            total,
            entity
        );
        let warning = format!(
            "Could not narrow {} {} records to a date range of at most {} records; \
             these are the oldest matching records. Add a {} range or other filters.",
            total, entity, page_size, date_field
        );

        Ok(
            QueryPlanResult::new(items, total, StrategyUsed::BinarySearch, message)
                .with_warning(warning)
                .with_windows_searched(windows_searched)
                .with_pages_searched(1),
        )
    }
}

fn with_segment(base: &[QueryFilter], date_field: &str, segment: &DateSegment) -> Vec<QueryFilter> {
    let mut filters = base.to_vec();
    filters.extend(segment.filters(date_field));
    filters
}
