//! Date segments used to bound a query's date field

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::filter::QueryFilter;

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

impl DateSegment {
    /// Create a segment labelled with its bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let label = format!(
            "{}..{}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        );
        Self { start, end, label }
    }

    /// The trailing `days` days ending at `now`
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
            label: format!("last {} days", days),
        }
    }

    pub fn width(&self) -> Duration {
        self.end - self.start
    }

    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + self.width() / 2
    }

    /// Split at the midpoint into `(lower, upper)`
    pub fn split(&self) -> (DateSegment, DateSegment) {
        let mid = self.midpoint();
        (
            DateSegment::new(self.start, mid),
            DateSegment::new(mid, self.end),
        )
    }

    /// Filters restricting `field` to this segment
    pub fn filters(&self, field: &str) -> Vec<QueryFilter> {
        vec![
            QueryFilter::gte(field, format_timestamp(self.start)),
            QueryFilter::lt(field, format_timestamp(self.end)),
        ]
    }
}

/// Render a timestamp the way the API expects in filter values
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
