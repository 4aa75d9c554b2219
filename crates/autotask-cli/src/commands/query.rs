//! Query command
//!
//! Runs one planned query: the planner counts first, then fetches with the
//! cheapest strategy that keeps the result bounded. All calls go through a
//! governor probing quota from the same client.

use std::sync::Arc;

use anyhow::Result;
use autotask_core::services::planner::resolve_page_size;
use autotask_core::{
    is_latest_query, Governor, GovernorStatus, PlannerSettings, QueryFilter, QueryPlanResult,
    QueryPlanner,
};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use super::Context;
use crate::output::{print_info, print_json, print_output, print_single, print_warning, OutputFormat};

/// Fields tried, in order, for a one-line record summary
const SUMMARY_FIELDS: [&str; 5] = ["title", "name", "companyName", "subject", "description"];

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Entity to query (e.g. Tickets, Companies, TimeEntries)
    pub entity: String,

    /// Filter as field:op:value, repeatable (e.g. status:eq:1, id:exist)
    #[arg(long = "filter", short = 'f')]
    pub filters: Vec<String>,

    /// Date field used to find the most recent records
    #[arg(long, default_value = "createDate")]
    pub date_field: String,

    /// Don't search for the most recent records; take pages in API order
    #[arg(long)]
    pub oldest_first: bool,

    /// Records per page (max 500; 0 or negative means the max)
    #[arg(long, allow_negative_numbers = true)]
    pub page_size: Option<i64>,
}

/// Plan summary for table display
#[derive(Debug, Serialize, Tabled)]
pub struct PlanRow {
    #[tabled(rename = "Strategy")]
    pub strategy: String,
    #[tabled(rename = "Total")]
    pub total: u64,
    #[tabled(rename = "Returned")]
    pub returned: usize,
    #[tabled(rename = "Windows")]
    pub windows: u32,
    #[tabled(rename = "Pages")]
    pub pages: u32,
}

/// One record, reduced for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ItemRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Summary")]
    pub summary: String,
}

/// Full JSON output: the plan result plus governor state afterwards
#[derive(Debug, Serialize)]
struct QueryOutput {
    #[serde(flatten)]
    result: QueryPlanResult<Value>,
    governor: GovernorStatus,
}

pub async fn execute(ctx: &Context, args: QueryArgs) -> Result<()> {
    let filters = args
        .filters
        .iter()
        .map(|expr| QueryFilter::parse(expr))
        .collect::<autotask_core::Result<Vec<_>>>()?;

    let client = Arc::new(ctx.connection.client()?);
    let governor = Governor::with_probe(ctx.governor_config.clone(), client.clone());
    let settings = PlannerSettings::default().with_page_size(resolve_page_size(args.page_size));
    let planner = QueryPlanner::new(governor.clone(), client.clone()).with_settings(settings);

    let latest = !args.oldest_first && is_latest_query(&filters, &args.date_field);
    print_info(
        &format!(
            "Querying {} ({} filters{})...",
            args.entity,
            filters.len(),
            if latest { ", most recent first" } else { "" }
        ),
        ctx.quiet || ctx.format == OutputFormat::Json,
    );

    let entity = args.entity.as_str();
    let result = planner
        .execute(entity, &filters, latest, &args.date_field, |filters, page_size, page| {
            client.query_page::<Value>(entity, filters, page_size, page)
        })
        .await?;

    match ctx.format {
        OutputFormat::Json => print_json(&QueryOutput {
            result,
            governor: governor.status(),
        })?,
        OutputFormat::Table => {
            print_table(ctx, &result, &args.date_field)?;
            print_governor(ctx, &governor.status());
        }
    }

    Ok(())
}

fn print_table(ctx: &Context, result: &QueryPlanResult<Value>, date_field: &str) -> Result<()> {
    let plan = PlanRow {
        strategy: result.strategy_used.to_string(),
        total: result.total_count,
        returned: result.items.len(),
        windows: result.windows_searched,
        pages: result.pages_searched,
    };
    print_single(&plan, ctx.format)?;

    let rows: Vec<ItemRow> = result
        .items
        .iter()
        .map(|item| item_row(item, date_field))
        .collect();
    print_output(&rows, ctx.format)?;

    print_info(&result.message, ctx.quiet);
    if let Some(warning) = &result.warning {
        print_warning(warning);
    }
    Ok(())
}

fn print_governor(ctx: &Context, status: &GovernorStatus) {
    let quota = match &status.last_snapshot {
        Some(snapshot) => format!(
            "{}/{} calls used ({:.1}%)",
            snapshot.used, snapshot.limit, snapshot.percent_used
        ),
        None => "quota not checked".to_string(),
    };
    print_info(
        &format!(
            "Governor: {} tier, max {} concurrent, {} calls since last check, {}",
            status.tier, status.max_concurrent, status.calls_since_check, quota
        ),
        ctx.quiet,
    );
}

fn item_row(item: &Value, date_field: &str) -> ItemRow {
    let summary = SUMMARY_FIELDS
        .iter()
        .find_map(|field| item.get(*field).and_then(Value::as_str))
        .unwrap_or_default();

    ItemRow {
        id: item.get("id").map(display_value).unwrap_or_default(),
        date: item.get(date_field).map(display_value).unwrap_or_default(),
        summary: truncate(summary, 60),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
