//! Quota command
//!
//! Reads the threshold information once and shows how the governor would
//! classify it.

use anyhow::{Context as _, Result};
use autotask_core::{Governor, QuotaSnapshot, UsageTier};
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{print_info, print_single, print_warning, OutputFormat};

/// Quota row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct QuotaRow {
    #[tabled(rename = "Used")]
    pub used: u64,
    #[tabled(rename = "Limit")]
    pub limit: u64,
    #[tabled(rename = "Remaining")]
    pub remaining: i64,
    #[tabled(rename = "Usage")]
    pub usage: String,
    #[tabled(rename = "Resets")]
    pub resets: String,
    #[tabled(rename = "Tier")]
    pub tier: UsageTier,
    #[tabled(rename = "Max Concurrent")]
    pub max_concurrent: usize,
}

pub async fn execute(ctx: &Context) -> Result<()> {
    let client = ctx.connection.client()?;

    let snapshot = client
        .threshold_information()
        .await
        .with_context(|| format!("Failed to read quota from {}", client.base_url()))?;

    let governor = Governor::new(ctx.governor_config.clone());
    let tier = governor.update_quota(snapshot.clone());
    let row = quota_row(&snapshot, tier, governor.status().max_concurrent);

    print_single(&row, ctx.format)?;

    if ctx.format == OutputFormat::Table {
        match tier {
            UsageTier::Normal => print_info("Usage is normal.", ctx.quiet),
            UsageTier::HighUsage => print_warning("High usage: requests will run one at a time."),
            UsageTier::Critical => {
                print_warning("Critical usage: requests run one at a time with frequent quota checks.")
            }
            UsageTier::Blocked => print_warning(&format!(
                "Quota nearly exhausted: requests are refused until the window resets {}.",
                snapshot.window_remaining
            )),
        }
    }

    Ok(())
}

fn quota_row(snapshot: &QuotaSnapshot, tier: UsageTier, max_concurrent: usize) -> QuotaRow {
    QuotaRow {
        used: snapshot.used,
        limit: snapshot.limit,
        remaining: snapshot.remaining(),
        usage: format!("{:.1}%", snapshot.percent_used),
        resets: snapshot.window_remaining.clone(),
        tier,
        max_concurrent,
    }
}
