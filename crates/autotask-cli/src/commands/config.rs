//! Config commands
//!
//! Shows the governor limits and connection settings in effect. Everything
//! is read from flags and `AUTOTASK_*` environment variables; nothing is
//! persisted.

use anyhow::{bail, Result};
use autotask_core::services::governor::config::{
    ENV_CHECK_EVERY_N_CALLS, ENV_CRITICAL_USAGE_PERCENT, ENV_HIGH_USAGE_PERCENT,
    ENV_MAX_CONCURRENT, ENV_MIN_CALLS_REMAINING,
};
use autotask_core::GovernorConfig;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use super::{ConnectionArgs, Context};
use crate::output::{print_info, print_output};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key (e.g. AUTOTASK_MAX_CONCURRENT)
        key: String,
    },
}

/// Config row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

pub async fn execute(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(ctx),
        ConfigAction::Get { key } => get_config(ctx, key),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let rows = config_rows(&ctx.governor_config, &ctx.connection, env_is_set);
    print_output(&rows, ctx.format)?;
    Ok(())
}

fn get_config(ctx: &Context, key: String) -> Result<()> {
    let rows = config_rows(&ctx.governor_config, &ctx.connection, env_is_set);

    match rows.iter().find(|r| r.key.eq_ignore_ascii_case(&key)) {
        Some(row) => {
            print_info(&format!("{} = {}", row.key, row.value), ctx.quiet);
            Ok(())
        }
        None => {
            let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
            bail!("Config key not found: {} (available: {})", key, keys.join(", "))
        }
    }
}

fn env_is_set(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Rows for every setting, with where each value came from
fn config_rows<F>(config: &GovernorConfig, connection: &ConnectionArgs, env_is_set: F) -> Vec<ConfigRow>
where
    F: Fn(&str) -> bool,
{
    let governor = [
        (ENV_MAX_CONCURRENT, config.max_concurrent.to_string()),
        (ENV_CHECK_EVERY_N_CALLS, config.check_every_n_calls.to_string()),
        (ENV_HIGH_USAGE_PERCENT, config.high_usage_percent.to_string()),
        (ENV_CRITICAL_USAGE_PERCENT, config.critical_usage_percent.to_string()),
        (ENV_MIN_CALLS_REMAINING, config.min_calls_remaining.to_string()),
    ];

    let mut rows: Vec<ConfigRow> = governor
        .into_iter()
        .map(|(key, value)| ConfigRow {
            key: key.to_string(),
            value,
            source: if env_is_set(key) { "env" } else { "default" }.to_string(),
        })
        .collect();

    let connection_rows = [
        ("AUTOTASK_API_URL", &connection.api_url, false),
        ("AUTOTASK_USERNAME", &connection.username, false),
        ("AUTOTASK_SECRET", &connection.secret, true),
        ("AUTOTASK_INTEGRATION_CODE", &connection.integration_code, true),
    ];

    for (key, value, secret) in connection_rows {
        let (value, source) = match value.as_deref().filter(|v| !v.is_empty()) {
            Some(_) if secret => ("****".to_string(), source_of(key, &env_is_set)),
            Some(v) => (v.to_string(), source_of(key, &env_is_set)),
            None => ("Not set".to_string(), "n/a".to_string()),
        };
        rows.push(ConfigRow {
            key: key.to_string(),
            value,
            source,
        });
    }

    rows
}

fn source_of<F: Fn(&str) -> bool>(key: &str, env_is_set: &F) -> String {
    if env_is_set(key) { "env" } else { "flag" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<'a>(rows: &'a [ConfigRow], key: &str) -> &'a ConfigRow {
        rows.iter().find(|r| r.key == key).unwrap()
    }

    #[test]
    fn test_defaults_reported_as_default() {
        let rows = config_rows(&GovernorConfig::default(), &ConnectionArgs::default(), |_| false);

        let max = row(&rows, "AUTOTASK_MAX_CONCURRENT");
        assert_eq!(max.value, "2");
        assert_eq!(max.source, "default");
        assert_eq!(row(&rows, "AUTOTASK_CHECK_EVERY_N_CALLS").value, "19");
        assert_eq!(row(&rows, "AUTOTASK_API_URL").value, "Not set");
        assert_eq!(rows.len(), 9);
    }

    #[test]
    fn test_env_overrides_and_masked_secrets() {
        let config = GovernorConfig {
            max_concurrent: 4,
            ..GovernorConfig::default()
        };
        let connection = ConnectionArgs {
            api_url: Some("https://example.test/v1.0".to_string()),
            username: Some("api@example.com".to_string()),
            secret: Some("s3cret".to_string()),
            integration_code: None,
        };

        let rows = config_rows(&config, &connection, |key| {
            key == "AUTOTASK_MAX_CONCURRENT" || key == "AUTOTASK_SECRET"
        });

        let max = row(&rows, "AUTOTASK_MAX_CONCURRENT");
        assert_eq!(max.value, "4");
        assert_eq!(max.source, "env");

        let secret = row(&rows, "AUTOTASK_SECRET");
        assert_eq!(secret.value, "****");
        assert_eq!(secret.source, "env");

        assert_eq!(row(&rows, "AUTOTASK_USERNAME").source, "flag");
        assert_eq!(row(&rows, "AUTOTASK_INTEGRATION_CODE").value, "Not set");
    }
}
