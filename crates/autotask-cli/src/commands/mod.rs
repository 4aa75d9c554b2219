//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod config;
pub mod query;
pub mod quota;

use anyhow::{anyhow, Result};
use autotask_core::{AutotaskClient, AutotaskCredentials, GovernorConfig};
use clap::Args;

use crate::output::OutputFormat;

/// Connection settings, from flags or `AUTOTASK_*` environment variables
#[derive(Args, Clone, Default)]
pub struct ConnectionArgs {
    /// Autotask REST base URL (e.g. https://webservices2.autotask.net/atservicesrest/v1.0)
    #[arg(long = "api-url", env = "AUTOTASK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// API user name
    #[arg(long, env = "AUTOTASK_USERNAME", global = true)]
    pub username: Option<String>,

    /// API user secret
    #[arg(long, env = "AUTOTASK_SECRET", global = true, hide_env_values = true)]
    pub secret: Option<String>,

    /// API tracking identifier
    #[arg(
        long = "integration-code",
        env = "AUTOTASK_INTEGRATION_CODE",
        global = true,
        hide_env_values = true
    )]
    pub integration_code: Option<String>,
}

impl ConnectionArgs {
    /// Build an API client, failing on the first missing setting
    pub fn client(&self) -> Result<AutotaskClient> {
        let api_url = required(&self.api_url, "--api-url", "AUTOTASK_API_URL")?;
        let credentials = AutotaskCredentials {
            username: required(&self.username, "--username", "AUTOTASK_USERNAME")?,
            secret: required(&self.secret, "--secret", "AUTOTASK_SECRET")?,
            integration_code: required(
                &self.integration_code,
                "--integration-code",
                "AUTOTASK_INTEGRATION_CODE",
            )?,
        };

        Ok(AutotaskClient::new(api_url, credentials)?)
    }
}

fn required(value: &Option<String>, flag: &str, env: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} is not set (use {} or the {} env var)", env, flag, env))
}

/// Shared context for all commands
pub struct Context {
    pub format: OutputFormat,
    pub quiet: bool,
    pub connection: ConnectionArgs,
    pub governor_config: GovernorConfig,
}
