//! Autotask CLI - quota-aware access to the Autotask REST API
//!
//! A command-line interface for inspecting API quota and running governed,
//! planned queries against Autotask entities.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "autotask")]
#[command(author, version, about = "Quota-aware Autotask API client", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(flatten)]
    connection: commands::ConnectionArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Show governor and connection configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },

    /// Show current API quota usage and the resulting usage tier
    Quota,

    /// Run a planned query against an entity
    Query(commands::query::QueryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Governor limits come from AUTOTASK_* environment overrides
    let governor_config = autotask_core::GovernorConfig::from_env()?;

    // Create context for commands
    let ctx = commands::Context {
        format: cli.format,
        quiet: cli.quiet,
        connection: cli.connection,
        governor_config,
    };

    // Execute command
    match cli.command {
        Commands::Config { action } => commands::config::execute(&ctx, action).await,
        Commands::Quota => commands::quota::execute(&ctx).await,
        Commands::Query(args) => commands::query::execute(&ctx, args).await,
    }
}
