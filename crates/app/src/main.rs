//! PartSource - parts sourcing and procurement engine
//!
//! Main entry point for the command-line front end.

use anyhow::{Context, Result};
use clap::Parser;
use partsource_app::{execute, AppContext, Cli};
use partsource_infra::config;
use partsource_infra::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before configuration so PARTSOURCE_* values apply
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = config::load_with_path(cli.config.clone()).context("loading configuration")?;
    if let Some(path) = &cli.database {
        config.database.path = path.display().to_string();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config.logging).context("initializing logging")?;
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) => tracing::trace!(error = %e, "no .env file loaded"),
    }

    let ctx = AppContext::new(config).await.context("starting partsource")?;
    let report = execute(&ctx, cli.command).await?;
    if !report.is_null() {
        print_report(&report)?;
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_report(report: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
