use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use portal_loadgen::{credentials, runner, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!("════════════════════════════════════════════════════════════");
    info!("           PORTAL LOAD TEST");
    info!("════════════════════════════════════════════════════════════");
    info!("Portal: {}", config.base_url);
    info!("Simulated users: {}", config.users);
    info!("Tool visits per user: {}", config.visits);
    if !config.skip_tools.is_empty() {
        info!("Skipping tools: {}", config.skip_tools.join(", "));
    }

    let credentials = credentials::load(&config.credentials)
        .with_context(|| format!("Failed to load credentials from {:?}", config.credentials))?;
    let plan = config.plan(credentials).context("Invalid portal configuration")?;

    let report = runner::run(plan).await.context("Load test failed to start")?;

    eprint!("{report}");

    if let Some(path) = &config.report_json {
        let json = sonic_rs::to_string(&report).context("Failed to serialize report")?;
        std::fs::write(path, json).context(format!("Failed to write report to {:?}", path))?;
        info!("Report written to {:?}", path);
    }

    info!("════════════════════════════════════════════════════════════");
    info!("                 LOAD TEST COMPLETE");
    info!("════════════════════════════════════════════════════════════");

    Ok(())
}
