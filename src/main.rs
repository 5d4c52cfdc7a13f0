//! TigerHost addon service entry point
//!
//! Loads configuration, resumes addons left mid-workflow and serves metrics
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use tigerhost_addons::config::{validate_config, ConfigLoader, ENV_PREFIX};
use tigerhost_addons::metrics::{init_tracing_with_metrics, MetricsCollector, MetricsServer};
use tigerhost_addons::orchestrator::InMemoryTokenSource;
use tigerhost_addons::AddonService;

/// TigerHost addon service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML, YAML or JSON); environment overrides still apply
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not resubmit addons left mid-workflow
    #[arg(long)]
    no_resume: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::from_file_with_env(path, ENV_PREFIX)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConfigLoader::from_env().context("failed to load config from environment")?,
    };
    validate_config(&config)?;

    init_tracing_with_metrics(
        Arc::new(MetricsCollector::new()),
        Some(&config.service.log_level),
    )?;
    info!(environment = ?config.service.environment, "Starting addon service");

    // No per-user tokens here; backends authenticate with their service_token
    let service = AddonService::from_config(&config, Arc::new(InMemoryTokenSource::new())).await?;

    if config.service.metrics_enabled {
        let addr = format!("0.0.0.0:{}", config.service.metrics_port);
        let server = MetricsServer::new(service.metrics().clone(), addr);
        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!(error = %e, "Metrics server stopped");
            }
        });
    }

    if !args.no_resume {
        let handles = service.resume_pending().await?;
        info!(count = handles.len(), "Resumed pending addons");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    warn!("Shutting down");
    service.shutdown();
    Ok(())
}
