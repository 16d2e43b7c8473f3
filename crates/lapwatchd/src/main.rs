//! Lapwatch Daemon - motorsport timing exporter
//!
//! Polls the upstream timing API for the latest session and exposes driver
//! timing as Prometheus gauges.

use anyhow::{Context, Result};
use clap::Parser;
use lapwatch_common::{DriverDirectory, ExporterConfig, VERSION};
use lapwatchd::client::HttpTelemetryClient;
use lapwatchd::metrics::MetricsRegistry;
use lapwatchd::scheduler::Scheduler;
use lapwatchd::server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "lapwatchd", version, about = "Motorsport timing exporter")]
struct Args {
    /// Config file (defaults to ./lapwatch.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Driver mapping JSON file
    #[arg(short, long)]
    drivers: Option<PathBuf>,

    /// Metrics listen address, e.g. 0.0.0.0:18000
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("[BOOT] lapwatchd v{} starting...", VERSION);

    let args = Args::parse();

    let mut config =
        ExporterConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(drivers) = args.drivers {
        config.exporter.driver_mapping = drivers;
    }
    if let Some(listen) = args.listen {
        config.exporter.listen_addr = listen;
    }

    let directory = DriverDirectory::load(&config.exporter.driver_mapping)
        .context("Failed to load driver mapping")?;
    let client = HttpTelemetryClient::from_config(&config)?;
    let metrics = MetricsRegistry::new().context("Failed to register metrics")?;

    let listener = server::bind(&config.exporter.listen_addr).await?;
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run(listener, server_metrics).await {
            error!("[FATAL] Metrics endpoint stopped: {}", e);
        }
    });

    info!("[BOOT] Polling {}", config.base_url()?);
    let mut scheduler = Scheduler::new(
        Arc::new(client),
        Arc::new(directory),
        metrics,
        config.polling.clone(),
    );

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}
