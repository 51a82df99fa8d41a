//! rtd - Rt Estimation Daemon
//!
//! Serves `POST /rt`: time-varying reproduction number estimates with
//! confidence bounds for a daily incidence series.
//!
//! Usage:
//!   rtd [--config <rtd.toml>] [--port <p>] [--bind <addr>] [--estimator native|rscript|mock]
//!
//! Without a config file the built-in defaults are used: native estimator,
//! gamma generation time (mean 5.2, sd 2.8), listening on 127.0.0.1:5000.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rt_api::{create_router, AppState, EstimationGateway};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{EstimatorKind, RtdConfig};

#[derive(Parser)]
#[command(name = "rtd")]
#[command(author, version, about = "Rt estimation daemon")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "RTD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, overrides the config file
    #[arg(short, long, env = "RTD_PORT")]
    port: Option<u16>,

    /// Listen address, overrides the config file
    #[arg(short, long, env = "RTD_BIND")]
    bind: Option<String>,

    /// Estimator to run, overrides the config file
    #[arg(short, long, value_enum, env = "RTD_ESTIMATOR")]
    estimator: Option<EstimatorKind>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rtd=info,rt_api=info,rt_estimate=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    tracing::info!("Starting rtd (Rt Estimation Daemon)");

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading config from: {}", path.display());
            RtdConfig::load(path)?
        }
        None => {
            tracing::info!("No config file provided, using defaults");
            RtdConfig::default()
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(kind) = cli.estimator {
        config.select_estimator(kind);
    }

    let estimator = rt_estimate::create_estimator(&config.estimator, &config.generation_time)
        .context("Failed to create estimator")?;

    let gateway = EstimationGateway::new(estimator, config.server.max_concurrent_estimations);
    tracing::info!(
        estimator = gateway.estimator_name(),
        max_concurrent = config.server.max_concurrent_estimations,
        "Estimation gateway ready"
    );
    tracing::warn!("Result cache is unbounded and lives for the whole process");

    let app = create_router(AppState::with_gateway(Arc::new(gateway)));

    let addr = (config.server.bind.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}:{}", addr.0, addr.1))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
