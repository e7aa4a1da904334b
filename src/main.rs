//! kubesee - Kubernetes event exporter
//!
//! Environment variables:
//! - `KUBESEE_CONFIG`: path to the YAML configuration (required)
//! - `KUBESEE_LOG_LEVEL`: overrides `logLevel` from the config
//! - `KUBESEE_METRICS_PREFIX`: overrides `metricsNamePrefix`
//! - `KUBESEE_METRICS_ADDR`: scrape endpoint address (default 0.0.0.0:2112)
//! - `KUBESEE_DRAIN_TIMEOUT`: shutdown drain bound in milliseconds

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use kubesee::config::{Config, LogFormat};
use kubesee::engine::{Engine, DEFAULT_DRAIN_TIMEOUT};
use kubesee::metrics::Metrics;
use kubesee::metrics_server::MetricsServer;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("KUBESEE_CONFIG")
        .context("KUBESEE_CONFIG must point to the configuration file")?;
    let mut config = Config::from_file(&config_path)?;

    if let Ok(level) = std::env::var("KUBESEE_LOG_LEVEL") {
        config.log_level = level;
    }
    if let Ok(prefix) = std::env::var("KUBESEE_METRICS_PREFIX") {
        config.metrics_name_prefix = prefix;
    }
    let drain_timeout = std::env::var("KUBESEE_DRAIN_TIMEOUT")
        .ok()
        .and_then(|ms| ms.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_DRAIN_TIMEOUT);

    init_tracing(&config);

    if config.leader_election.enabled {
        warn!("leaderElection is configured but not enforced by this build");
    }
    info!(
        config = %config_path,
        cluster = %config.cluster_name,
        receivers = config.receivers.len(),
        "starting kubesee"
    );

    if let Err(e) = Metrics::init(&config.metrics_name_prefix) {
        warn!(error = %e, "metrics registration failed, continuing without them");
    }
    let metrics_addr: SocketAddr = std::env::var("KUBESEE_METRICS_ADDR")
        .ok()
        .and_then(|addr| addr.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 2112)));
    let metrics_server = MetricsServer::start(metrics_addr);

    let client = kube::Client::try_default()
        .await
        .map_err(kubesee::ExporterError::Kube)
        .context("kubernetes client bootstrap failed")?;

    let engine = Engine::start(config, client, drain_timeout).await?;

    shutdown_signal().await;
    engine.shutdown().await?;
    metrics_server.abort();

    info!("kubesee shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let level = if config.log_level.is_empty() {
        "info"
    } else {
        &config.log_level
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
