//! Goldmane Exporter - Calico flow metrics for Prometheus
//!
//! This binary polls the Goldmane flow API on a fixed interval and exposes
//! the flows as Prometheus counters, alongside its own poll health metrics.

use anyhow::{Context, Result};
use exporter_lib::{
    CancellationToken, ExporterMetrics, FlowCollectorBuilder, GoldmaneClient, StructuredLogger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting goldmane-exporter");

    let config = config::ExporterConfig::load().context("failed to load configuration")?;

    let metrics = ExporterMetrics::new().context("failed to register metrics")?;

    let client = GoldmaneClient::connect(config.client_config())
        .await
        .with_context(|| format!("failed to create Goldmane client for {}", config.goldmane_addr))?;

    let listener = api::bind(&config.listen_addrs())
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", config.metrics_addr))?;
    let listen_addr = listener
        .local_addr()
        .context("metrics listener has no local address")?;

    let logger = StructuredLogger::new(&config.goldmane_addr);
    logger.log_startup(
        EXPORTER_VERSION,
        &listen_addr.to_string(),
        config.poll_interval(),
    );

    let collector = FlowCollectorBuilder::new()
        .source(Arc::new(client))
        .metrics(metrics.clone())
        .logger(logger.clone())
        .poll_interval(config.poll_interval())
        .aggregation_interval(config.aggregation_interval())
        .reconnect_after_failures(config.reconnect_after_failures)
        .build()?;

    let shutdown = CancellationToken::new();

    let app_state = Arc::new(api::AppState::new(metrics));
    let api_handle = tokio::spawn(api::serve(
        listener,
        app_state,
        shutdown.clone(),
        api::ServerTimeouts::default(),
    ));
    let collector_handle = tokio::spawn(collector.run(shutdown.clone()));

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    shutdown.cancel();

    let deadline = config.shutdown_timeout();
    match wait_for(api_handle, deadline).await {
        Some(Ok(Ok(()))) => {}
        Some(Ok(Err(e))) => error!(error = %e, "Metrics server failed"),
        Some(Err(e)) => error!(error = %e, "Metrics server task panicked"),
        None => warn!(
            timeout_secs = deadline.as_secs(),
            "Metrics server did not stop in time"
        ),
    }
    match wait_for(collector_handle, deadline).await {
        Some(Ok(())) => {}
        Some(Err(e)) => error!(error = %e, "Collector task panicked"),
        None => warn!(
            timeout_secs = deadline.as_secs(),
            "Collector did not stop in time"
        ),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for a task to finish, giving up after `deadline`
async fn wait_for<T>(
    handle: JoinHandle<T>,
    deadline: Duration,
) -> Option<Result<T, tokio::task::JoinError>> {
    tokio::time::timeout(deadline, handle).await.ok()
}

/// Wait for SIGINT or SIGTERM and name the one received
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for SIGINT")?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for SIGINT")?;
        Ok("SIGINT received")
    }
}
