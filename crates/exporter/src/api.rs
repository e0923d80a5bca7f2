//! HTTP API for health checks and Prometheus metrics

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use exporter_lib::{CancellationToken, ExporterMetrics};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

/// Content type of the Prometheus text exposition format
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Per-connection limits of the metrics server
#[derive(Debug, Clone, Copy)]
pub struct ServerTimeouts {
    /// Time a client gets to send a complete request head. The timer also
    /// runs while a kept-alive connection waits for its next request.
    pub read: Duration,
    /// Time a request gets to produce its response
    pub write: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(5),
            write: Duration::from_secs(10),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub metrics: ExporterMetrics,
}

impl AppState {
    pub fn new(metrics: ExporterMetrics) -> Self {
        Self { metrics }
    }
}

/// Liveness probe
async fn health() -> &'static str {
    "OK"
}

/// Readiness probe
async fn ready() -> &'static str {
    "READY"
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Bind the first of `addrs` that can be bound
pub async fn bind(addrs: &[String]) -> anyhow::Result<TcpListener> {
    let mut last_error = None;

    for addr in addrs {
        match TcpListener::bind(addr.as_str()).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(addr = %addr, error = %e, "Could not bind metrics listener");
                last_error = Some(anyhow::Error::new(e).context(format!("failed to bind {}", addr)));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no listen address configured")))
}

/// Serve the API on `listener` until `shutdown` fires, then drain open connections
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
    timeouts: ServerTimeouts,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        read_timeout_ms = timeouts.read.as_millis() as u64,
        write_timeout_ms = timeouts.write.as_millis() as u64,
        "Starting metrics server"
    );

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                connections.spawn(serve_connection(
                    stream,
                    app.clone(),
                    shutdown.clone(),
                    timeouts,
                ));
                debug!(peer = %peer, "Accepted metrics connection");
            }
            // Reap finished connections so the set does not grow
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}

    info!("Metrics server stopped");
    Ok(())
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    app: Router,
    shutdown: CancellationToken,
    timeouts: ServerTimeouts,
) {
    let service = service_fn(move |request: Request<Incoming>| {
        let app = app.clone();
        async move {
            match tokio::time::timeout(timeouts.write, app.oneshot(request)).await {
                Ok(response) => response,
                Err(_) => {
                    warn!("Metrics request timed out");
                    Ok::<_, Infallible>(StatusCode::SERVICE_UNAVAILABLE.into_response())
                }
            }
        }
    });

    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(e) = result {
        debug!(error = %e, "Metrics connection closed with error");
    }
}
