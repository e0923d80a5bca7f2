//! gRPC client for the Goldmane flow API
//!
//! The client owns a single lazily connected channel. The handshake happens
//! on the first call; only channel construction errors surface from
//! [`GoldmaneClient::connect`].

use super::tls;
use crate::collector::{FlowSource, FlowStream};
use crate::error::{ConnectError, StreamError};
use crate::models::{FlowRecord, PollWindow};
use crate::proto::{Filter, FlowStreamRequest, FlowsClient};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

/// TLS settings for the Goldmane connection
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub enabled: bool,
    /// Client certificate presented to Goldmane
    pub cert_path: Option<PathBuf>,
    /// Private key of the client certificate
    pub key_path: Option<PathBuf>,
    /// CA bundle used to verify Goldmane
    pub ca_path: Option<PathBuf>,
}

/// Configuration for the gRPC client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Goldmane address, `host:port` or a full URL
    pub endpoint: String,
    pub tls: TlsSettings,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Keepalive interval
    pub keepalive_interval: Duration,
    /// Keepalive timeout
    pub keepalive_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9094".to_string(),
            tls: TlsSettings::default(),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint as a URI, with a scheme matching the TLS setting if none was given
    fn uri(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.tls.enabled {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// Client for the Goldmane `Flows` service
pub struct GoldmaneClient {
    config: ClientConfig,
    endpoint: Endpoint,
    channel: RwLock<Option<Channel>>,
}

impl GoldmaneClient {
    /// Build the channel to Goldmane.
    ///
    /// Fails if the endpoint is not a valid URI or the TLS material cannot be
    /// loaded. No network I/O happens here.
    pub async fn connect(config: ClientConfig) -> Result<Self, ConnectError> {
        let uri = config.uri();

        let mut endpoint = Channel::from_shared(uri.clone())
            .map_err(|e| ConnectError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                reason: e.to_string(),
            })?
            .connect_timeout(config.connect_timeout)
            .http2_keep_alive_interval(config.keepalive_interval)
            .keep_alive_timeout(config.keepalive_timeout)
            .keep_alive_while_idle(true);

        if config.tls.enabled {
            let domain = extract_domain(&uri)?;
            let tls_config = tls::load_tls_config(&config.tls, &domain).await?;
            endpoint = endpoint.tls_config(tls_config)?;
        }

        let channel = endpoint.connect_lazy();

        info!(
            endpoint = %config.endpoint,
            tls = config.tls.enabled,
            "Connected to Goldmane API"
        );

        Ok(Self {
            config,
            endpoint,
            channel: RwLock::new(Some(channel)),
        })
    }

    /// Get the configured endpoint
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Check if the channel is still open
    pub async fn is_connected(&self) -> bool {
        self.channel.read().await.is_some()
    }

    /// Open a flow stream for the given window
    pub async fn stream_flows(&self, window: PollWindow) -> Result<FlowStream, StreamError> {
        let channel = self
            .channel
            .read()
            .await
            .clone()
            .ok_or(StreamError::Closed)?;

        let mut client = FlowsClient::new(channel);

        let request = tonic::Request::new(FlowStreamRequest {
            start_time_gte: window.start_offset_secs,
            filter: Some(Filter::default()),
            aggregation_interval: window.aggregation_interval_secs,
        });

        let stream = client
            .stream(request)
            .await
            .map_err(StreamError::Open)?
            .into_inner();

        debug!(
            start_time_gte = window.start_offset_secs,
            aggregation_interval = window.aggregation_interval_secs,
            "Opened Goldmane flow stream"
        );

        Ok(Box::pin(stream.map(|result| {
            result.map(FlowRecord::from).map_err(StreamError::Recv)
        })))
    }

    /// Replace the channel with a fresh one to the same endpoint.
    ///
    /// A closed client stays closed.
    pub async fn reconnect(&self) {
        let mut channel = self.channel.write().await;
        if channel.is_none() {
            debug!("Goldmane client is closed, not reconnecting");
            return;
        }

        *channel = Some(self.endpoint.connect_lazy());

        info!(endpoint = %self.config.endpoint, "Rebuilt Goldmane channel");
    }

    /// Release the channel. Safe to call more than once.
    pub async fn close(&self) {
        if self.channel.write().await.take().is_some() {
            info!(endpoint = %self.config.endpoint, "Disconnected from Goldmane API");
        }
    }
}

/// Extract the host used for TLS server name verification
fn extract_domain(uri: &str) -> Result<String, ConnectError> {
    let url = url::Url::parse(uri).map_err(|e| ConnectError::InvalidEndpoint {
        endpoint: uri.to_string(),
        reason: e.to_string(),
    })?;

    url.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| ConnectError::InvalidEndpoint {
            endpoint: uri.to_string(),
            reason: "no host in endpoint".to_string(),
        })
}

#[async_trait]
impl FlowSource for GoldmaneClient {
    async fn stream_flows(&self, window: PollWindow) -> Result<FlowStream, StreamError> {
        GoldmaneClient::stream_flows(self, window).await
    }

    async fn reconnect(&self) {
        GoldmaneClient::reconnect(self).await
    }

    async fn close(&self) {
        GoldmaneClient::close(self).await
    }
}
