//! Flow collection loop
//!
//! Implements the main collection loop that periodically streams the flows of
//! the elapsed interval from Goldmane and folds them into the flow counters.

use super::FlowSource;
use crate::models::{FlowRecord, PollWindow, DEFAULT_AGGREGATION_INTERVAL};
use crate::observability::{ExporterMetrics, PollResult, StructuredLogger};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the flow collection loop
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Poll interval, also the length of the requested window (default: 15 seconds)
    pub poll_interval: Duration,
    /// Aggregation granularity requested from Goldmane (default: 15 seconds)
    pub aggregation_interval: Duration,
    /// Consecutive failed cycles before the connection is rebuilt; 0 never rebuilds
    pub reconnect_after_failures: u32,
}

impl CollectorConfig {
    /// Check the settings the collection loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            aggregation_interval: DEFAULT_AGGREGATION_INTERVAL,
            reconnect_after_failures: 0,
        }
    }
}

/// Result of a single collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The stream ended normally
    Completed { processed: u64 },
    /// The stream could not be opened
    StreamFailed,
    /// The stream broke after `processed` flows had been applied
    ReceiveFailed { processed: u64 },
    /// Shutdown interrupted the cycle
    Cancelled { processed: u64 },
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CycleOutcome::StreamFailed | CycleOutcome::ReceiveFailed { .. }
        )
    }
}

/// Periodically collects flows from a [`FlowSource`] into the exporter metrics
pub struct FlowCollector {
    source: Arc<dyn FlowSource>,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
    config: CollectorConfig,
    consecutive_failures: u32,
}

impl FlowCollector {
    /// Create a new collector. Fails if `config` is invalid.
    pub fn new(
        source: Arc<dyn FlowSource>,
        metrics: ExporterMetrics,
        logger: StructuredLogger,
        config: CollectorConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source,
            metrics,
            logger,
            config,
            consecutive_failures: 0,
        })
    }

    /// Run until `shutdown` fires, then close the source.
    ///
    /// The first cycle starts immediately. Cycles run inline, so a slow cycle
    /// delays the next tick instead of overlapping with it.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            reconnect_after_failures = self.config.reconnect_after_failures,
            "Starting flow collection"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Stopping flow collection");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle(&shutdown).await;
                }
            }
        }

        self.source.close().await;
    }

    /// Collect once and apply the reconnect policy to the outcome
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> CycleOutcome {
        let outcome = self.collect_once(shutdown).await;

        match outcome {
            CycleOutcome::Completed { .. } => self.consecutive_failures = 0,
            CycleOutcome::Cancelled { .. } => {}
            CycleOutcome::StreamFailed | CycleOutcome::ReceiveFailed { .. } => {
                self.consecutive_failures += 1;
                self.maybe_reconnect().await;
            }
        }

        outcome
    }

    /// Number of failed cycles since the last success or reconnect
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Stream the flows of the last poll interval and update the metrics.
    ///
    /// Flows applied before a receive error are kept.
    pub async fn collect_once(&self, shutdown: &CancellationToken) -> CycleOutcome {
        let start = Instant::now();
        let window = PollWindow::trailing(self.config.poll_interval, self.config.aggregation_interval);

        let opened = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return CycleOutcome::Cancelled { processed: 0 },
            opened = self.source.stream_flows(window) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.metrics.record_poll(PollResult::StreamError);
                self.logger
                    .log_poll_failed(PollResult::StreamError, 0, &e.to_string());
                return CycleOutcome::StreamFailed;
            }
        };

        let mut processed = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(flows = processed, "Flow stream abandoned on shutdown");
                    return CycleOutcome::Cancelled { processed };
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(record)) => {
                    self.process_flow(record);
                    processed += 1;
                }
                Some(Err(e)) => {
                    self.metrics.record_poll(PollResult::RecvError);
                    self.logger
                        .log_poll_failed(PollResult::RecvError, processed, &e.to_string());
                    return CycleOutcome::ReceiveFailed { processed };
                }
                None => break,
            }
        }

        self.metrics.record_poll(PollResult::Success);
        self.metrics.set_last_success_now();
        self.metrics.add_flows_processed(processed);
        self.logger.log_poll_complete(processed, start.elapsed());

        CycleOutcome::Completed { processed }
    }

    /// Apply one flow to the counters. Returns false if nothing was counted.
    fn process_flow(&self, record: FlowRecord) -> bool {
        let Some(key) = record.key else {
            debug!("Skipping flow without key");
            return false;
        };

        self.metrics
            .record_flow(record.action, &key.labels(), record.connections_started)
    }

    async fn maybe_reconnect(&mut self) {
        let threshold = self.config.reconnect_after_failures;
        if threshold == 0 || self.consecutive_failures < threshold {
            return;
        }

        self.source.reconnect().await;
        self.metrics.inc_reconnects();
        self.logger.log_reconnect(self.consecutive_failures);
        self.consecutive_failures = 0;
    }
}

/// Builder for creating the flow collector
pub struct FlowCollectorBuilder {
    source: Option<Arc<dyn FlowSource>>,
    metrics: Option<ExporterMetrics>,
    logger: Option<StructuredLogger>,
    config: CollectorConfig,
}

impl FlowCollectorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            metrics: None,
            logger: None,
            config: CollectorConfig::default(),
        }
    }

    /// Set the flow source
    pub fn source(mut self, source: Arc<dyn FlowSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the metrics to update
    pub fn metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the structured logger
    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the aggregation interval
    pub fn aggregation_interval(mut self, interval: Duration) -> Self {
        self.config.aggregation_interval = interval;
        self
    }

    /// Set the reconnect threshold
    pub fn reconnect_after_failures(mut self, failures: u32) -> Self {
        self.config.reconnect_after_failures = failures;
        self
    }

    /// Build the collector
    pub fn build(self) -> Result<FlowCollector> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Flow source is required"))?;
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics are required"))?;

        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("goldmane"));

        FlowCollector::new(source, metrics, logger, self.config)
    }
}

impl Default for FlowCollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
