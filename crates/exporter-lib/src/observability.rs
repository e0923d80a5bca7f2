//! Observability infrastructure for the flow exporter
//!
//! Provides:
//! - The Prometheus metric sink: per-flow counters plus the exporter's own
//!   poll health metrics
//! - Structured JSON logging with tracing

use crate::models::{FlowAction, FlowLabels, FLOW_LABEL_NAMES};
use chrono::{DateTime, Utc};
use prometheus::{
    register_gauge_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Encoder, Gauge, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome tag of a Goldmane poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollResult {
    Success,
    /// The stream could not be opened
    StreamError,
    /// The stream broke while receiving flows
    RecvError,
}

impl PollResult {
    pub fn as_label(&self) -> &'static str {
        match self {
            PollResult::Success => "success",
            PollResult::StreamError => "error_stream",
            PollResult::RecvError => "error_recv",
        }
    }
}

/// Exporter metrics for Prometheus exposition
///
/// Every instance owns its registry, so independent instances never collide.
/// Clones share the same underlying series.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    flow_allow: IntCounterVec,
    flow_deny: IntCounterVec,
    api_requests: IntCounterVec,
    api_last_success_time: Gauge,
    api_flows_processed: IntCounter,
    api_reconnects: IntCounter,
}

impl ExporterMetrics {
    /// Create the metrics on a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register the exporter metrics on the given registry
    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let flow_allow = register_int_counter_vec_with_registry!(
            "calico_flow_allow",
            "Number of allowed network flows in Calico",
            &FLOW_LABEL_NAMES,
            registry
        )?;

        let flow_deny = register_int_counter_vec_with_registry!(
            "calico_flow_deny",
            "Number of denied network flows in Calico",
            &FLOW_LABEL_NAMES,
            registry
        )?;

        let api_requests = register_int_counter_vec_with_registry!(
            "goldmane_api_requests_total",
            "Total number of Goldmane API poll requests",
            &["result"],
            registry
        )?;

        let api_last_success_time = register_gauge_with_registry!(
            "goldmane_api_last_success_timestamp_seconds",
            "Unix timestamp of the last successful Goldmane API poll",
            registry
        )?;

        let api_flows_processed = register_int_counter_with_registry!(
            "goldmane_api_flows_processed_total",
            "Total number of flows processed from the Goldmane API",
            registry
        )?;

        let api_reconnects = register_int_counter_with_registry!(
            "goldmane_api_reconnects_total",
            "Total number of Goldmane connections rebuilt after repeated poll failures",
            registry
        )?;

        Ok(Self {
            registry,
            flow_allow,
            flow_deny,
            api_requests,
            api_last_success_time,
            api_flows_processed,
            api_reconnects,
        })
    }

    /// The registry backing these metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn flow_counter(&self, action: FlowAction) -> Option<&IntCounterVec> {
        match action {
            FlowAction::Allow => Some(&self.flow_allow),
            FlowAction::Deny => Some(&self.flow_deny),
            FlowAction::Other => None,
        }
    }

    /// Add `connections` to the counter matching `action`.
    ///
    /// Returns false when the action has no counter and nothing was recorded.
    pub fn record_flow(&self, action: FlowAction, labels: &FlowLabels, connections: u64) -> bool {
        match self.flow_counter(action) {
            Some(counter) => {
                counter.with_label_values(&labels.values()).inc_by(connections);
                true
            }
            None => false,
        }
    }

    /// Count one poll with the given outcome
    pub fn record_poll(&self, result: PollResult) {
        self.api_requests
            .with_label_values(&[result.as_label()])
            .inc();
    }

    /// Set the last-success gauge to the given instant
    pub fn set_last_success(&self, at: DateTime<Utc>) {
        self.api_last_success_time
            .set(at.timestamp_millis() as f64 / 1000.0);
    }

    pub fn set_last_success_now(&self) {
        self.set_last_success(Utc::now());
    }

    pub fn add_flows_processed(&self, count: u64) {
        self.api_flows_processed.inc_by(count);
    }

    pub fn inc_reconnects(&self) {
        self.api_reconnects.inc();
    }

    /// Current value of a per-flow series (creates the series if missing)
    pub fn flow_count(&self, action: FlowAction, labels: &FlowLabels) -> u64 {
        self.flow_counter(action)
            .map(|counter| counter.with_label_values(&labels.values()).get())
            .unwrap_or(0)
    }

    pub fn poll_count(&self, result: PollResult) -> u64 {
        self.api_requests
            .with_label_values(&[result.as_label()])
            .get()
    }

    pub fn last_success_timestamp(&self) -> f64 {
        self.api_last_success_time.get()
    }

    pub fn flows_processed(&self) -> u64 {
        self.api_flows_processed.get()
    }

    pub fn reconnects(&self) -> u64 {
        self.api_reconnects.get()
    }

    /// Encode all registered series in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for exporter events
///
/// Provides consistent JSON-formatted logging for lifecycle and poll events.
#[derive(Clone)]
pub struct StructuredLogger {
    endpoint: String,
}

impl StructuredLogger {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, metrics_addr: &str, poll_interval: Duration) {
        info!(
            event = "exporter_started",
            goldmane_addr = %self.endpoint,
            metrics_addr = %metrics_addr,
            poll_interval_secs = poll_interval.as_secs(),
            exporter_version = %version,
            "Goldmane exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            goldmane_addr = %self.endpoint,
            reason = %reason,
            "Goldmane exporter shutting down"
        );
    }

    /// Log a completed poll
    pub fn log_poll_complete(&self, flows: u64, elapsed: Duration) {
        info!(
            event = "poll_complete",
            goldmane_addr = %self.endpoint,
            flows = flows,
            elapsed_ms = elapsed.as_millis() as u64,
            "Processed flows"
        );
    }

    /// Log a failed poll
    pub fn log_poll_failed(&self, result: PollResult, flows: u64, error: &str) {
        warn!(
            event = "poll_failed",
            goldmane_addr = %self.endpoint,
            result = result.as_label(),
            flows_before_failure = flows,
            error = %error,
            "Goldmane poll failed"
        );
    }

    /// Log a connection rebuild triggered by repeated failures
    pub fn log_reconnect(&self, consecutive_failures: u32) {
        warn!(
            event = "goldmane_reconnect",
            goldmane_addr = %self.endpoint,
            consecutive_failures = consecutive_failures,
            "Rebuilding Goldmane connection after repeated poll failures"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlowKey, Reporter};

    fn labels(dst_port: i64) -> FlowLabels {
        FlowKey {
            reporter: Reporter::Source,
            protocol: "TCP".to_string(),
            src_namespace: "default".to_string(),
            src_name: "client".to_string(),
            dst_namespace: "default".to_string(),
            dst_name: "server".to_string(),
            dst_port,
        }
        .labels()
    }

    #[test]
    fn test_independent_instances_do_not_collide() {
        let first = ExporterMetrics::new().unwrap();
        let second = ExporterMetrics::new().unwrap();

        first.record_flow(FlowAction::Allow, &labels(443), 3);

        assert_eq!(first.flow_count(FlowAction::Allow, &labels(443)), 3);
        assert_eq!(second.flow_count(FlowAction::Allow, &labels(443)), 0);
    }

    #[test]
    fn test_record_flow_routes_by_action() {
        let metrics = ExporterMetrics::new().unwrap();

        assert!(metrics.record_flow(FlowAction::Allow, &labels(80), 2));
        assert!(metrics.record_flow(FlowAction::Deny, &labels(80), 5));
        assert!(!metrics.record_flow(FlowAction::Other, &labels(80), 7));

        assert_eq!(metrics.flow_count(FlowAction::Allow, &labels(80)), 2);
        assert_eq!(metrics.flow_count(FlowAction::Deny, &labels(80)), 5);
        assert_eq!(metrics.flow_count(FlowAction::Other, &labels(80)), 0);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        assert!(ExporterMetrics::with_registry(registry.clone()).is_ok());
        assert!(ExporterMetrics::with_registry(registry).is_err());
    }

    #[test]
    fn test_last_success_timestamp() {
        let metrics = ExporterMetrics::new().unwrap();
        let at = DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap();

        metrics.set_last_success(at);

        assert_eq!(metrics.last_success_timestamp(), 1_700_000_000.5);
    }

    #[test]
    fn test_render_exposition_text() {
        let metrics = ExporterMetrics::new().unwrap();
        metrics.record_flow(FlowAction::Deny, &labels(22), 1);
        metrics.record_poll(PollResult::Success);
        metrics.add_flows_processed(1);

        let text = metrics.render().unwrap();

        assert!(text.contains("# TYPE calico_flow_deny counter"));
        assert!(text.contains(r#"dst_port="22""#));
        assert!(text.contains(r#"src_port="0""#));
        assert!(text.contains(r#"goldmane_api_requests_total{result="success"} 1"#));
        assert!(text.contains("goldmane_api_flows_processed_total 1"));
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = ExporterMetrics::new().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record_flow(FlowAction::Allow, &labels(8080), 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.flow_count(FlowAction::Allow, &labels(8080)), 1000);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("localhost:9094");
        assert_eq!(logger.endpoint, "localhost:9094");
    }
}
