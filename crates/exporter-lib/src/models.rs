//! Core data models for the flow exporter

use crate::proto;
use std::time::Duration;

/// Default aggregation granularity requested from Goldmane
pub const DEFAULT_AGGREGATION_INTERVAL: Duration = Duration::from_secs(15);

/// Label names of the per-flow counters, in exposition order
pub const FLOW_LABEL_NAMES: [&str; 8] = [
    "reporter",
    "protocol",
    "src_namespace",
    "src_pod",
    "src_port",
    "dst_namespace",
    "dst_object",
    "dst_port",
];

/// Source port is not part of the Goldmane flow key
const SRC_PORT_PLACEHOLDER: &str = "0";

/// Which side of the connection reported the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reporter {
    Source,
    Destination,
    Unspecified,
}

impl Reporter {
    pub fn as_label(&self) -> &'static str {
        match self {
            Reporter::Source => "src",
            Reporter::Destination => "dst",
            Reporter::Unspecified => "unspecified",
        }
    }
}

impl From<proto::Reporter> for Reporter {
    fn from(reporter: proto::Reporter) -> Self {
        match reporter {
            proto::Reporter::Src => Reporter::Source,
            proto::Reporter::Dst => Reporter::Destination,
            proto::Reporter::Unspecified => Reporter::Unspecified,
        }
    }
}

/// Policy verdict of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowAction {
    Allow,
    Deny,
    /// Pass, unspecified or unknown verdicts. Never counted.
    Other,
}

impl From<proto::Action> for FlowAction {
    fn from(action: proto::Action) -> Self {
        match action {
            proto::Action::Allow => FlowAction::Allow,
            proto::Action::Deny => FlowAction::Deny,
            proto::Action::Pass | proto::Action::Unspecified => FlowAction::Other,
        }
    }
}

/// Identity of an aggregated flow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub reporter: Reporter,
    pub protocol: String,
    pub src_namespace: String,
    pub src_name: String,
    pub dst_namespace: String,
    pub dst_name: String,
    pub dst_port: i64,
}

impl FlowKey {
    /// Derive the counter label values for this key
    pub fn labels(&self) -> FlowLabels {
        FlowLabels {
            reporter: self.reporter.as_label(),
            protocol: self.protocol.clone(),
            src_namespace: self.src_namespace.clone(),
            src_pod: self.src_name.clone(),
            dst_namespace: self.dst_namespace.clone(),
            dst_object: self.dst_name.clone(),
            dst_port: self.dst_port.to_string(),
        }
    }
}

/// A flow observed within one poll window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    /// `None` when the upstream result carried no flow key
    pub key: Option<FlowKey>,
    pub action: FlowAction,
    pub connections_started: u64,
}

impl From<proto::FlowResult> for FlowRecord {
    fn from(result: proto::FlowResult) -> Self {
        let Some(flow) = result.flow else {
            return FlowRecord {
                key: None,
                action: FlowAction::Other,
                connections_started: 0,
            };
        };

        let connections_started = u64::try_from(flow.num_connections_started).unwrap_or(0);

        match flow.key {
            Some(key) => FlowRecord {
                action: key.action().into(),
                key: Some(FlowKey {
                    reporter: key.reporter().into(),
                    protocol: key.proto,
                    src_namespace: key.source_namespace,
                    src_name: key.source_name,
                    dst_namespace: key.dest_namespace,
                    dst_name: key.dest_name,
                    dst_port: key.dest_port,
                }),
                connections_started,
            },
            None => FlowRecord {
                key: None,
                action: FlowAction::Other,
                connections_started,
            },
        }
    }
}

/// Label values of a per-flow counter series
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowLabels {
    pub reporter: &'static str,
    pub protocol: String,
    pub src_namespace: String,
    pub src_pod: String,
    pub dst_namespace: String,
    pub dst_object: String,
    pub dst_port: String,
}

impl FlowLabels {
    /// Values ordered like [`FLOW_LABEL_NAMES`]
    pub fn values(&self) -> [&str; 8] {
        [
            self.reporter,
            &self.protocol,
            &self.src_namespace,
            &self.src_pod,
            SRC_PORT_PLACEHOLDER,
            &self.dst_namespace,
            &self.dst_object,
            &self.dst_port,
        ]
    }
}

/// Time range requested from Goldmane for one collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWindow {
    /// Window start relative to now, in seconds (negative)
    pub start_offset_secs: i64,
    /// Aggregation granularity in seconds
    pub aggregation_interval_secs: i64,
}

impl PollWindow {
    /// The window covering the last `interval`
    pub fn trailing(interval: Duration, aggregation: Duration) -> Self {
        Self {
            start_offset_secs: -(interval.as_secs() as i64),
            aggregation_interval_secs: aggregation.as_secs() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(reporter: Reporter) -> FlowKey {
        FlowKey {
            reporter,
            protocol: "TCP".to_string(),
            src_namespace: "frontend".to_string(),
            src_name: "web-7d4b9".to_string(),
            dst_namespace: "backend".to_string(),
            dst_name: "api".to_string(),
            dst_port: 443,
        }
    }

    #[test]
    fn test_labels_follow_schema_order() {
        let labels = test_key(Reporter::Source).labels();

        assert_eq!(
            labels.values(),
            ["src", "TCP", "frontend", "web-7d4b9", "0", "backend", "api", "443"]
        );
    }

    #[test]
    fn test_labels_are_pure_per_key() {
        for reporter in [Reporter::Source, Reporter::Destination, Reporter::Unspecified] {
            let key = test_key(reporter);
            assert_eq!(key.labels(), key.clone().labels());
        }
        assert_eq!(test_key(Reporter::Destination).labels().reporter, "dst");
        assert_eq!(test_key(Reporter::Unspecified).labels().reporter, "unspecified");
    }

    #[test]
    fn test_record_from_flow_result() {
        let result = proto::FlowResult {
            id: 1,
            flow: Some(proto::Flow {
                key: Some(proto::FlowKey {
                    source_name: "client".to_string(),
                    source_namespace: "default".to_string(),
                    dest_name: "kube-dns".to_string(),
                    dest_namespace: "kube-system".to_string(),
                    dest_port: 53,
                    proto: "UDP".to_string(),
                    reporter: proto::Reporter::Dst as i32,
                    action: proto::Action::Deny as i32,
                    ..Default::default()
                }),
                num_connections_started: 4,
                ..Default::default()
            }),
        };

        let record = FlowRecord::from(result);
        let key = record.key.unwrap();

        assert_eq!(record.action, FlowAction::Deny);
        assert_eq!(record.connections_started, 4);
        assert_eq!(key.reporter, Reporter::Destination);
        assert_eq!(key.labels().dst_port, "53");
    }

    #[test]
    fn test_record_without_identity() {
        let no_flow = FlowRecord::from(proto::FlowResult { id: 1, flow: None });
        assert!(no_flow.key.is_none());

        let no_key = FlowRecord::from(proto::FlowResult {
            id: 2,
            flow: Some(proto::Flow::default()),
        });
        assert!(no_key.key.is_none());
    }

    #[test]
    fn test_pass_and_unknown_actions_are_other() {
        assert_eq!(FlowAction::from(proto::Action::Pass), FlowAction::Other);
        assert_eq!(FlowAction::from(proto::Action::Unspecified), FlowAction::Other);
    }

    #[test]
    fn test_negative_connection_count_clamps_to_zero() {
        let record = FlowRecord::from(proto::FlowResult {
            id: 1,
            flow: Some(proto::Flow {
                key: Some(proto::FlowKey::default()),
                num_connections_started: -5,
                ..Default::default()
            }),
        });

        assert_eq!(record.connections_started, 0);
    }

    #[test]
    fn test_trailing_window() {
        let window = PollWindow::trailing(Duration::from_secs(15), DEFAULT_AGGREGATION_INTERVAL);

        assert_eq!(window.start_offset_secs, -15);
        assert_eq!(window.aggregation_interval_secs, 15);
    }
}
