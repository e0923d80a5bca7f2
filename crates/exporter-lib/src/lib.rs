//! Exporter library for Calico Goldmane flow metrics
//!
//! This crate provides the core functionality for:
//! - Streaming flow aggregates from the Goldmane gRPC API
//! - Translating flows into Prometheus counters
//! - The periodic collection loop and its failure handling
//! - Observability of the exporter itself

pub mod collector;
pub mod error;
pub mod goldmane;
pub mod models;
pub mod observability;
pub mod proto;

pub use collector::{FlowCollector, FlowCollectorBuilder, FlowSource, FlowStream};
pub use error::{ConnectError, StreamError};
pub use goldmane::{ClientConfig, GoldmaneClient, TlsSettings};
pub use models::*;
pub use observability::{ExporterMetrics, PollResult, StructuredLogger};
pub use tokio_util::sync::CancellationToken;
