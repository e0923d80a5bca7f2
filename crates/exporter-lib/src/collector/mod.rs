//! Flow collection from Goldmane
//!
//! This module polls a [`FlowSource`] on a fixed interval and translates each
//! received flow into counter increments on the exporter metrics.

mod r#loop;


pub use r#loop::{CollectorConfig, CycleOutcome, FlowCollector, FlowCollectorBuilder};

use crate::error::StreamError;
use crate::models::{FlowRecord, PollWindow};
use std::pin::Pin;
use tokio_stream::Stream;

pub use async_trait::async_trait;

/// Stream of flows for one poll window, ending at end-of-stream or on the first error
pub type FlowStream = Pin<Box<dyn Stream<Item = Result<FlowRecord, StreamError>> + Send>>;

/// Trait for flow data sources
#[async_trait]
pub trait FlowSource: Send + Sync {
    /// Open a stream of the flows observed within `window`
    async fn stream_flows(&self, window: PollWindow) -> Result<FlowStream, StreamError>;

    /// Rebuild the underlying connection
    async fn reconnect(&self);

    /// Release the underlying connection
    async fn close(&self);
}
