//! Goldmane flow API client
//!
//! This module provides:
//! - gRPC channel construction with optional (mutual) TLS
//! - The server-streaming flow call, exposed as a stream of [`FlowRecord`]s
//!
//! [`FlowRecord`]: crate::models::FlowRecord

mod client;
mod tls;

pub use client::{ClientConfig, GoldmaneClient, TlsSettings};
