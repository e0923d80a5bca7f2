use std::path::PathBuf;
use thiserror::Error;

/// Failure to set up the Goldmane channel. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to read {what} from {path:?}: {source}")]
    ReadFile {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} at {path:?} is not valid PEM: {reason}")]
    InvalidPem {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("CA bundle at {0:?} contains no certificates")]
    EmptyCaBundle(PathBuf),

    #[error("invalid Goldmane endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to load system trust roots: {0}")]
    SystemRoots(#[source] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Failure while opening or consuming a flow stream. Contained per cycle.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to create stream: {0}")]
    Open(tonic::Status),

    #[error("error receiving flow: {0}")]
    Recv(tonic::Status),

    #[error("Goldmane client is closed")]
    Closed,
}
