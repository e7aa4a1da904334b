//! Error types for kubesee

use thiserror::Error;

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Main error type for the exporter
///
/// Configuration and bootstrap errors are fatal at startup; everything
/// event-scoped is handled (logged and consumed) closer to where it occurs.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Kubernetes client error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Metrics registration error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Drain did not complete before the timeout
    #[error("drain timed out for receiver '{0}'")]
    DrainTimeout(String),

    /// The registry actor is gone
    #[error("registry closed")]
    RegistryClosed,
}

/// Error type for sink operations
#[derive(Error, Debug)]
pub enum SinkError {
    /// Sink construction failed
    #[error("initialization failed: {0}")]
    Init(String),

    /// Event could not be serialized for this sink
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Template rendering failed
    #[error("template error: {0}")]
    Template(String),

    /// Delivery failed
    #[error("send failed: {0}")]
    Send(String),

    /// The remote side answered with a non-retryable status
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// Connection-level failure
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Send(err.to_string())
    }
}
