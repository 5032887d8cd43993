//! Tracing error types

use opentelemetry::trace::TraceError;
use thiserror::Error;

/// Tracing error
///
/// Construction errors mean the service has no usable identity for its
/// spans; callers are expected to abort startup on them.
#[derive(Error, Debug)]
pub enum TracingError {
    /// Local service name is empty
    #[error("Service name must not be empty")]
    MissingServiceName,

    /// Local service address could not be parsed or resolved
    #[error("Invalid service address '{address}': {reason}")]
    InvalidServiceAddress { address: String, reason: String },

    /// Reporter needs a Tokio runtime to run its export task
    #[error("Zipkin reporter must be created inside a Tokio runtime")]
    NoRuntime,

    /// Reporter could not be created
    #[error("Exporter error: {0}")]
    Exporter(#[source] TraceError),

    /// Flushing or shutting down the provider failed
    #[error("Shutdown error: {0}")]
    Shutdown(#[source] TraceError),
}

/// Result type for tracing operations
pub type Result<T> = std::result::Result<T, TracingError>;
