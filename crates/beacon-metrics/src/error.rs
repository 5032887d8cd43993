//! Metrics error types

use thiserror::Error;

/// Metrics error
///
/// Emission through the [`Metrics`](crate::Metrics) trait never returns
/// these; they surface from constructors and from the `try_*` methods of
/// the Prometheus backend.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Socket setup for the StatsD sink failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// StatsD client error
    #[error("StatsD error: {0}")]
    Statsd(#[from] cadence::MetricError),

    /// Instrument could not be created or registered
    #[error("Registration failed for '{name}': {source}")]
    Registration {
        /// Normalized instrument name
        name: String,
        /// Underlying registry error
        #[source]
        source: prometheus::Error,
    },

    /// Histogram bucket specification rejected
    #[error("Invalid buckets for '{name}': {reason}")]
    InvalidBuckets { name: String, reason: String },

    /// Tag keys differ from the ones the instrument was created with
    #[error("Label mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Text exposition failed
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Result type for metrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;
