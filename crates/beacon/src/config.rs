//! Telemetry configuration

use anyhow::Context;
use beacon_metrics::MetricsConfig;
use beacon_tracing::ZipkinConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file, relative to the working directory (extension optional)
pub const DEFAULT_CONFIG_FILE: &str = "config/telemetry";

/// Prefix for environment overrides, e.g. `BEACON_SERVICE_NAME`
pub const ENV_PREFIX: &str = "BEACON";

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name, used for default metric tags and as the span endpoint name
    pub service_name: String,

    /// Deployment environment (`env:` tag)
    pub environment: String,

    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,

    /// Metrics backend
    pub metrics: MetricsConfig,

    /// Zipkin reporter; tracing is disabled when absent
    pub tracing: Option<ZipkinConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "beacon".to_string(),
            environment: "development".to_string(),
            log_level: "info".to_string(),
            metrics: MetricsConfig::Null,
            tracing: None,
        }
    }
}

impl TelemetryConfig {
    /// Load from `.env`, the default config file and `BEACON_*` variables
    ///
    /// A default file that cannot be read falls back to the defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        match Self::load_from(DEFAULT_CONFIG_FILE) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!(path = DEFAULT_CONFIG_FILE, error = %err, "No usable config, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from a config file (optional) overlaid with `BEACON_*` variables
    ///
    /// Nested keys use `__`, e.g. `BEACON_METRICS__BACKEND=prometheus`. A
    /// missing file is fine; a file that exists but does not parse is an error.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path.display()))?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize config: {}", e))
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| anyhow::anyhow!("Invalid telemetry config: {}", e))
    }
}
