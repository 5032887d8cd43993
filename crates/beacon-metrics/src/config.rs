//! Backend selection

use crate::error::Result;
use crate::prom::{PrometheusConfig, PrometheusMetrics};
use crate::statsd::{StatsdConfig, StatsdMetrics};
use crate::{NullMetrics, SharedMetrics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which backend receives emissions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum MetricsConfig {
    /// Discard everything
    #[default]
    Null,
    /// StatsD agent over UDP
    Statsd(StatsdConfig),
    /// Process-wide Prometheus registry
    Prometheus(PrometheusConfig),
}

impl MetricsConfig {
    /// Build the configured backend
    pub fn build(&self, service_name: &str, environment: &str) -> Result<SharedMetrics> {
        let metrics: SharedMetrics = match self {
            MetricsConfig::Null => Arc::new(NullMetrics),
            MetricsConfig::Statsd(config) => {
                Arc::new(StatsdMetrics::from_config(service_name, environment, config)?)
            }
            MetricsConfig::Prometheus(config) => Arc::new(PrometheusMetrics::from_config(config)?),
        };

        tracing::info!(backend = self.backend_name(), "Metrics backend initialized");
        Ok(metrics)
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            MetricsConfig::Null => "null",
            MetricsConfig::Statsd(_) => "statsd",
            MetricsConfig::Prometheus(_) => "prometheus",
        }
    }
}
