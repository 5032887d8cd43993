//! Facade bundle built from configuration

use crate::config::TelemetryConfig;
use anyhow::{Context as _, Result};
use beacon_metrics::{NullMetrics, SharedMetrics};
use beacon_tracing::{Client, NoopClient, TracingClient};
use std::sync::Arc;

/// Metrics and tracing handles for one service
#[derive(Clone)]
pub struct Telemetry {
    metrics: SharedMetrics,
    tracer: Arc<dyn Client>,
    reporter: Option<Arc<TracingClient>>,
}

impl Telemetry {
    /// Build both facades
    ///
    /// With tracing configured this must run inside a Tokio runtime, since
    /// spans are reported from a background task.
    pub fn init(config: &TelemetryConfig) -> Result<Self> {
        let metrics = config
            .metrics
            .build(&config.service_name, &config.environment)
            .context("Failed to build metrics backend")?;

        let (tracer, reporter) = match &config.tracing {
            Some(zipkin) => {
                let client = Arc::new(
                    TracingClient::zipkin(zipkin).context("Failed to build tracing client")?,
                );
                let tracer: Arc<dyn Client> = client.clone();
                (tracer, Some(client))
            }
            None => {
                tracing::info!("Tracing not configured, spans will not be reported");
                let tracer: Arc<dyn Client> = Arc::new(NoopClient::new());
                (tracer, None)
            }
        };

        tracing::info!(
            service = %config.service_name,
            env = %config.environment,
            metrics = config.metrics.backend_name(),
            tracing = reporter.is_some(),
            "Telemetry initialized"
        );

        Ok(Self {
            metrics,
            tracer,
            reporter,
        })
    }

    /// Everything discarded
    pub fn disabled() -> Self {
        Self {
            metrics: Arc::new(NullMetrics),
            tracer: Arc::new(NoopClient::new()),
            reporter: None,
        }
    }

    pub fn metrics(&self) -> SharedMetrics {
        Arc::clone(&self.metrics)
    }

    pub fn tracer(&self) -> Arc<dyn Client> {
        Arc::clone(&self.tracer)
    }

    /// Whether spans are reported to a collector
    pub fn is_tracing_enabled(&self) -> bool {
        self.reporter.is_some()
    }

    /// Flush and stop the span reporter; blocks, so call it outside async tasks
    pub fn shutdown(&self) -> Result<()> {
        if let Some(reporter) = &self.reporter {
            reporter.shutdown().context("Failed to shut down tracing")?;
        }
        Ok(())
    }
}
