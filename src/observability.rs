//! Observability for BlazeRPC.
//!
//! Provides logging initialization. Metrics are recorded through the
//! `metrics` facade by the metrics middleware and the batcher; installing a
//! recorder/exporter is left to the host process.

use crate::config::ObservabilityConfig;
use crate::error::{BlazeError, Result};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Set up the global tracing subscriber from configuration.
///
/// `RUST_LOG` takes precedence over the configured level. The output format
/// is either human-readable or JSON lines, per `json_logs`.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let output: Box<dyn Layer<Registry> + Send + Sync> = if config.json_logs {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    Registry::default()
        .with(output.with_filter(filter))
        .try_init()
        .map_err(|e| BlazeError::Config(format!("logging setup failed: {}", e)))?;

    debug!(
        level = %config.log_level,
        json = config.json_logs,
        "logging configured"
    );
    Ok(())
}
