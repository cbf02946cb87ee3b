//! Configuration module for BlazeRPC.

use crate::error::{BlazeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for a BlazeRPC server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlazeConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Batching configuration.
    pub batching: BatchConfig,
    /// Executor configuration.
    pub executor: ExecutorConfig,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl BlazeConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BlazeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| BlazeError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.batching.max_batch_size == 0 {
            return Err(BlazeError::InvalidConfig {
                field: "batching.max_batch_size".to_string(),
                reason: "Maximum batch size must be non-zero".to_string(),
            });
        }

        if self.batching.batch_timeout.is_zero() {
            return Err(BlazeError::InvalidConfig {
                field: "batching.batch_timeout".to_string(),
                reason: "Batch timeout must be non-zero".to_string(),
            });
        }

        if self.executor.worker_threads == 0 {
            return Err(BlazeError::InvalidConfig {
                field: "executor.worker_threads".to_string(),
                reason: "Worker thread count must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Create a minimal development configuration.
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 50051,
                grace_period: Duration::from_secs(5),
            },
            batching: BatchConfig {
                enabled: true,
                max_batch_size: 8,
                batch_timeout: Duration::from_millis(10),
            },
            executor: ExecutorConfig {
                worker_threads: 2,
                stream_buffer: 16,
            },
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum time to wait for in-flight RPCs during shutdown.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
            grace_period: Duration::from_secs(5),
        }
    }
}

/// Batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Enable batching globally.
    pub enabled: bool,
    /// Maximum number of requests in a batch.
    pub max_batch_size: usize,
    /// Maximum time to wait for a full batch after the first arrival.
    #[serde(with = "humantime_serde")]
    pub batch_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_size: 32,
            batch_timeout: Duration::from_millis(10),
        }
    }
}

impl BatchConfig {
    /// Low-latency configuration (smaller batches, shorter waits).
    pub fn low_latency() -> Self {
        Self {
            enabled: true,
            max_batch_size: 8,
            batch_timeout: Duration::from_millis(1),
        }
    }

    /// High-throughput configuration (larger batches, longer waits).
    pub fn high_throughput() -> Self {
        Self {
            enabled: true,
            max_batch_size: 128,
            batch_timeout: Duration::from_millis(50),
        }
    }
}

/// Executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of concurrent worker-pool offloads for blocking callables.
    pub worker_threads: usize,
    /// Capacity of the handoff channel between a blocking generator and the
    /// reactor.
    pub stream_buffer: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            stream_buffer: 16,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
