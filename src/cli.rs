//! Command-line interface for the `blaze` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BlazeRPC - Lightning-fast gRPC serving for ML inference.
#[derive(Parser)]
#[command(name = "blaze")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BLAZE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "BLAZE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the demo inference server
    Serve {
        /// Host to bind to
        #[arg(long, env = "BLAZE_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, env = "BLAZE_PORT", default_value_t = 50051)]
        port: u16,

        /// Disable request batching globally
        #[arg(long)]
        no_batching: bool,

        /// Maximum requests per batch
        #[arg(long, default_value_t = 32)]
        max_batch_size: usize,

        /// Batch window in milliseconds
        #[arg(long, default_value_t = 10)]
        batch_timeout_ms: u64,

        /// Shutdown grace period in seconds
        #[arg(long, default_value_t = 5)]
        grace_period_secs: u64,

        /// Worker threads for blocking model code
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },

    /// Export the generated .proto schema
    Proto {
        /// Output directory for the .proto file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
