//! BlazeRPC - Lightning-fast gRPC serving for ML inference.
//!
//! BlazeRPC turns a set of typed model functions into a gRPC service: each
//! registered model becomes one RPC, a matching protobuf schema is derived
//! from the declared parameter and return types, concurrent requests are
//! grouped into bounded batches for throughput, and streaming models send
//! incremental results as they are produced.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BlazeRPC                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: tonic gRPC | health | reflection                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Dispatcher: path routing | decode | encode | status map    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Runtime: batcher | executor (worker pool) | middleware     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Model layer: registry | type descriptors | schema codegen  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use blazerpc::app::BlazeApp;
//! use blazerpc::registry::ModelBuilder;
//! use blazerpc::types::{TypeDescriptor, Value};
//!
//! #[tokio::main]
//! async fn main() -> blazerpc::Result<()> {
//!     let mut app = BlazeApp::new("example");
//!     app.register(
//!         ModelBuilder::new("echo")
//!             .param("s", TypeDescriptor::string())
//!             .returns(TypeDescriptor::string())
//!             .handler_fn(|kwargs| async move { Ok(kwargs["s"].clone()) })
//!             .build()?,
//!     )?;
//!     app.serve("0.0.0.0", 50051).await
//! }
//! ```

pub mod app;
pub mod batcher;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod middleware;
pub mod observability;
pub mod registry;
pub mod schema;
pub mod server;
pub mod servicer;
pub mod shutdown;
pub mod tensor;
pub mod types;
pub mod wire;

// Re-exports
pub use app::BlazeApp;
pub use client::BlazeClient;
pub use config::BlazeConfig;
pub use error::{BlazeError, Result};
pub use registry::{ModelBuilder, ModelDescriptor, ModelRegistry};
pub use tensor::TensorData;
pub use types::{DType, Dim, Kwargs, ScalarKind, TypeDescriptor, Value};
