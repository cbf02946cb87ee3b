//! Middleware (interceptors) for BlazeRPC servers.
//!
//! Middleware observes two interception points around every RPC: after the
//! request is received and before trailers are sent. It cannot mutate
//! payloads, so a middleware can watch but never corrupt the
//! request/response contract.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tonic::Code;
use tracing::info;

/// Observe-only hooks into the request lifecycle.
pub trait Middleware: Send + Sync {
    /// Called when a request has been received, before decoding.
    fn on_request(&self, method: &str);

    /// Called once per RPC before trailers are sent (or when the stream is
    /// torn down), with the terminal status and elapsed time.
    fn on_response(&self, method: &str, code: Code, elapsed: Duration);
}

/// An ordered set of middleware invoked by the servicer around each RPC.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareStack {
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            layers: Arc::new(layers),
        }
    }

    pub fn on_request(&self, method: &str) {
        for layer in self.layers.iter() {
            layer.on_request(method);
        }
    }

    pub fn on_response(&self, method: &str, code: Code, elapsed: Duration) {
        for layer in self.layers.iter() {
            layer.on_response(method, code, elapsed);
        }
    }
}

/// Logs each RPC with method name and terminal status.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn on_request(&self, method: &str) {
        info!(method = %method, "rpc request");
    }

    fn on_response(&self, method: &str, code: Code, elapsed: Duration) {
        info!(
            method = %method,
            status = ?code,
            elapsed_ms = elapsed.as_millis() as u64,
            "rpc response"
        );
    }
}

/// Records request counters and latency histograms.
///
/// Exported metrics:
///
/// - `blazerpc_requests_total{method, status}`
/// - `blazerpc_request_duration_seconds{method}`
#[derive(Debug, Default)]
pub struct MetricsMiddleware;

impl Middleware for MetricsMiddleware {
    fn on_request(&self, _method: &str) {}

    fn on_response(&self, method: &str, code: Code, elapsed: Duration) {
        counter!(
            "blazerpc_requests_total",
            "method" => method.to_string(),
            "status" => format!("{}", code as i32)
        )
        .increment(1);
        histogram!(
            "blazerpc_request_duration_seconds",
            "method" => method.to_string()
        )
        .record(elapsed.as_secs_f64());
    }
}
