//! The BlazeRPC application facade.
//!
//! A [`BlazeApp`] collects model registrations and configuration before the
//! server starts. All models must be registered up front; `serve()` freezes
//! the registry and hands everything to the server lifecycle.

use crate::config::BlazeConfig;
use crate::error::{BlazeError, Result};
use crate::middleware::{LoggingMiddleware, MetricsMiddleware, Middleware};
use crate::registry::{ModelDescriptor, ModelRegistry};
use crate::schema::ProtoGenerator;
use crate::server;
use crate::shutdown::{ShutdownCoordinator, SignalHandler};
use std::net::SocketAddr;
use std::sync::Arc;

/// An inference application: a named set of models plus server settings.
pub struct BlazeApp {
    name: String,
    config: BlazeConfig,
    registry: ModelRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl BlazeApp {
    /// Create an app with default configuration and the standard logging
    /// and metrics middleware.
    pub fn new(name: &str) -> Self {
        Self::with_config(name, BlazeConfig::default())
    }

    /// Create an app with explicit configuration.
    pub fn with_config(name: &str, config: BlazeConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            registry: ModelRegistry::new(),
            middleware: vec![
                Arc::new(LoggingMiddleware),
                Arc::new(MetricsMiddleware),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BlazeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut BlazeConfig {
        &mut self.config
    }

    /// Register a model. Must happen before `serve()`.
    pub fn register(&mut self, model: ModelDescriptor) -> Result<()> {
        self.registry.register(model)
    }

    /// Attach additional middleware.
    pub fn middleware(&mut self, layer: impl Middleware + 'static) {
        self.middleware.push(Arc::new(layer));
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The generated `.proto` document for the current registry.
    pub fn proto_schema(&self) -> String {
        ProtoGenerator::new().generate(&self.registry)
    }

    /// Start the gRPC server and block until an interrupt or termination
    /// signal completes the drain.
    pub async fn serve(self, host: &str, port: u16) -> Result<()> {
        let coordinator = ShutdownCoordinator::new();
        tokio::spawn(SignalHandler::new(coordinator.clone()).run());
        self.serve_with_coordinator(host, port, coordinator).await
    }

    /// Like [`serve`](Self::serve), but shutdown is driven by the given
    /// coordinator instead of OS signals.
    pub async fn serve_with_coordinator(
        self,
        host: &str,
        port: u16,
        coordinator: ShutdownCoordinator,
    ) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| BlazeError::Config(format!("invalid bind address: {}", e)))?;
        server::run(self, addr, coordinator).await
    }

    pub(crate) fn into_parts(self) -> (BlazeConfig, ModelRegistry, Vec<Arc<dyn Middleware>>) {
        (self.config, self.registry, self.middleware)
    }
}
