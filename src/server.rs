//! Server lifecycle: bind, serve, drain.
//!
//! `run` freezes the registry, starts one batcher per batch-contract model,
//! registers the dynamic servicer alongside the gRPC health and reflection
//! services, and blocks until the shutdown coordinator fires. Shutdown
//! stops accepting new connections, rejects late batcher submissions, and
//! gives in-flight work a bounded grace window before forcing the
//! transport closed.

use crate::app::BlazeApp;
use crate::batcher::Batcher;
use crate::config::BlazeConfig;
use crate::error::{BlazeError, Result};
use crate::executor::Executor;
use crate::middleware::MiddlewareStack;
use crate::registry::ModelRegistry;
use crate::schema;
use crate::servicer::InferenceServicer;
use crate::shutdown::ShutdownCoordinator;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

/// Bind `addr` and serve until the coordinator signals shutdown.
///
/// Bind and registry-validation failures are fatal and returned
/// immediately; runtime handler errors never terminate the server.
pub async fn run(app: BlazeApp, addr: SocketAddr, coordinator: ShutdownCoordinator) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| BlazeError::Config(format!("failed to bind {}: {}", addr, e)))?;
    run_with_listener(app, listener, coordinator).await
}

/// Serve on an already-bound listener. Split out so tests can bind an
/// ephemeral port first.
pub async fn run_with_listener(
    app: BlazeApp,
    listener: TcpListener,
    coordinator: ShutdownCoordinator,
) -> Result<()> {
    let (config, registry, middleware) = app.into_parts();
    config.validate()?;

    if registry.is_empty() {
        return Err(BlazeError::Config(
            "no models registered; register at least one model before serving".to_string(),
        ));
    }

    // Freeze the registry: from here on it is read-only shared state.
    let registry = Arc::new(registry);
    let executor = Arc::new(Executor::new(&config.executor));

    let batchers = start_batchers(&config, &registry, &executor);

    let servicer = InferenceServicer::new(
        registry.clone(),
        executor,
        batchers.clone(),
        MiddlewareStack::new(middleware),
    );

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<InferenceServicer>().await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(schema::file_descriptor_set(&registry))
        .build_v1alpha()
        .map_err(|e| BlazeError::Internal(format!("failed to build reflection service: {}", e)))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| BlazeError::Config(format!("listener has no local address: {}", e)))?;
    info!(addr = %local_addr, models = registry.len(), "server listening");

    let shutdown = coordinator.clone();
    let mut serve_task = tokio::spawn(
        Server::builder()
            .add_service(health_service)
            .add_service(reflection)
            .add_service(servicer)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.wait_for_shutdown().await;
            }),
    );

    tokio::select! {
        result = &mut serve_task => {
            // The transport ended on its own: surface the failure.
            stop_batchers(&batchers).await;
            return flatten_serve_result(result);
        }
        _ = coordinator.wait_for_shutdown() => {}
    }

    let grace = config.server.grace_period;
    info!(grace = ?grace, "shutdown requested, draining in-flight work");
    health_reporter.set_not_serving::<InferenceServicer>().await;

    // Stopping each batcher dispatches its collected slots one final time;
    // submissions from here on are rejected as unavailable.
    let drained = tokio::time::timeout(grace, async {
        stop_batchers(&batchers).await;
        flatten_serve_result((&mut serve_task).await)
    })
    .await;

    match drained {
        Ok(result) => result?,
        Err(_) => {
            warn!(grace = ?grace, "grace period expired, forcing shutdown");
            serve_task.abort();
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// One batcher per non-streaming, batch-contract model, unless batching is
/// globally disabled. Streaming and unary-contract models bypass batching.
fn start_batchers(
    config: &BlazeConfig,
    registry: &Arc<ModelRegistry>,
    executor: &Arc<Executor>,
) -> HashMap<String, Arc<Batcher>> {
    let mut batchers = HashMap::new();
    if !config.batching.enabled {
        return batchers;
    }

    for model in registry.list() {
        if model.streaming() || !model.handler.is_batch() {
            continue;
        }
        info!(
            model = %model.name,
            max_batch_size = config.batching.max_batch_size,
            batch_timeout = ?config.batching.batch_timeout,
            "starting batcher"
        );
        let batcher = Batcher::start(model.clone(), executor.clone(), config.batching.clone());
        batchers.insert(model.name.clone(), batcher);
    }
    batchers
}

async fn stop_batchers(batchers: &HashMap<String, Arc<Batcher>>) {
    for batcher in batchers.values() {
        batcher.stop().await;
    }
}

fn flatten_serve_result(
    result: std::result::Result<
        std::result::Result<(), tonic::transport::Error>,
        tokio::task::JoinError,
    >,
) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BlazeError::Transport(e.to_string())),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(BlazeError::Internal(format!("server task failed: {}", e))),
    }
}
