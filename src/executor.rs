//! Model execution.
//!
//! Wraps registered callables with sync/async bridging so user code never
//! runs on the reactor when it might block. Blocking callables are offloaded
//! through a semaphore-bounded worker pool; blocking generators are pumped
//! from a worker thread with each yielded value posted back to the reactor
//! over a bounded handoff channel. Exhausting the pool blocks the offload
//! call, which applies natural backpressure upstream.

use crate::config::ExecutorConfig;
use crate::error::{BlazeError, Result};
use crate::registry::{Handler, ModelDescriptor};
use crate::types::{BatchArgs, Kwargs, Value};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Reactor-safe wrapper around user callables.
pub struct Executor {
    permits: Arc<Semaphore>,
    stream_buffer: usize,
}

impl Executor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.worker_threads)),
            stream_buffer: config.stream_buffer.max(1),
        }
    }

    /// Run a non-streaming model once with the given keyword arguments.
    ///
    /// Batch-contract models are invoked with singleton vectors; this is the
    /// path taken when batching is globally disabled.
    pub async fn execute(&self, model: &ModelDescriptor, kwargs: Kwargs) -> Result<Value> {
        match &model.handler {
            Handler::Unary(f) => f(kwargs)
                .await
                .map_err(|e| wrap_model_error(&model.name, e)),
            Handler::BlockingUnary(f) => {
                let f = f.clone();
                self.offload(&model.name, move || f(kwargs)).await
            }
            Handler::Batch(_) | Handler::BlockingBatch(_) => {
                let batch: BatchArgs = kwargs
                    .into_iter()
                    .map(|(name, value)| (name, vec![value]))
                    .collect();
                let mut results = self.execute_batch(model, batch).await?;
                if results.len() != 1 {
                    return Err(BlazeError::inference(
                        &model.name,
                        format!("batched callable returned {} results for 1 input", results.len()),
                    ));
                }
                results.remove(0)
            }
            Handler::Streaming(_) | Handler::BlockingStreaming(_) => Err(BlazeError::Internal(
                format!("streaming model '{}' invoked as unary", model.name),
            )),
        }
    }

    /// Run a batch-contract model with vectorized arguments.
    pub async fn execute_batch(
        &self,
        model: &ModelDescriptor,
        batch: BatchArgs,
    ) -> Result<Vec<Result<Value>>> {
        match &model.handler {
            Handler::Batch(f) => f(batch)
                .await
                .map_err(|e| wrap_model_error(&model.name, e)),
            Handler::BlockingBatch(f) => {
                let f = f.clone();
                self.offload(&model.name, move || f(batch)).await
            }
            _ => Err(BlazeError::Internal(format!(
                "model '{}' does not use the batched calling convention",
                model.name
            ))),
        }
    }

    /// Run a streaming model, returning its lazy sequence of values.
    ///
    /// Dropping the returned stream propagates cancellation: async streams
    /// are dropped in place, and a blocking generator's pump observes the
    /// closed handoff channel at its next yield and stops pulling, so the
    /// generator is dropped on the worker thread.
    pub fn execute_stream(
        &self,
        model: &Arc<ModelDescriptor>,
        kwargs: Kwargs,
    ) -> BoxStream<'static, Result<Value>> {
        match &model.handler {
            Handler::Streaming(f) => {
                let name = model.name.clone();
                f(kwargs)
                    .map(move |item| item.map_err(|e| wrap_model_error(&name, e)))
                    .boxed()
            }
            Handler::BlockingStreaming(f) => {
                let (tx, rx) = mpsc::channel(self.stream_buffer);
                let permits = self.permits.clone();
                let f = f.clone();
                let name = model.name.clone();

                tokio::spawn(async move {
                    let permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let pump_tx = tx.clone();
                    let pump_name = name.clone();
                    let joined = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        for item in f(kwargs) {
                            let item =
                                item.map_err(|e| wrap_model_error(&pump_name, e));
                            if pump_tx.blocking_send(item).is_err() {
                                debug!(model = %pump_name, "stream consumer gone, stopping generator");
                                break;
                            }
                        }
                    })
                    .await;
                    if joined.is_err() {
                        let _ = tx
                            .send(Err(BlazeError::inference(&name, "model generator panicked")))
                            .await;
                    }
                });

                ReceiverStream::new(rx).boxed()
            }
            _ => {
                let name = model.name.clone();
                futures::stream::once(async move {
                    Err(BlazeError::Internal(format!(
                        "model '{}' is not a streaming model",
                        name
                    )))
                })
                .boxed()
            }
        }
    }

    /// Run a blocking closure on the worker pool.
    async fn offload<T, F>(&self, model: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BlazeError::Internal("worker pool closed".to_string()))?;

        let model_name = model.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|_| BlazeError::inference(&model_name, "model callable panicked"))?;

        result.map_err(|e| wrap_model_error(model, e))
    }
}

/// Attribute a user-callable failure to its model, without double-wrapping
/// errors that already carry one.
fn wrap_model_error(model: &str, err: BlazeError) -> BlazeError {
    match err {
        e @ BlazeError::Inference { .. } => e,
        other => BlazeError::inference(model, other.to_string()),
    }
}
