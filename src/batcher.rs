//! Adaptive request batching.
//!
//! Collects individual inference submissions into batches bounded by a
//! maximum size and a timeout, dispatches each batch through the model's
//! vectorized callable, and distributes per-item results or errors back to
//! the individual submitters.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Request Batcher                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  1. Submissions arrive on the input channel                     │
//! │  2. Collector waits for the batch window or a full batch        │
//! │  3. Slots are transposed into parallel per-parameter vectors    │
//! │  4. The batch is dispatched through one callable invocation     │
//! │  5. Results are distributed back to individual completions      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failure handling: if the callable fails, every slot in the batch
//! receives the error; if the returned vector length differs from the batch
//! size, the whole batch fails; if a single position carries an error, only
//! that slot fails. The batcher stays available after any of these.

use crate::config::BatchConfig;
use crate::error::{BlazeError, Result};
use crate::executor::Executor;
use crate::registry::ModelDescriptor;
use crate::types::{BatchArgs, Kwargs, Value};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

/// Capacity of the submission channel. Large enough that enqueueing never
/// blocks a submitter in practice.
const SUBMIT_QUEUE_CAPACITY: usize = 1024;

/// One in-flight submission waiting to be batched.
struct BatchSlot {
    /// Decoded keyword arguments for one caller.
    args: Kwargs,
    /// Single-use handle resolved with the per-item result or error.
    completion: oneshot::Sender<Result<Value>>,
    /// Submission time, used for timeout accounting.
    enqueued_at: Instant,
}

/// Per-model coordinator that assembles bounded batches.
pub struct Batcher {
    model: Arc<ModelDescriptor>,
    tx: StdMutex<Option<mpsc::Sender<BatchSlot>>>,
    collector: Mutex<Option<JoinHandle<()>>>,
}

impl Batcher {
    /// Start a batcher for a model, spawning its background collector.
    pub fn start(
        model: Arc<ModelDescriptor>,
        executor: Arc<Executor>,
        config: BatchConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(SUBMIT_QUEUE_CAPACITY);

        let collector_model = model.clone();
        let handle = tokio::spawn(async move {
            run_collector(collector_model, executor, config, rx).await;
        });

        Arc::new(Self {
            model,
            tx: StdMutex::new(Some(tx)),
            collector: Mutex::new(Some(handle)),
        })
    }

    /// Submit one request and wait for its batched result.
    ///
    /// The completion is signalled exactly once. Submissions arriving after
    /// [`stop`](Self::stop) are rejected with a shutdown error.
    pub async fn submit(&self, args: Kwargs) -> Result<Value> {
        let sender = match self.tx.lock().expect("batcher sender lock poisoned").clone() {
            Some(sender) => sender,
            None => return Err(BlazeError::shutting_down()),
        };

        let (completion, result) = oneshot::channel();
        let slot = BatchSlot {
            args,
            completion,
            enqueued_at: Instant::now(),
        };

        if sender.send(slot).await.is_err() {
            return Err(BlazeError::shutting_down());
        }

        match result.await {
            Ok(outcome) => outcome,
            // The collector never drops a slot without a terminal signal;
            // a lost completion means it died.
            Err(_) => Err(BlazeError::Internal(format!(
                "batcher for model '{}' dropped a completion",
                self.model.name
            ))),
        }
    }

    /// Close the input channel and wait for the collector to exit.
    ///
    /// Slots already collected are dispatched one final time so in-flight
    /// clients still get responses.
    pub async fn stop(&self) {
        {
            let mut tx = self.tx.lock().expect("batcher sender lock poisoned");
            tx.take();
        }
        let handle = { self.collector.lock().await.take() };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(model = %self.model.name, error = %e, "batcher collector task failed");
            }
        }
        debug!(model = %self.model.name, "batcher stopped");
    }
}

/// Collector loop: wait for the first slot, then admit more until the batch
/// is full or the deadline passes, then dispatch.
async fn run_collector(
    model: Arc<ModelDescriptor>,
    executor: Arc<Executor>,
    config: BatchConfig,
    mut rx: mpsc::Receiver<BatchSlot>,
) {
    loop {
        // Block until the first slot arrives; no busy wait.
        let first = match rx.recv().await {
            Some(slot) => slot,
            None => break,
        };

        // The window is anchored to the first slot's enqueue time.
        let deadline = first.enqueued_at + config.batch_timeout;
        let mut slots = vec![first];
        let mut input_closed = false;

        while slots.len() < config.max_batch_size {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(slot) => slots.push(slot),
                    None => {
                        input_closed = true;
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        debug!(model = %model.name, batch_size = slots.len(), "dispatching batch");
        counter!("blazerpc_batches_total", "model" => model.name.clone()).increment(1);
        histogram!("blazerpc_batch_size", "model" => model.name.clone())
            .record(slots.len() as f64);

        dispatch(&model, &executor, slots).await;

        if input_closed {
            break;
        }
    }
}

/// Transpose slots into parallel vectors, invoke the callable, and signal
/// every completion exactly once.
async fn dispatch(model: &ModelDescriptor, executor: &Executor, mut slots: Vec<BatchSlot>) {
    let batch_size = slots.len();

    let mut batch: BatchArgs = BatchArgs::with_capacity(model.params.len());
    for (param, _) in &model.params {
        let mut column = Vec::with_capacity(batch_size);
        for slot in slots.iter_mut() {
            match slot.args.remove(param) {
                Some(value) => column.push(value),
                None => {
                    fail_all(
                        model,
                        slots,
                        format!("missing argument '{}' in batched submission", param),
                    );
                    return;
                }
            }
        }
        batch.insert(param.clone(), column);
    }

    let results = match executor.execute_batch(model, batch).await {
        Ok(results) => results,
        Err(e) => {
            // Whole-batch failure: every slot receives the same error.
            error!(model = %model.name, error = %e, "batch inference failed");
            fail_all(model, slots, e.to_string());
            return;
        }
    };

    if results.len() != batch_size {
        fail_all(
            model,
            slots,
            format!(
                "batched callable returned {} results for {} inputs",
                results.len(),
                batch_size
            ),
        );
        return;
    }

    for (slot, result) in slots.into_iter().zip(results) {
        // An abandoned completion discards its result silently.
        let _ = slot.completion.send(result);
    }
}

fn fail_all(model: &ModelDescriptor, slots: Vec<BatchSlot>, message: String) {
    for slot in slots {
        let _ = slot
            .completion
            .send(Err(BlazeError::inference(&model.name, message.clone())));
    }
}
