//! Integration tests for batched inference through the full gRPC path.

#[allow(dead_code)]
mod common;

use blazerpc::app::BlazeApp;
use blazerpc::config::BlazeConfig;
use blazerpc::error::BlazeError;
use blazerpc::registry::ModelBuilder;
use blazerpc::types::{TypeDescriptor, Value};
use common::TestServer;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tonic::Code;

/// App with a batched doubler that records every inbound batch, plus an
/// unbatched echo used to warm up connections.
fn batching_app(
    invocations: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Vec<i64>>>>,
    max_batch_size: usize,
    batch_timeout: Duration,
) -> BlazeApp {
    let mut config = BlazeConfig::development();
    config.batching.enabled = true;
    config.batching.max_batch_size = max_batch_size;
    config.batching.batch_timeout = batch_timeout;

    let mut app = BlazeApp::with_config("test", config);

    app.register(
        ModelBuilder::new("echo")
            .param("s", TypeDescriptor::string())
            .returns(TypeDescriptor::string())
            .handler_fn(|kwargs| async move { Ok(kwargs["s"].clone()) })
            .build()
            .unwrap(),
    )
    .unwrap();

    app.register(
        ModelBuilder::new("double")
            .param("x", TypeDescriptor::int64())
            .returns(TypeDescriptor::int64())
            .batch_fn(move |batch| {
                let invocations = invocations.clone();
                let batches = batches.clone();
                async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    let column = batch["x"].clone();

                    // Record the inbound vector for assertions.
                    batches
                        .lock()
                        .unwrap()
                        .push(column.iter().filter_map(|v| v.as_i64()).collect());

                    Ok(column
                        .into_iter()
                        .map(|value| {
                            value
                                .as_i64()
                                .map(|v| Value::Int(v * 2))
                                .ok_or_else(|| {
                                    BlazeError::validation(
                                        "x",
                                        format!("expected int64, got {}", value.kind()),
                                    )
                                })
                        })
                        .collect())
                }
            })
            .build()
            .unwrap(),
    )
    .unwrap();

    app
}

#[tokio::test]
async fn test_batch_aggregation_under_load() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let batches = Arc::new(Mutex::new(Vec::new()));
    let server = TestServer::spawn(batching_app(
        invocations.clone(),
        batches.clone(),
        10,
        Duration::from_millis(50),
    ))
    .await;

    // Warm up the connection so the concurrent calls land together.
    let mut warmup = server.client().await;
    warmup.predict("echo", json!({"s": "warm"})).await.unwrap();

    let mut handles = Vec::new();
    for x in 1..=5i64 {
        let mut client = warmup.clone();
        handles.push(tokio::spawn(async move {
            client.predict("double", json!({"x": x})).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, json!((i as i64 + 1) * 2));
    }

    // All five submissions were served by a single callable invocation.
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let mut seen = batches[0].clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);

    drop(batches);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_timeout_driven_flush() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let batches = Arc::new(Mutex::new(Vec::new()));
    let server = TestServer::spawn(batching_app(
        invocations.clone(),
        batches.clone(),
        10,
        Duration::from_millis(20),
    ))
    .await;

    let mut client = server.client().await;
    let started = std::time::Instant::now();
    let result = client.predict("double", json!({"x": 7})).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result, json!(14));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(batches.lock().unwrap()[0], vec![7]);
    // Partial batch of one dispatches no later than the window plus a
    // generous scheduler fudge.
    assert!(elapsed < Duration::from_millis(500), "flush took {:?}", elapsed);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_per_item_failure_isolation_over_grpc() {
    let mut config = BlazeConfig::development();
    config.batching.enabled = true;
    config.batching.max_batch_size = 10;
    config.batching.batch_timeout = Duration::from_millis(50);

    let mut app = BlazeApp::with_config("test", config);
    app.register(
        ModelBuilder::new("echo")
            .param("s", TypeDescriptor::string())
            .returns(TypeDescriptor::string())
            .handler_fn(|kwargs| async move { Ok(kwargs["s"].clone()) })
            .build()
            .unwrap(),
    )
    .unwrap();
    app.register(
        ModelBuilder::new("picky")
            .param("x", TypeDescriptor::int64())
            .returns(TypeDescriptor::int64())
            .batch_fn(|batch| async move {
                Ok(batch["x"]
                    .iter()
                    .map(|value| {
                        let x = value.as_i64().unwrap_or(0);
                        if x < 0 {
                            Err(BlazeError::inference("picky", "bad item"))
                        } else {
                            Ok(Value::Int(x * 2))
                        }
                    })
                    .collect())
            })
            .build()
            .unwrap(),
    )
    .unwrap();

    let server = TestServer::spawn(app).await;
    let mut warmup = server.client().await;
    warmup.predict("echo", json!({"s": "warm"})).await.unwrap();

    let mut ok_client = warmup.clone();
    let mut bad_client = warmup.clone();
    let mut ok_client_b = warmup.clone();

    let ok = tokio::spawn(async move { ok_client.predict("picky", json!({"x": 3})).await });
    let bad = tokio::spawn(async move { bad_client.predict("picky", json!({"x": -1})).await });
    let ok_b = tokio::spawn(async move { ok_client_b.predict("picky", json!({"x": 5})).await });

    assert_eq!(ok.await.unwrap().unwrap(), json!(6));
    assert_eq!(ok_b.await.unwrap().unwrap(), json!(10));

    let status = bad.await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("bad item"));

    // The batcher stays available for subsequent requests.
    assert_eq!(
        warmup.predict("picky", json!({"x": 4})).await.unwrap(),
        json!(8)
    );

    server.shutdown().await.unwrap();
}
