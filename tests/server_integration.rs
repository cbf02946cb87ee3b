//! Integration tests for the unary request path.

#[allow(dead_code)]
mod common;

use blazerpc::app::BlazeApp;
use blazerpc::config::BlazeConfig;
use blazerpc::error::BlazeError;
use blazerpc::registry::ModelBuilder;
use blazerpc::types::{TypeDescriptor, Value};
use common::TestServer;
use serde_json::json;
use tonic::Code;

fn echo_app() -> BlazeApp {
    let mut config = BlazeConfig::development();
    config.batching.enabled = false;
    let mut app = BlazeApp::with_config("test", config);
    app.register(
        ModelBuilder::new("echo")
            .param("s", TypeDescriptor::string())
            .returns(TypeDescriptor::string())
            .handler_fn(|kwargs| async move {
                kwargs
                    .get("s")
                    .cloned()
                    .ok_or_else(|| BlazeError::validation("s", "missing argument"))
            })
            .build()
            .unwrap(),
    )
    .unwrap();
    app
}

#[tokio::test]
async fn test_unary_echo_unbatched() {
    let server = TestServer::spawn(echo_app()).await;
    let mut client = server.client().await;

    let result = client.predict("echo", json!({"s": "hi"})).await.unwrap();
    assert_eq!(result, json!("hi"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_model_returns_not_found() {
    let server = TestServer::spawn(echo_app()).await;
    let mut client = server.client().await;

    let status = client
        .predict("missing_model", json!({"s": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_field_returns_invalid_argument() {
    let server = TestServer::spawn(echo_app()).await;
    let mut client = server.client().await;

    let status = client.predict("echo", json!({})).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(status.message().contains("s"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_type_mismatch_returns_invalid_argument() {
    let server = TestServer::spawn(echo_app()).await;
    let mut client = server.client().await;

    let status = client.predict("echo", json!({"s": 42})).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_model_failure_returns_internal() {
    let mut config = BlazeConfig::development();
    config.batching.enabled = false;
    let mut app = BlazeApp::with_config("test", config);
    app.register(
        ModelBuilder::new("broken")
            .param("x", TypeDescriptor::int64())
            .returns(TypeDescriptor::int64())
            .blocking_fn(|_| Err(BlazeError::Internal("model exploded".to_string())))
            .build()
            .unwrap(),
    )
    .unwrap();

    let server = TestServer::spawn(app).await;
    let mut client = server.client().await;

    let status = client.predict("broken", json!({"x": 1})).await.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("broken"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tensor_round_trip_over_wire() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use blazerpc::types::{DType, Dim};

    let mut config = BlazeConfig::development();
    config.batching.enabled = false;
    let mut app = BlazeApp::with_config("test", config);
    app.register(
        ModelBuilder::new("negate")
            .param(
                "t",
                TypeDescriptor::tensor(DType::Float32, vec![Dim::symbolic("n")]),
            )
            .returns_tensor()
            .blocking_fn(|kwargs| {
                let tensor = kwargs["t"].as_tensor().cloned().ok_or_else(|| {
                    BlazeError::validation("t", "expected tensor")
                })?;
                let negated: Vec<f32> = tensor
                    .as_f32()
                    .ok_or_else(|| BlazeError::validation("t", "expected float32"))?
                    .into_iter()
                    .map(|v| -v)
                    .collect();
                Ok(Value::Tensor(blazerpc::tensor::TensorData::from_f32(
                    &negated,
                    tensor.shape.clone(),
                )))
            })
            .build()
            .unwrap(),
    )
    .unwrap();

    let server = TestServer::spawn(app).await;
    let mut client = server.client().await;

    let input = blazerpc::tensor::TensorData::from_f32(&[1.5, -2.0], vec![2]);
    let result = client
        .predict(
            "negate",
            json!({"t": {
                "shape": [2],
                "dtype": "float32",
                "data": BASE64.encode(&input.data),
            }}),
        )
        .await
        .unwrap();

    assert_eq!(result["shape"], json!([2]));
    assert_eq!(result["dtype"], json!("float32"));
    let data = BASE64
        .decode(result["data"].as_str().unwrap())
        .unwrap();
    let output = blazerpc::tensor::TensorData::new(DType::Float32, vec![2], data).unwrap();
    assert_eq!(output.as_f32().unwrap(), vec![-1.5, 2.0]);

    server.shutdown().await.unwrap();
}
