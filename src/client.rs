//! Client for BlazeRPC servers.
//!
//! A thin wrapper over a tonic channel using the same pass-through codec as
//! the server: request arguments go out as a JSON object, the result comes
//! back from the response's `result` field. Useful for smoke tests, CLI
//! tooling, and integration tests; generated-stub clients in any language
//! work against the same wire contract.

use crate::error::{BlazeError, Result};
use crate::registry::pascal_case;
use crate::wire::{self, RawCodec};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

/// Client for the generated `blazerpc.InferenceService`.
#[derive(Debug, Clone)]
pub struct BlazeClient {
    grpc: Grpc<Channel>,
}

impl BlazeClient {
    /// Connect to a server, e.g. `http://127.0.0.1:50051`.
    pub async fn connect(dst: impl Into<String>) -> Result<Self> {
        let endpoint = Endpoint::from_shared(dst.into())
            .map_err(|e| BlazeError::Transport(e.to_string()))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| BlazeError::Transport(e.to_string()))?;
        Ok(Self {
            grpc: Grpc::new(channel),
        })
    }

    /// Call a non-streaming model. `args` must be a JSON object keyed by
    /// parameter name; returns the response's result field.
    pub async fn predict(
        &mut self,
        model: &str,
        args: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, Status> {
        self.grpc
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {}", e)))?;

        let body = Bytes::from(
            serde_json::to_vec(&args).map_err(|e| Status::from(BlazeError::from(e)))?,
        );
        let response = self
            .grpc
            .unary(Request::new(body), method_path(model)?, RawCodec::default())
            .await?;

        wire::decode_response(&response.into_inner()).map_err(Status::from)
    }

    /// Call a streaming model, yielding each response's result field.
    pub async fn predict_stream(
        &mut self,
        model: &str,
        args: serde_json::Value,
    ) -> std::result::Result<
        impl Stream<Item = std::result::Result<serde_json::Value, Status>>,
        Status,
    > {
        self.grpc
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {}", e)))?;

        let body = Bytes::from(
            serde_json::to_vec(&args).map_err(|e| Status::from(BlazeError::from(e)))?,
        );
        let response = self
            .grpc
            .server_streaming(Request::new(body), method_path(model)?, RawCodec::default())
            .await?;

        Ok(response.into_inner().map(|frame| {
            frame.and_then(|bytes| wire::decode_response(&bytes).map_err(Status::from))
        }))
    }
}

fn method_path(model: &str) -> std::result::Result<PathAndQuery, Status> {
    PathAndQuery::try_from(format!(
        "/blazerpc.InferenceService/Predict{}",
        pascal_case(model)
    ))
    .map_err(|e| Status::invalid_argument(format!("invalid model name '{}': {}", model, e)))
}
