//! Dynamic gRPC servicer built from the model registry.
//!
//! Instead of compiling a protobuf service, the servicer routes each RPC by
//! its path (`/blazerpc.InferenceService/Predict<Model>`) to a handler built
//! from the registered descriptor: unary handlers decode, run through the
//! batcher or executor, and encode one response; streaming handlers drive
//! the model's lazy sequence and send each value as it is produced.

use crate::batcher::Batcher;
use crate::error::BlazeError;
use crate::executor::Executor;
use crate::middleware::MiddlewareStack;
use crate::registry::{ModelDescriptor, ModelRegistry};
use crate::wire::{self, RawCodec};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tonic::codegen::{http, Body, BoxFuture, StdError};
use tonic::server::{Grpc, NamedService, ServerStreamingService, UnaryService};
use tonic::{Code, Request, Response, Status};

struct ServicerInner {
    registry: Arc<ModelRegistry>,
    executor: Arc<Executor>,
    /// Batchers keyed by model name; only batch-contract, non-streaming
    /// models have one.
    batchers: HashMap<String, Arc<Batcher>>,
    middleware: MiddlewareStack,
}

/// The dynamic `blazerpc.InferenceService` implementation.
#[derive(Clone)]
pub struct InferenceServicer {
    inner: Arc<ServicerInner>,
}

impl InferenceServicer {
    pub fn new(
        registry: Arc<ModelRegistry>,
        executor: Arc<Executor>,
        batchers: HashMap<String, Arc<Batcher>>,
        middleware: MiddlewareStack,
    ) -> Self {
        Self {
            inner: Arc::new(ServicerInner {
                registry,
                executor,
                batchers,
                middleware,
            }),
        }
    }
}

impl NamedService for InferenceServicer {
    const NAME: &'static str = "blazerpc.InferenceService";
}

impl<B> tonic::codegen::Service<http::Request<B>> for InferenceServicer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        let method = req
            .uri()
            .path()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let model = inner.registry.lookup_method(&method).cloned();

        match model {
            Some(model) if model.streaming() => {
                let handler = StreamingHandler {
                    model,
                    inner,
                };
                Box::pin(async move {
                    let mut grpc = Grpc::new(RawCodec::default());
                    Ok(grpc.server_streaming(handler, req).await)
                })
            }
            Some(model) => {
                let handler = UnaryHandler { model, inner };
                Box::pin(async move {
                    let mut grpc = Grpc::new(RawCodec::default());
                    Ok(grpc.unary(handler, req).await)
                })
            }
            None => {
                let handler = UnknownMethod { method };
                Box::pin(async move {
                    let mut grpc = Grpc::new(RawCodec::default());
                    Ok(grpc.unary(handler, req).await)
                })
            }
        }
    }
}

/// Handler for RPC paths that name no registered model.
struct UnknownMethod {
    method: String,
}

impl UnaryService<Bytes> for UnknownMethod {
    type Response = Bytes;
    type Future = BoxFuture<Response<Bytes>, Status>;

    fn call(&mut self, _request: Request<Bytes>) -> Self::Future {
        let method = self.method.clone();
        Box::pin(async move { Err(BlazeError::model_not_found(method, "1").into()) })
    }
}

/// Unary path: decode, submit to the batcher or call the executor, encode.
struct UnaryHandler {
    model: Arc<ModelDescriptor>,
    inner: Arc<ServicerInner>,
}

impl UnaryService<Bytes> for UnaryHandler {
    type Response = Bytes;
    type Future = BoxFuture<Response<Bytes>, Status>;

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let model = self.model.clone();
        let inner = self.inner.clone();

        Box::pin(async move {
            let started = Instant::now();
            inner.middleware.on_request(&model.method_name);

            let result = handle_unary(&inner, &model, request.into_inner()).await;

            let code = match &result {
                Ok(_) => Code::Ok,
                Err(status) => status.code(),
            };
            inner
                .middleware
                .on_response(&model.method_name, code, started.elapsed());

            result.map(Response::new)
        })
    }
}

async fn handle_unary(
    inner: &ServicerInner,
    model: &Arc<ModelDescriptor>,
    body: Bytes,
) -> Result<Bytes, Status> {
    let kwargs = wire::decode_request(&body, model).map_err(Status::from)?;

    let value = match inner.batchers.get(&model.name) {
        Some(batcher) => batcher.submit(kwargs).await.map_err(Status::from)?,
        None => inner
            .executor
            .execute(model, kwargs)
            .await
            .map_err(Status::from)?,
    };

    wire::encode_response(&value).map_err(Status::from)
}

/// Streaming path: decode once, then pump the model's lazy sequence.
struct StreamingHandler {
    model: Arc<ModelDescriptor>,
    inner: Arc<ServicerInner>,
}

impl ServerStreamingService<Bytes> for StreamingHandler {
    type Response = Bytes;
    type ResponseStream = ProbedStream;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let model = self.model.clone();
        let inner = self.inner.clone();

        Box::pin(async move {
            let mut probe = ResponseProbe::start(inner.middleware.clone(), &model.method_name);

            let kwargs = match wire::decode_request(request.into_inner().as_ref(), &model) {
                Ok(kwargs) => kwargs,
                Err(e) => {
                    let status = Status::from(e);
                    probe.code = status.code();
                    probe.exhausted = true;
                    return Err(status);
                }
            };

            let stream = inner
                .executor
                .execute_stream(&model, kwargs)
                .map(|item| {
                    item.map_err(Status::from)
                        .and_then(|value| wire::encode_response(&value).map_err(Status::from))
                })
                .boxed();

            Ok(Response::new(ProbedStream {
                inner: stream,
                probe,
            }))
        })
    }
}

/// Fires the middleware response hook exactly once, when the RPC reaches a
/// terminal state. Client cancellation shows up as the stream being dropped
/// before exhaustion.
struct ResponseProbe {
    middleware: MiddlewareStack,
    method: String,
    started: Instant,
    code: Code,
    exhausted: bool,
}

impl ResponseProbe {
    fn start(middleware: MiddlewareStack, method: &str) -> Self {
        middleware.on_request(method);
        Self {
            middleware,
            method: method.to_string(),
            started: Instant::now(),
            code: Code::Ok,
            exhausted: false,
        }
    }
}

impl Drop for ResponseProbe {
    fn drop(&mut self) {
        let code = if !self.exhausted && self.code == Code::Ok {
            Code::Cancelled
        } else {
            self.code
        };
        self.middleware
            .on_response(&self.method, code, self.started.elapsed());
    }
}

/// Response stream wrapper that records the terminal status on its probe.
pub struct ProbedStream {
    inner: BoxStream<'static, Result<Bytes, Status>>,
    probe: ResponseProbe,
}

impl Stream for ProbedStream {
    type Item = Result<Bytes, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Err(status))) => {
                this.probe.code = status.code();
                this.probe.exhausted = true;
                Poll::Ready(Some(Err(status)))
            }
            Poll::Ready(None) => {
                this.probe.exhausted = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
