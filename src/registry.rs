//! Model registry for tracking registered inference endpoints.
//!
//! Models are registered through [`ModelBuilder`] before the server starts.
//! Registration is a startup-only operation: [`ModelRegistry`] hands out
//! `&mut`-only mutation and is frozen behind an `Arc` once `serve()` runs.

use crate::error::{BlazeError, Result};
use crate::types::{BatchArgs, Kwargs, TypeDescriptor, Value};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Async unary callable: one keyword-argument map in, one value out.
pub type UnaryFn = Arc<dyn Fn(Kwargs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Blocking unary callable, run on the worker pool.
pub type BlockingUnaryFn = Arc<dyn Fn(Kwargs) -> Result<Value> + Send + Sync>;

/// Async batched callable: parallel per-parameter vectors in, one result
/// per batch position out. A position may carry a per-item error.
pub type BatchFn =
    Arc<dyn Fn(BatchArgs) -> BoxFuture<'static, Result<Vec<Result<Value>>>> + Send + Sync>;

/// Blocking batched callable, run on the worker pool.
pub type BlockingBatchFn = Arc<dyn Fn(BatchArgs) -> Result<Vec<Result<Value>>> + Send + Sync>;

/// Async streaming callable: produces a lazy sequence of values.
pub type StreamFn = Arc<dyn Fn(Kwargs) -> BoxStream<'static, Result<Value>> + Send + Sync>;

/// Blocking generator: an iterator pumped from the worker pool.
pub type BlockingStreamFn =
    Arc<dyn Fn(Kwargs) -> Box<dyn Iterator<Item = Result<Value>> + Send> + Send + Sync>;

/// The user callable behind a model, in one of six shapes.
#[derive(Clone)]
pub enum Handler {
    Unary(UnaryFn),
    BlockingUnary(BlockingUnaryFn),
    Batch(BatchFn),
    BlockingBatch(BlockingBatchFn),
    Streaming(StreamFn),
    BlockingStreaming(BlockingStreamFn),
}

impl Handler {
    /// Streaming handlers produce lazy sequences; everything else a single
    /// value per call.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Handler::Streaming(_) | Handler::BlockingStreaming(_))
    }

    /// Batch handlers take the vectorized arity contract.
    pub fn is_batch(&self) -> bool {
        matches!(self, Handler::Batch(_) | Handler::BlockingBatch(_))
    }

    /// Blocking handlers must never run on the reactor.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Handler::BlockingUnary(_) | Handler::BlockingBatch(_) | Handler::BlockingStreaming(_)
        )
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Handler::Unary(_) => "Unary",
            Handler::BlockingUnary(_) => "BlockingUnary",
            Handler::Batch(_) => "Batch",
            Handler::BlockingBatch(_) => "BlockingBatch",
            Handler::Streaming(_) => "Streaming",
            Handler::BlockingStreaming(_) => "BlockingStreaming",
        };
        f.write_str(name)
    }
}

/// Declared return of a model.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnType {
    /// A fully described value type.
    Value(TypeDescriptor),
    /// A tensor whose dtype and shape are determined at runtime.
    TensorOutput,
}

impl ReturnType {
    /// Protobuf field spec for the response `result` field.
    pub fn proto_field(&self) -> (&'static str, bool) {
        match self {
            ReturnType::Value(descriptor) => descriptor.proto_field(),
            ReturnType::TensorOutput => ("TensorProto", false),
        }
    }

    pub fn is_tensor(&self) -> bool {
        match self {
            ReturnType::Value(descriptor) => descriptor.is_tensor(),
            ReturnType::TensorOutput => true,
        }
    }
}

/// Immutable description of one registered model.
#[derive(Clone)]
pub struct ModelDescriptor {
    /// Registered name, matching `[A-Za-z][A-Za-z0-9_]*`.
    pub name: String,
    /// PascalCase form used for message names.
    pub pascal_name: String,
    /// RPC method name: `"Predict" + PascalCase(name)`.
    pub method_name: String,
    /// Free-form version string, opaque to routing.
    pub version: String,
    /// Ordered parameter descriptors.
    pub params: Vec<(String, TypeDescriptor)>,
    /// Declared return. For streaming models, the type of each yielded
    /// element.
    pub return_type: ReturnType,
    /// The user callable.
    pub handler: Handler,
}

impl ModelDescriptor {
    pub fn streaming(&self) -> bool {
        self.handler.is_streaming()
    }

    /// The descriptor of a named parameter, if declared.
    pub fn param(&self, name: &str) -> Option<&TypeDescriptor> {
        self.params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn references_tensor(&self) -> bool {
        self.params.iter().any(|(_, d)| d.is_tensor()) || self.return_type.is_tensor()
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("method_name", &self.method_name)
            .field("version", &self.version)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("handler", &self.handler)
            .finish()
    }
}

/// Convert a model name to its PascalCase proto identifier.
pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn validate_identifier(value: &str, field: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(BlazeError::validation(
            field,
            format!(
                "'{}' is not a valid identifier (expected [A-Za-z][A-Za-z0-9_]*)",
                value
            ),
        ));
    }
    Ok(())
}

/// Fluent builder for a [`ModelDescriptor`].
pub struct ModelBuilder {
    name: String,
    version: String,
    params: Vec<(String, TypeDescriptor)>,
    return_type: Option<ReturnType>,
    handler: Option<Handler>,
}

impl ModelBuilder {
    /// Start describing a model with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1".to_string(),
            params: Vec::new(),
            return_type: None,
            handler: None,
        }
    }

    /// Sets the version string.
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Declares the next parameter.
    pub fn param(mut self, name: &str, descriptor: TypeDescriptor) -> Self {
        self.params.push((name.to_string(), descriptor));
        self
    }

    /// Declares the return type.
    pub fn returns(mut self, descriptor: TypeDescriptor) -> Self {
        self.return_type = Some(ReturnType::Value(descriptor));
        self
    }

    /// Declares a runtime-shaped tensor return.
    pub fn returns_tensor(mut self) -> Self {
        self.return_type = Some(ReturnType::TensorOutput);
        self
    }

    /// Attach an async unary callable.
    pub fn handler_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Kwargs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        self.handler = Some(Handler::Unary(Arc::new(move |kwargs| {
            Box::pin(f(kwargs))
        })));
        self
    }

    /// Attach a blocking unary callable. It will run on the worker pool.
    pub fn blocking_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Kwargs) -> Result<Value> + Send + Sync + 'static,
    {
        self.handler = Some(Handler::BlockingUnary(Arc::new(f)));
        self
    }

    /// Attach an async batched callable (vectorized arity contract).
    pub fn batch_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(BatchArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<Result<Value>>>> + Send + 'static,
    {
        self.handler = Some(Handler::Batch(Arc::new(move |batch| Box::pin(f(batch)))));
        self
    }

    /// Attach a blocking batched callable.
    pub fn blocking_batch_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(BatchArgs) -> Result<Vec<Result<Value>>> + Send + Sync + 'static,
    {
        self.handler = Some(Handler::BlockingBatch(Arc::new(f)));
        self
    }

    /// Attach an async streaming callable.
    pub fn stream_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Kwargs) -> BoxStream<'static, Result<Value>> + Send + Sync + 'static,
    {
        self.handler = Some(Handler::Streaming(Arc::new(f)));
        self
    }

    /// Attach a blocking generator. Its iterator is driven from the worker
    /// pool with each value handed back to the reactor.
    pub fn blocking_stream_fn<F, I>(mut self, f: F) -> Self
    where
        F: Fn(Kwargs) -> I + Send + Sync + 'static,
        I: Iterator<Item = Result<Value>> + Send + 'static,
    {
        self.handler = Some(Handler::BlockingStreaming(Arc::new(move |kwargs| {
            Box::new(f(kwargs))
        })));
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<ModelDescriptor> {
        validate_identifier(&self.name, &self.name)?;

        if self.params.is_empty() {
            return Err(BlazeError::validation(
                &self.name,
                "model must declare at least one parameter",
            ));
        }

        let mut seen = HashMap::new();
        for (param, _) in &self.params {
            validate_identifier(param, param)?;
            if seen.insert(param.clone(), ()).is_some() {
                return Err(BlazeError::validation(
                    param,
                    format!("duplicate parameter '{}'", param),
                ));
            }
        }

        let return_type = self.return_type.ok_or_else(|| {
            BlazeError::validation(&self.name, "model must declare a return type")
        })?;

        let handler = self
            .handler
            .ok_or_else(|| BlazeError::validation(&self.name, "model must attach a callable"))?;

        let pascal_name = pascal_case(&self.name);
        let method_name = format!("Predict{}", pascal_name);

        Ok(ModelDescriptor {
            name: self.name,
            pascal_name,
            method_name,
            version: self.version,
            params: self.params,
            return_type,
            handler,
        })
    }
}

/// Ordered collection of registered models, append-only until the server
/// starts.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Arc<ModelDescriptor>>,
    by_name: HashMap<String, usize>,
    by_method: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model. Fails on duplicate names or method names.
    pub fn register(&mut self, model: ModelDescriptor) -> Result<()> {
        if self.by_name.contains_key(&model.name) {
            return Err(BlazeError::validation(
                &model.name,
                format!("model '{}' is already registered", model.name),
            ));
        }
        if self.by_method.contains_key(&model.method_name) {
            return Err(BlazeError::validation(
                &model.name,
                format!(
                    "method name '{}' collides with an existing model",
                    model.method_name
                ),
            ));
        }

        let index = self.models.len();
        self.by_name.insert(model.name.clone(), index);
        self.by_method.insert(model.method_name.clone(), index);
        self.models.push(Arc::new(model));
        Ok(())
    }

    /// Look up a model by name.
    pub fn get(&self, name: &str) -> Result<&Arc<ModelDescriptor>> {
        self.by_name
            .get(name)
            .map(|&i| &self.models[i])
            .ok_or_else(|| BlazeError::model_not_found(name, "1"))
    }

    /// Look up a model by its RPC method name (`PredictFoo`).
    pub fn lookup_method(&self, method_name: &str) -> Option<&Arc<ModelDescriptor>> {
        self.by_method.get(method_name).map(|&i| &self.models[i])
    }

    /// All models in registration order.
    pub fn list(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Whether any registered model uses a tensor parameter or return.
    pub fn references_tensor(&self) -> bool {
        self.models.iter().any(|m| m.references_tensor())
    }
}
