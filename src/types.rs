//! The BlazeRPC type system.
//!
//! User code describes each model parameter and return with a
//! [`TypeDescriptor`], a small algebraic type language over scalars,
//! homogeneous lists, and tensors with symbolic dimensions. Descriptors
//! answer two questions: which protobuf field spec the schema generator
//! emits, and which decode/encode routine the dispatcher selects.

use crate::tensor::TensorData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Scalar leaf types supported in request/response messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    String,
    Int64,
    Float32,
    Bool,
    Bytes,
}

impl ScalarKind {
    /// Protobuf field type for this scalar.
    pub fn proto_type(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int64 => "int64",
            ScalarKind::Float32 => "float",
            ScalarKind::Bool => "bool",
            ScalarKind::Bytes => "bytes",
        }
    }
}

/// Element type for tensors.
///
/// The enumeration is closed: a dtype tag outside this set fails decoding
/// with a serialization error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float16,
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::Uint8 => 1,
            DType::Float16 | DType::Int16 | DType::Uint16 => 2,
            DType::Float32 | DType::Int32 | DType::Uint32 => 4,
            DType::Float64 | DType::Int64 | DType::Uint64 => 8,
        }
    }

    /// The wire tag for this dtype (`"float32"`, `"int8"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Uint8 => "uint8",
            DType::Uint16 => "uint16",
            DType::Uint32 => "uint32",
            DType::Uint64 => "uint64",
            DType::Bool => "bool",
        }
    }

    /// Parse a wire tag back into a dtype. Returns `None` for tags outside
    /// the closed enumeration.
    pub fn parse(tag: &str) -> Option<DType> {
        match tag {
            "float16" => Some(DType::Float16),
            "float32" => Some(DType::Float32),
            "float64" => Some(DType::Float64),
            "int8" => Some(DType::Int8),
            "int16" => Some(DType::Int16),
            "int32" => Some(DType::Int32),
            "int64" => Some(DType::Int64),
            "uint8" => Some(DType::Uint8),
            "uint16" => Some(DType::Uint16),
            "uint32" => Some(DType::Uint32),
            "uint64" => Some(DType::Uint64),
            "bool" => Some(DType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dimension of a declared tensor shape.
///
/// Symbolic dimensions ("batch", "seq") are carried as metadata only and
/// never validated against payload shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    Fixed(u64),
    Symbolic(String),
}

impl Dim {
    pub fn symbolic(name: impl Into<String>) -> Self {
        Dim::Symbolic(name.into())
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Symbolic(name) => f.write_str(name),
        }
    }
}

/// Normalized description of a parameter or return type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDescriptor {
    /// A single scalar value.
    Scalar { scalar: ScalarKind },
    /// A variable-length homogeneous list of scalars.
    List { element: ScalarKind },
    /// An n-dimensional array with a declared dtype and shape.
    Tensor { dtype: DType, shape: Vec<Dim> },
}

impl TypeDescriptor {
    pub fn string() -> Self {
        TypeDescriptor::Scalar {
            scalar: ScalarKind::String,
        }
    }

    pub fn int64() -> Self {
        TypeDescriptor::Scalar {
            scalar: ScalarKind::Int64,
        }
    }

    pub fn float32() -> Self {
        TypeDescriptor::Scalar {
            scalar: ScalarKind::Float32,
        }
    }

    pub fn bool() -> Self {
        TypeDescriptor::Scalar {
            scalar: ScalarKind::Bool,
        }
    }

    pub fn bytes() -> Self {
        TypeDescriptor::Scalar {
            scalar: ScalarKind::Bytes,
        }
    }

    pub fn list(element: ScalarKind) -> Self {
        TypeDescriptor::List { element }
    }

    pub fn tensor(dtype: DType, shape: Vec<Dim>) -> Self {
        TypeDescriptor::Tensor { dtype, shape }
    }

    /// Protobuf field spec for this descriptor: `(type name, repeated)`.
    ///
    /// Tensors map to the shared `TensorProto` message.
    pub fn proto_field(&self) -> (&'static str, bool) {
        match self {
            TypeDescriptor::Scalar { scalar } => (scalar.proto_type(), false),
            TypeDescriptor::List { element } => (element.proto_type(), true),
            TypeDescriptor::Tensor { .. } => ("TensorProto", false),
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, TypeDescriptor::Tensor { .. })
    }
}

/// A runtime value flowing between the wire and a user callable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f32),
    Bool(bool),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tensor(TensorData),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorData> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Short name of the variant, used in mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "int64",
            Value::Float(_) => "float32",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tensor(_) => "tensor",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<TensorData> for Value {
    fn from(t: TensorData) -> Self {
        Value::Tensor(t)
    }
}

/// Decoded keyword arguments for one invocation.
pub type Kwargs = HashMap<String, Value>;

/// Vectorized arguments for a batched invocation: one parallel vector per
/// named parameter, positionally aligned across the batch.
pub type BatchArgs = HashMap<String, Vec<Value>>;
