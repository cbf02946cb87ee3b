//! Wire encoding for request and response payloads.
//!
//! Message bodies travel over standard gRPC framing but are encoded by the
//! framework itself rather than a compiled protobuf type: a pass-through
//! [`RawCodec`] hands the handler the raw frame, and the payload inside is
//! JSON. Scalars map to their JSON counterparts, `bytes` fields to base64
//! strings, and tensor fields to `{"shape": [...], "dtype": "...",
//! "data": "<base64>"}` objects. Responses wrap the result as
//! `{"result": <value>}`.

use crate::error::{BlazeError, Result};
use crate::registry::ModelDescriptor;
use crate::tensor::TensorData;
use crate::types::{Kwargs, ScalarKind, TypeDescriptor, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// Response payload key.
const RESULT_KEY: &str = "result";

/// Pass-through codec that skips protobuf serialization.
///
/// Handlers encode and decode messages themselves, so the codec just
/// forwards raw frame bytes in both directions.
#[derive(Debug, Clone, Default)]
pub struct RawCodec;

#[derive(Debug)]
pub struct RawEncoder;

#[derive(Debug)]
pub struct RawDecoder;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

impl Encoder for RawEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> std::result::Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(
        &mut self,
        src: &mut DecodeBuf<'_>,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        let remaining = src.remaining();
        Ok(Some(src.copy_to_bytes(remaining)))
    }
}

/// Decode a request payload into keyword arguments per the model's
/// parameter descriptors.
pub fn decode_request(body: &[u8], model: &ModelDescriptor) -> Result<Kwargs> {
    let payload: serde_json::Value = serde_json::from_slice(body)?;
    let fields = payload.as_object().ok_or_else(|| {
        BlazeError::serialization("request payload is not a JSON object", None)
    })?;

    let mut kwargs = Kwargs::with_capacity(model.params.len());
    for (param, descriptor) in &model.params {
        let field = fields
            .get(param)
            .ok_or_else(|| BlazeError::validation(param, "missing required field"))?;
        kwargs.insert(param.clone(), value_from_json(field, descriptor, param)?);
    }
    Ok(kwargs)
}

/// Encode one result value as a response payload.
pub fn encode_response(value: &Value) -> Result<Bytes> {
    let payload = serde_json::json!({ RESULT_KEY: value_to_json(value)? });
    Ok(Bytes::from(serde_json::to_vec(&payload)?))
}

/// Extract the result field from a response payload. Client-side dual of
/// [`encode_response`].
pub fn decode_response(body: &[u8]) -> Result<serde_json::Value> {
    let mut payload: serde_json::Value = serde_json::from_slice(body)?;
    payload
        .as_object_mut()
        .and_then(|fields| fields.remove(RESULT_KEY))
        .ok_or_else(|| BlazeError::serialization("response payload has no result field", None))
}

/// Convert a JSON field into a [`Value`] per its descriptor.
pub fn value_from_json(
    field: &serde_json::Value,
    descriptor: &TypeDescriptor,
    name: &str,
) -> Result<Value> {
    match descriptor {
        TypeDescriptor::Scalar { scalar } => scalar_from_json(field, *scalar, name),
        TypeDescriptor::List { element } => {
            let items = field
                .as_array()
                .ok_or_else(|| type_mismatch(name, "array", field))?;
            let values = items
                .iter()
                .map(|item| scalar_from_json(item, *element, name))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(values))
        }
        TypeDescriptor::Tensor { .. } => tensor_from_json(field, name).map(Value::Tensor),
    }
}

fn scalar_from_json(field: &serde_json::Value, kind: ScalarKind, name: &str) -> Result<Value> {
    match kind {
        ScalarKind::String => field
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| type_mismatch(name, "string", field)),
        ScalarKind::Int64 => field
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| type_mismatch(name, "int64", field)),
        ScalarKind::Float32 => field
            .as_f64()
            .map(|f| Value::Float(f as f32))
            .ok_or_else(|| type_mismatch(name, "float", field)),
        ScalarKind::Bool => field
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| type_mismatch(name, "bool", field)),
        ScalarKind::Bytes => {
            let encoded = field
                .as_str()
                .ok_or_else(|| type_mismatch(name, "base64 string", field))?;
            let decoded = BASE64
                .decode(encoded)
                .map_err(|e| BlazeError::validation(name, format!("invalid base64: {}", e)))?;
            Ok(Value::Bytes(decoded))
        }
    }
}

/// Parse the wire tensor object, validating the dtype tag and the byte
/// length against the declared shape.
fn tensor_from_json(field: &serde_json::Value, name: &str) -> Result<TensorData> {
    let object = field
        .as_object()
        .ok_or_else(|| type_mismatch(name, "tensor object", field))?;

    let shape = object
        .get("shape")
        .and_then(|s| s.as_array())
        .ok_or_else(|| BlazeError::serialization("tensor is missing its shape", None))?
        .iter()
        .map(|d| {
            d.as_i64()
                .ok_or_else(|| BlazeError::serialization("tensor shape must be integers", None))
        })
        .collect::<Result<Vec<i64>>>()?;

    let tag = object
        .get("dtype")
        .and_then(|d| d.as_str())
        .ok_or_else(|| BlazeError::serialization("tensor is missing its dtype", None))?;
    let dtype = crate::types::DType::parse(tag).ok_or_else(|| {
        BlazeError::serialization(format!("unknown tensor dtype '{}'", tag), Some(tag))
    })?;

    let data = object
        .get("data")
        .and_then(|d| d.as_str())
        .ok_or_else(|| BlazeError::serialization("tensor is missing its data", None))?;
    let data = BASE64
        .decode(data)
        .map_err(|e| BlazeError::serialization(format!("invalid tensor data: {}", e), Some(tag)))?;

    TensorData::new(dtype, shape, data)
}

/// Convert a [`Value`] into its JSON wire form.
pub fn value_to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => {
            let number = serde_json::Number::from_f64(f64::from(*f)).ok_or_else(|| {
                BlazeError::serialization("non-finite float is not representable", None)
            })?;
            serde_json::Value::Number(number)
        }
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Bytes(data) => serde_json::Value::String(BASE64.encode(data)),
        Value::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Tensor(tensor) => serde_json::json!({
            "shape": tensor.shape,
            "dtype": tensor.dtype.as_str(),
            "data": BASE64.encode(&tensor.data),
        }),
    })
}

fn type_mismatch(field: &str, expected: &str, got: &serde_json::Value) -> BlazeError {
    let kind = match got {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    BlazeError::validation(field, format!("expected {}, got {}", expected, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelBuilder;
    use crate::types::{DType, Dim};

    fn model_with(params: Vec<(&str, TypeDescriptor)>) -> ModelDescriptor {
        let mut builder = ModelBuilder::new("m");
        for (name, descriptor) in params {
            builder = builder.param(name, descriptor);
        }
        builder
            .returns(TypeDescriptor::string())
            .blocking_fn(|_| Ok(Value::from("")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_decode_scalars() {
        let model = model_with(vec![
            ("s", TypeDescriptor::string()),
            ("n", TypeDescriptor::int64()),
            ("f", TypeDescriptor::float32()),
            ("b", TypeDescriptor::bool()),
        ]);
        let body = br#"{"s": "hi", "n": 42, "f": 1.5, "b": true}"#;
        let kwargs = decode_request(body, &model).unwrap();

        assert_eq!(kwargs["s"], Value::from("hi"));
        assert_eq!(kwargs["n"], Value::Int(42));
        assert_eq!(kwargs["f"], Value::Float(1.5));
        assert_eq!(kwargs["b"], Value::Bool(true));
    }

    #[test]
    fn test_decode_missing_field() {
        let model = model_with(vec![("s", TypeDescriptor::string())]);
        let err = decode_request(b"{}", &model).unwrap_err();
        match err {
            BlazeError::Validation { field, .. } => assert_eq!(field, "s"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_type_mismatch() {
        let model = model_with(vec![("n", TypeDescriptor::int64())]);
        let err = decode_request(br#"{"n": "not a number"}"#, &model).unwrap_err();
        assert!(matches!(err, BlazeError::Validation { .. }));
    }

    #[test]
    fn test_decode_list() {
        let model = model_with(vec![("xs", TypeDescriptor::list(ScalarKind::Int64))]);
        let kwargs = decode_request(br#"{"xs": [1, 2, 3]}"#, &model).unwrap();
        assert_eq!(
            kwargs["xs"],
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_decode_tensor() {
        let model = model_with(vec![(
            "t",
            TypeDescriptor::tensor(DType::Float32, vec![Dim::symbolic("n")]),
        )]);
        let tensor = TensorData::from_f32(&[1.0, 2.0], vec![2]);
        let body = serde_json::to_vec(&serde_json::json!({
            "t": {"shape": [2], "dtype": "float32", "data": BASE64.encode(&tensor.data)}
        }))
        .unwrap();

        let kwargs = decode_request(&body, &model).unwrap();
        assert_eq!(kwargs["t"], Value::Tensor(tensor));
    }

    #[test]
    fn test_decode_tensor_unknown_dtype() {
        let model = model_with(vec![(
            "t",
            TypeDescriptor::tensor(DType::Float32, vec![Dim::Fixed(1)]),
        )]);
        let body = br#"{"t": {"shape": [1], "dtype": "float128", "data": ""}}"#;
        let err = decode_request(body, &model).unwrap_err();
        match err {
            BlazeError::Serialization { dtype, .. } => {
                assert_eq!(dtype.as_deref(), Some("float128"));
            }
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_tensor_size_mismatch() {
        let model = model_with(vec![(
            "t",
            TypeDescriptor::tensor(DType::Float32, vec![Dim::Fixed(2)]),
        )]);
        let body = serde_json::to_vec(&serde_json::json!({
            "t": {"shape": [2], "dtype": "float32", "data": BASE64.encode([0u8; 4])}
        }))
        .unwrap();
        assert!(matches!(
            decode_request(&body, &model).unwrap_err(),
            BlazeError::Serialization { .. }
        ));
    }

    #[test]
    fn test_response_round_trip() {
        for value in [
            Value::from("hello"),
            Value::Int(-3),
            Value::Float(2.75),
            Value::Bool(false),
            Value::Bytes(vec![0, 1, 255]),
            Value::List(vec![Value::Int(1), Value::Int(2)]),
            Value::Tensor(TensorData::from_i64(&[9, 8], vec![2])),
        ] {
            let body = encode_response(&value).unwrap();
            let json = decode_response(&body).unwrap();
            // Re-decode through the matching descriptor where applicable.
            let expected = value_to_json(&value).unwrap();
            assert_eq!(json, expected);
        }
    }

    #[test]
    fn test_value_round_trip_through_descriptors() {
        let cases = vec![
            (TypeDescriptor::string(), Value::from("hi")),
            (TypeDescriptor::int64(), Value::Int(i64::MIN)),
            (TypeDescriptor::float32(), Value::Float(0.1)),
            (TypeDescriptor::bool(), Value::Bool(true)),
            (TypeDescriptor::bytes(), Value::Bytes(vec![1, 2, 3])),
            (
                TypeDescriptor::list(ScalarKind::Float32),
                Value::List(vec![Value::Float(1.5), Value::Float(-2.25)]),
            ),
            (
                TypeDescriptor::tensor(DType::Uint8, vec![Dim::Fixed(3)]),
                Value::Tensor(TensorData::from_u8(&[7, 8, 9], vec![3])),
            ),
        ];

        for (descriptor, value) in cases {
            let json = value_to_json(&value).unwrap();
            let back = value_from_json(&json, &descriptor, "field").unwrap();
            assert_eq!(back, value, "round trip failed for {:?}", descriptor);
        }
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(encode_response(&Value::Float(f32::NAN)).is_err());
    }
}
