//! Protobuf schema generation from a model registry.
//!
//! Walks the registry in registration order and emits a canonical proto3
//! document: one request/response message pair per model plus a single
//! `InferenceService`. Output is byte-identical across runs for the same
//! registry. The same walk also synthesizes a `FileDescriptorSet` for the
//! gRPC reflection service.

use crate::error::Result;
use crate::registry::{ModelDescriptor, ModelRegistry};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use std::path::{Path, PathBuf};

/// Proto package for all generated messages and services.
pub const PROTO_PACKAGE: &str = "blazerpc";

/// Fully-qualified name of the generated service.
pub const SERVICE_NAME: &str = "blazerpc.InferenceService";

/// File name used for schema export.
pub const PROTO_FILE_NAME: &str = "blaze_service.proto";

/// Generates `.proto` file content from a [`ModelRegistry`].
#[derive(Debug, Default)]
pub struct ProtoGenerator;

impl ProtoGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Return a complete `.proto` file as a string.
    pub fn generate(&self, registry: &ModelRegistry) -> String {
        let mut lines: Vec<String> = vec![
            "syntax = \"proto3\";".to_string(),
            String::new(),
            format!("package {};", PROTO_PACKAGE),
            String::new(),
        ];

        // Shared TensorProto message, emitted once when any model uses it.
        if registry.references_tensor() {
            lines.extend(Self::tensor_proto_message());
        }

        for model in registry.list() {
            lines.extend(Self::request_message(model));
            lines.extend(Self::response_message(model));
        }

        lines.extend(Self::service_block(registry));
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    fn tensor_proto_message() -> Vec<String> {
        vec![
            "message TensorProto {".to_string(),
            "  repeated int64 shape = 1;".to_string(),
            "  string dtype = 2;".to_string(),
            "  bytes data = 3;".to_string(),
            "}".to_string(),
            String::new(),
        ]
    }

    fn request_message(model: &ModelDescriptor) -> Vec<String> {
        let mut lines = vec![format!("message {}Request {{", model.pascal_name)];
        for (index, (param, descriptor)) in model.params.iter().enumerate() {
            let (proto_type, repeated) = descriptor.proto_field();
            let prefix = if repeated { "repeated " } else { "" };
            lines.push(format!(
                "  {}{} {} = {};",
                prefix,
                proto_type,
                param,
                index + 1
            ));
        }
        lines.push("}".to_string());
        lines.push(String::new());
        lines
    }

    fn response_message(model: &ModelDescriptor) -> Vec<String> {
        let (proto_type, repeated) = model.return_type.proto_field();
        let prefix = if repeated { "repeated " } else { "" };
        vec![
            format!("message {}Response {{", model.pascal_name),
            format!("  {}{} result = 1;", prefix, proto_type),
            "}".to_string(),
            String::new(),
        ]
    }

    fn service_block(registry: &ModelRegistry) -> Vec<String> {
        let mut lines = vec!["service InferenceService {".to_string()];
        for model in registry.list() {
            let stream = if model.streaming() { "stream " } else { "" };
            lines.push(format!(
                "  rpc {}({}Request) returns ({}{}Response);",
                model.method_name, model.pascal_name, stream, model.pascal_name
            ));
        }
        lines.push("}".to_string());
        lines
    }
}

/// Write the generated schema to `<output_dir>/blaze_service.proto`.
pub fn export_proto(registry: &ModelRegistry, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let content = ProtoGenerator::new().generate(registry);
    let path = output_dir.join(PROTO_FILE_NAME);
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Synthesize the descriptor set the reflection service advertises.
///
/// Mirrors the textual generator message for message, so reflection clients
/// see exactly the schema `generate` prints.
pub fn file_descriptor_set(registry: &ModelRegistry) -> FileDescriptorSet {
    let mut file = FileDescriptorProto {
        name: Some(PROTO_FILE_NAME.to_string()),
        package: Some(PROTO_PACKAGE.to_string()),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    };

    if registry.references_tensor() {
        file.message_type.push(tensor_proto_descriptor());
    }

    for model in registry.list() {
        file.message_type.push(request_descriptor(model));
        file.message_type.push(response_descriptor(model));
    }

    let service = ServiceDescriptorProto {
        name: Some("InferenceService".to_string()),
        method: registry
            .list()
            .map(|model| MethodDescriptorProto {
                name: Some(model.method_name.clone()),
                input_type: Some(format!(".{}.{}Request", PROTO_PACKAGE, model.pascal_name)),
                output_type: Some(format!(".{}.{}Response", PROTO_PACKAGE, model.pascal_name)),
                server_streaming: Some(model.streaming()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    file.service.push(service);

    FileDescriptorSet { file: vec![file] }
}

fn tensor_proto_descriptor() -> DescriptorProto {
    DescriptorProto {
        name: Some("TensorProto".to_string()),
        field: vec![
            scalar_field("shape", 1, Type::Int64, true),
            scalar_field("dtype", 2, Type::String, false),
            scalar_field("data", 3, Type::Bytes, false),
        ],
        ..Default::default()
    }
}

fn request_descriptor(model: &ModelDescriptor) -> DescriptorProto {
    DescriptorProto {
        name: Some(format!("{}Request", model.pascal_name)),
        field: model
            .params
            .iter()
            .enumerate()
            .map(|(index, (param, descriptor))| {
                field_from_spec(param, index as i32 + 1, descriptor.proto_field())
            })
            .collect(),
        ..Default::default()
    }
}

fn response_descriptor(model: &ModelDescriptor) -> DescriptorProto {
    DescriptorProto {
        name: Some(format!("{}Response", model.pascal_name)),
        field: vec![field_from_spec(
            "result",
            1,
            model.return_type.proto_field(),
        )],
        ..Default::default()
    }
}

fn field_from_spec(name: &str, number: i32, spec: (&'static str, bool)) -> FieldDescriptorProto {
    let (proto_type, repeated) = spec;
    match proto_type {
        "TensorProto" => message_field(name, number, ".blazerpc.TensorProto"),
        "string" => scalar_field(name, number, Type::String, repeated),
        "int64" => scalar_field(name, number, Type::Int64, repeated),
        "float" => scalar_field(name, number, Type::Float, repeated),
        "bool" => scalar_field(name, number, Type::Bool, repeated),
        _ => scalar_field(name, number, Type::Bytes, repeated),
    }
}

fn scalar_field(name: &str, number: i32, field_type: Type, repeated: bool) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(if repeated {
            Label::Repeated as i32
        } else {
            Label::Optional as i32
        }),
        r#type: Some(field_type as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::Message as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelBuilder;
    use crate::types::{DType, Dim, ScalarKind, TypeDescriptor, Value};

    fn sample_registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                ModelBuilder::new("echo")
                    .param("s", TypeDescriptor::string())
                    .returns(TypeDescriptor::string())
                    .blocking_fn(|kwargs| {
                        Ok(kwargs.get("s").cloned().unwrap_or_else(|| Value::from("")))
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ModelBuilder::new("text_generator")
                    .param("prompt", TypeDescriptor::string())
                    .param("max_tokens", TypeDescriptor::int64())
                    .returns(TypeDescriptor::string())
                    .blocking_stream_fn(|_| std::iter::once(Ok(Value::from("token"))))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_schema_without_tensors() {
        let schema = ProtoGenerator::new().generate(&sample_registry());
        let expected = "\
syntax = \"proto3\";

package blazerpc;

message EchoRequest {
  string s = 1;
}

message EchoResponse {
  string result = 1;
}

message TextGeneratorRequest {
  string prompt = 1;
  int64 max_tokens = 2;
}

message TextGeneratorResponse {
  string result = 1;
}

service InferenceService {
  rpc PredictEcho(EchoRequest) returns (EchoResponse);
  rpc PredictTextGenerator(TextGeneratorRequest) returns (stream TextGeneratorResponse);
}
";
        assert_eq!(schema, expected);
    }

    #[test]
    fn test_schema_with_tensor_emits_tensor_proto_once() {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                ModelBuilder::new("classifier")
                    .param(
                        "image",
                        TypeDescriptor::tensor(
                            DType::Float32,
                            vec![Dim::symbolic("batch"), Dim::Fixed(224)],
                        ),
                    )
                    .returns(TypeDescriptor::list(ScalarKind::Float32))
                    .blocking_fn(|_| Ok(Value::List(vec![])))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ModelBuilder::new("embedder")
                    .param("text", TypeDescriptor::string())
                    .returns_tensor()
                    .blocking_fn(|_| {
                        Ok(Value::Tensor(crate::tensor::TensorData::from_f32(
                            &[0.0],
                            vec![1],
                        )))
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let schema = ProtoGenerator::new().generate(&registry);
        assert_eq!(schema.matches("message TensorProto {").count(), 1);
        assert!(schema.contains("  TensorProto image = 1;"));
        assert!(schema.contains("  repeated float result = 1;"));
        assert!(schema.contains("  TensorProto result = 1;"));
    }

    #[test]
    fn test_schema_deterministic() {
        let registry = sample_registry();
        let generator = ProtoGenerator::new();
        assert_eq!(generator.generate(&registry), generator.generate(&registry));
    }

    #[test]
    fn test_descriptor_set_mirrors_schema() {
        let registry = sample_registry();
        let set = file_descriptor_set(&registry);
        assert_eq!(set.file.len(), 1);

        let file = &set.file[0];
        assert_eq!(file.package.as_deref(), Some(PROTO_PACKAGE));
        // Two models, two messages each, no TensorProto.
        assert_eq!(file.message_type.len(), 4);
        assert_eq!(file.service.len(), 1);

        let methods = &file.service[0].method;
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name.as_deref(), Some("PredictEcho"));
        assert_eq!(methods[0].server_streaming, Some(false));
        assert_eq!(methods[1].server_streaming, Some(true));
    }

    #[test]
    fn test_export_proto_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_proto(&sample_registry(), dir.path()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("syntax = \"proto3\";"));
        assert_eq!(path.file_name().unwrap(), PROTO_FILE_NAME);
    }
}
