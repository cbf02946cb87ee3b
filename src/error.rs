//! Error types for BlazeRPC.
//!
//! This module provides a unified error type [`BlazeError`] for all BlazeRPC
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Validation**: malformed annotations, bad identifiers, missing fields
//! - **Serialization**: wire-form tensor inconsistencies
//! - **ModelNotFound**: RPC path refers to an unknown model
//! - **Inference**: a user callable failed
//! - **Configuration**: bad startup input or a submission racing shutdown
//!
//! # gRPC status mapping
//!
//! Every error converts to a [`tonic::Status`]:
//!
//! ```rust
//! use blazerpc::error::BlazeError;
//! use tonic::Code;
//!
//! let err = BlazeError::model_not_found("sentiment", "1");
//! assert_eq!(tonic::Status::from(err).code(), Code::NotFound);
//! ```

use std::io;
use thiserror::Error;
use tonic::{Code, Status};

/// Main error type for BlazeRPC operations.
#[derive(Error, Debug)]
pub enum BlazeError {
    // Input validation errors
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    // Wire-form tensor errors
    #[error("serialization error: {message}")]
    Serialization {
        message: String,
        dtype: Option<String>,
    },

    // Registry lookup errors
    #[error("model '{name}' version '{version}' not found")]
    ModelNotFound { name: String, version: String },

    // User callable errors
    #[error("inference failed for model '{model}': {message}")]
    Inference { model: String, message: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Transport errors
    #[error("transport error: {0}")]
    Transport(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BlazeError {
    /// Build a validation error for a named field or parameter.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BlazeError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a serialization error with an optional offending dtype tag.
    pub fn serialization(message: impl Into<String>, dtype: Option<&str>) -> Self {
        BlazeError::Serialization {
            message: message.into(),
            dtype: dtype.map(str::to_owned),
        }
    }

    /// Build a lookup failure for a model name/version pair.
    pub fn model_not_found(name: impl Into<String>, version: impl Into<String>) -> Self {
        BlazeError::ModelNotFound {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Build an inference failure attributed to a model.
    pub fn inference(model: impl Into<String>, message: impl Into<String>) -> Self {
        BlazeError::Inference {
            model: model.into(),
            message: message.into(),
        }
    }

    /// The submission-after-shutdown error delivered to late batcher clients.
    pub fn shutting_down() -> Self {
        BlazeError::Config("server shutting down".to_string())
    }

    /// gRPC status code for this error.
    pub fn code(&self) -> Code {
        match self {
            BlazeError::Validation { .. } | BlazeError::Serialization { .. } => {
                Code::InvalidArgument
            }
            BlazeError::ModelNotFound { .. } => Code::NotFound,
            BlazeError::Inference { .. } => Code::Internal,
            BlazeError::Config(_) | BlazeError::InvalidConfig { .. } => Code::Unavailable,
            _ => Code::Unknown,
        }
    }

    /// Check if error is retryable from the client's perspective.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BlazeError::Config(_) | BlazeError::Transport(_))
    }
}

impl From<BlazeError> for Status {
    fn from(err: BlazeError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

impl From<serde_json::Error> for BlazeError {
    fn from(e: serde_json::Error) -> Self {
        BlazeError::Serialization {
            message: e.to_string(),
            dtype: None,
        }
    }
}

/// Result type alias for BlazeRPC operations.
pub type Result<T> = std::result::Result<T, BlazeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            BlazeError::validation("x", "missing").code(),
            Code::InvalidArgument
        );
        assert_eq!(
            BlazeError::serialization("bad tag", Some("float128")).code(),
            Code::InvalidArgument
        );
        assert_eq!(BlazeError::model_not_found("m", "1").code(), Code::NotFound);
        assert_eq!(BlazeError::inference("m", "boom").code(), Code::Internal);
        assert_eq!(BlazeError::shutting_down().code(), Code::Unavailable);
        assert_eq!(
            BlazeError::Internal("oops".to_string()).code(),
            Code::Unknown
        );
    }

    #[test]
    fn test_retryable() {
        assert!(BlazeError::shutting_down().is_retryable());
        assert!(!BlazeError::inference("m", "boom").is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = BlazeError::model_not_found("sentiment", "2");
        assert!(err.to_string().contains("sentiment"));
        assert!(err.to_string().contains('2'));
    }
}
