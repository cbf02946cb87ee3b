//! Tensor wire codec.
//!
//! [`TensorData`] is the in-memory form of the `TensorProto` wire record:
//! a shape, a dtype tag, and a densely packed little-endian row-major byte
//! buffer. The typed constructors dump native slices to little-endian bytes
//! and the accessors reinterpret them back; no implicit dtype coercion or
//! endianness conversion happens anywhere in between, so round-trips are
//! bit-exact on every host.

use crate::error::{BlazeError, Result};
use crate::types::DType;

/// Wire representation of an n-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    /// Dimension sizes, row-major.
    pub shape: Vec<i64>,
    /// Element type tag.
    pub dtype: DType,
    /// Raw little-endian bytes, no padding between elements.
    pub data: Vec<u8>,
}

impl TensorData {
    /// Build a tensor record, validating that the buffer length matches
    /// `product(shape) * size_of(dtype)`.
    pub fn new(dtype: DType, shape: Vec<i64>, data: Vec<u8>) -> Result<Self> {
        let tensor = Self { shape, dtype, data };
        tensor.validate()?;
        Ok(tensor)
    }

    /// Check the size invariant of the record.
    pub fn validate(&self) -> Result<()> {
        if self.shape.iter().any(|&d| d < 0) {
            return Err(BlazeError::serialization(
                format!("negative dimension in tensor shape {:?}", self.shape),
                Some(self.dtype.as_str()),
            ));
        }
        let expected = self.element_count() * self.dtype.size_bytes();
        if self.data.len() != expected {
            return Err(BlazeError::serialization(
                format!(
                    "tensor data length {} does not match shape {:?} of dtype {} (expected {})",
                    self.data.len(),
                    self.shape,
                    self.dtype,
                    expected
                ),
                Some(self.dtype.as_str()),
            ));
        }
        Ok(())
    }

    /// Number of elements described by the shape.
    pub fn element_count(&self) -> usize {
        self.shape.iter().map(|&d| d.max(0) as usize).product()
    }

    /// Creates from an f32 slice.
    pub fn from_f32(data: &[f32], shape: Vec<i64>) -> Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            shape,
            dtype: DType::Float32,
            data: bytes,
        }
    }

    /// Creates from an f64 slice.
    pub fn from_f64(data: &[f64], shape: Vec<i64>) -> Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            shape,
            dtype: DType::Float64,
            data: bytes,
        }
    }

    /// Creates from an i32 slice.
    pub fn from_i32(data: &[i32], shape: Vec<i64>) -> Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            shape,
            dtype: DType::Int32,
            data: bytes,
        }
    }

    /// Creates from an i64 slice.
    pub fn from_i64(data: &[i64], shape: Vec<i64>) -> Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            shape,
            dtype: DType::Int64,
            data: bytes,
        }
    }

    /// Creates from a u8 slice.
    pub fn from_u8(data: &[u8], shape: Vec<i64>) -> Self {
        Self {
            shape,
            dtype: DType::Uint8,
            data: data.to_vec(),
        }
    }

    /// Gets as f32 values. `None` if the dtype is not float32.
    pub fn as_f32(&self) -> Option<Vec<f32>> {
        if self.dtype != DType::Float32 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }

    /// Gets as f64 values. `None` if the dtype is not float64.
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        if self.dtype != DType::Float64 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(8)
                .map(|chunk| {
                    f64::from_le_bytes([
                        chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6],
                        chunk[7],
                    ])
                })
                .collect(),
        )
    }

    /// Gets as i32 values. `None` if the dtype is not int32.
    pub fn as_i32(&self) -> Option<Vec<i32>> {
        if self.dtype != DType::Int32 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }

    /// Gets as i64 values. `None` if the dtype is not int64.
    pub fn as_i64(&self) -> Option<Vec<i64>> {
        if self.dtype != DType::Int64 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(8)
                .map(|chunk| {
                    i64::from_le_bytes([
                        chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6],
                        chunk[7],
                    ])
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_round_trip() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        let tensor = TensorData::from_f32(&data, vec![2, 2]);

        assert_eq!(tensor.dtype, DType::Float32);
        assert_eq!(tensor.shape, vec![2, 2]);
        assert_eq!(tensor.element_count(), 4);
        assert_eq!(tensor.data.len(), 16);
        tensor.validate().unwrap();

        assert_eq!(tensor.as_f32().unwrap(), data);
    }

    #[test]
    fn test_i64_round_trip() {
        let data = vec![-1i64, 0, i64::MAX];
        let tensor = TensorData::from_i64(&data, vec![3]);
        assert_eq!(tensor.as_i64().unwrap(), data);
    }

    #[test]
    fn test_little_endian_layout() {
        let tensor = TensorData::from_i32(&[1], vec![1]);
        assert_eq!(tensor.data, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let err = TensorData::new(DType::Float32, vec![2, 2], vec![0u8; 15]).unwrap_err();
        match err {
            BlazeError::Serialization { dtype, .. } => {
                assert_eq!(dtype.as_deref(), Some("float32"));
            }
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_dimension_rejected() {
        assert!(TensorData::new(DType::Int8, vec![-1, 4], vec![0u8; 4]).is_err());
    }

    #[test]
    fn test_wrong_dtype_accessor() {
        let tensor = TensorData::from_f32(&[1.0], vec![1]);
        assert!(tensor.as_i64().is_none());
        assert!(tensor.as_f64().is_none());
    }

    #[test]
    fn test_empty_tensor() {
        let tensor = TensorData::new(DType::Float32, vec![0, 3], vec![]).unwrap();
        assert_eq!(tensor.element_count(), 0);
        assert_eq!(tensor.as_f32().unwrap(), Vec::<f32>::new());
    }
}
