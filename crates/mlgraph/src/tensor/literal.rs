//! Immutable host-side tensor payloads.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::tensor::{DType, TensorDescriptor};

/// Dense, row-major tensor value snapshot. The byte buffer is immutable and
/// shared; cloning a literal never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLiteral {
    pub descriptor: TensorDescriptor,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(descriptor: TensorDescriptor, bytes: Arc<[u8]>) -> Self {
        TensorLiteral { descriptor, bytes }
    }

    /// Snapshots `values` into a fresh literal. The caller owns the source
    /// slice; later mutation of it cannot reach this literal.
    pub fn from_f32(descriptor: TensorDescriptor, values: &[f32]) -> Self {
        TensorLiteral {
            descriptor,
            bytes: Arc::from(f32_to_bytes(values)),
        }
    }

    pub fn from_i32(descriptor: TensorDescriptor, values: &[i32]) -> Self {
        TensorLiteral {
            descriptor,
            bytes: Arc::from(i32_to_bytes(values)),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Decodes the payload as little-endian f32 values, when the dtype is
    /// [`DType::F32`].
    pub fn f32_data(&self) -> Option<Vec<f32>> {
        match self.descriptor.dtype {
            DType::F32 => Some(bytes_to_f32(&self.bytes)),
            _ => None,
        }
    }

    pub fn i32_data(&self) -> Option<Vec<i32>> {
        match self.descriptor.dtype {
            DType::I32 => Some(bytes_to_i32(&self.bytes)),
            _ => None,
        }
    }
}

impl Serialize for TensorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TensorLiteral", 2)?;
        state.serialize_field("descriptor", &self.descriptor)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for TensorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorLiteralHelper {
            descriptor: TensorDescriptor,
            bytes: Vec<u8>,
        }

        let helper = TensorLiteralHelper::deserialize(deserializer)?;
        Ok(TensorLiteral {
            descriptor: helper.descriptor,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}

pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub fn i32_to_bytes(values: &[i32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn bytes_to_i32(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
