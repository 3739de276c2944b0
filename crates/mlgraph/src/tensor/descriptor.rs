//! Pairing of element type and shape that types every operand.

use serde::{Deserialize, Serialize};

use crate::tensor::{DType, Dimension, Shape};

/// Declared type of an operand: element dtype plus (possibly dynamic) shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorDescriptor {
    pub fn new(dtype: DType, dims: Vec<Dimension>) -> Self {
        TensorDescriptor {
            dtype,
            shape: Shape::new(dims),
        }
    }

    /// Descriptor with a fully fixed shape.
    pub fn fixed(dtype: DType, dims: &[usize]) -> Self {
        TensorDescriptor {
            dtype,
            shape: Shape::from_static(dims),
        }
    }

    /// Buffer length in bytes, when the shape is statically known.
    pub fn byte_len(&self) -> Option<usize> {
        self.shape
            .element_count()
            .and_then(|count| count.checked_mul(self.dtype.size_in_bytes()))
    }
}

impl std::fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.dtype, self.shape)
    }
}
