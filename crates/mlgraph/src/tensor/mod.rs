//! Tensor data model shared by the graph engine and kernel backends.
//!
//! Everything here is pure value types: element dtypes, shapes whose axes
//! may stay unresolved until compute time, descriptors pairing the two, and
//! immutable literal payloads. Behavior lives in [`crate::graph`] and in the
//! backend implementing [`crate::backend::KernelBackend`].

mod descriptor;
mod dtype;
mod literal;
mod shape;

pub use descriptor::TensorDescriptor;
pub use dtype::DType;
pub use literal::{
    bytes_to_f32, bytes_to_i32, f32_to_bytes, i32_to_bytes, TensorLiteral,
};
pub use shape::{Dimension, Shape};
