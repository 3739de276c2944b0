//! A typed compute-graph engine for tensor operations.
//!
//! The engine splits into three layers:
//!
//! - [`tensor`]: pure value types — dtypes, shapes whose axes may stay
//!   unresolved until compute time, descriptors, and immutable literals.
//! - [`graph`]: the mutable [`GraphBuilder`] session, the immutable
//!   compiled [`Graph`], and the compute/dispose lifecycle.
//! - [`backend`]: the [`KernelBackend`] capability a numeric backend
//!   implements; the engine owns validation and scheduling, the backend
//!   owns the kernels.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # fn demo<B: mlgraph::KernelBackend + 'static>(backend: Arc<B>) -> anyhow::Result<()> {
//! use mlgraph::{
//!     ComputeInputs, ComputeOutputs, DType, GraphBuilder, InputBinding, OutputBinding,
//!     TensorDescriptor,
//! };
//!
//! let mut builder = GraphBuilder::new(backend);
//! let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2, 2]))?;
//! let b = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2, 2]), &[1.0; 4])?;
//! let c = builder.matmul(a, b)?;
//! let graph = builder.build(&[("c", c)])?;
//!
//! let mut inputs = ComputeInputs::new();
//! inputs.insert("a", InputBinding::f32(&[1.0; 4]));
//! let mut result = [0.0f32; 4];
//! let mut outputs = ComputeOutputs::new();
//! outputs.insert("c", OutputBinding::f32(&mut result));
//! graph.compute(&inputs, &mut outputs)?;
//! graph.dispose();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod graph;
pub mod tensor;

pub use backend::{BackendError, BackendResult, KernelBackend, MemoryReport};
pub use graph::{
    ComputeError, ComputeInputs, ComputeOutputs, Graph, GraphBuilder, GraphError, GruOptions,
    InputBinding, Operand, OutputBinding,
};
pub use tensor::{DType, Dimension, Shape, TensorDescriptor, TensorLiteral};
