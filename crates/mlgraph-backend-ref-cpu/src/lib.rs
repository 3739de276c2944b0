//! Reference CPU implementation of the mlgraph kernel backend.
//!
//! Correctness-first dense kernels over host memory, plus exact allocation
//! accounting: every live tensor is tied to the backend's memory counters
//! through a drop guard, so `memory()` reflects reality and the engine's
//! zero-leak contract is observable.

mod cpu;

pub use cpu::{CpuBackend, CpuTensor, TensorData};
