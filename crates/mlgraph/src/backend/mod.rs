//! Kernel backend interface.
//!
//! The engine validates graphs and schedules nodes; the numeric work is
//! delegated to a [`KernelBackend`]. A backend owns opaque tensor handles,
//! materializes host literals onto its device, evaluates one operation at a
//! time over fully resolved descriptors, and reads handles back as
//! literals. Each call is treated as a pure function of its inputs; the
//! engine never retries a failed dispatch.

use std::fmt;

use crate::graph::Operation;
use crate::tensor::{TensorDescriptor, TensorLiteral};

/// Error surfaced by a backend to the engine.
#[derive(Debug)]
pub enum BackendError {
    /// The engine handed the backend arguments that violate the operation's
    /// contract. Indicates an engine or backend bug, not a caller mistake.
    SpecViolation { op: &'static str, detail: String },
    /// The backend does not support the requested operation or dtype.
    Unimplemented { op: &'static str, reason: String },
    /// The kernel itself failed.
    Execution { message: String },
}

impl BackendError {
    pub fn spec_violation(op: &'static str, detail: impl Into<String>) -> Self {
        BackendError::SpecViolation {
            op,
            detail: detail.into(),
        }
    }

    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::SpecViolation { op, detail } => {
                write!(f, "{op} called outside its contract: {detail}")
            }
            BackendError::Unimplemented { op, reason } => {
                write!(f, "{op} is not implemented: {reason}")
            }
            BackendError::Execution { message } => {
                write!(f, "backend execution failure: {message}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;

/// Snapshot of a backend's live allocations.
///
/// The engine's resource contract is stated against this report: after a
/// graph is disposed, `memory()` must equal the report taken immediately
/// before the graph was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryReport {
    /// Live device tensors.
    pub tensors: usize,
    /// Bytes held by live device tensors.
    pub bytes: usize,
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tensors / {} bytes", self.tensors, self.bytes)
    }
}

/// Pluggable executor of graph operations.
pub trait KernelBackend: Send + Sync {
    type TensorHandle: Clone + Send + Sync + 'static;

    /// Returns a human-readable backend identifier (e.g., `"ref-cpu"`).
    fn backend_name(&self) -> &str;

    /// Materializes a host literal as a device tensor.
    fn materialize(&self, literal: &TensorLiteral) -> BackendResult<Self::TensorHandle>;

    /// Evaluates one operation. `inputs` are already materialized in
    /// positional order and `outputs` carries one fully resolved descriptor
    /// per produced tensor; the returned handles must match it in count,
    /// dtype, and shape.
    fn run_operation(
        &self,
        operation: &Operation,
        inputs: &[Self::TensorHandle],
        outputs: &[TensorDescriptor],
    ) -> BackendResult<Vec<Self::TensorHandle>>;

    /// Reads a device tensor back into a dense host literal.
    fn to_literal(&self, tensor: &Self::TensorHandle) -> BackendResult<TensorLiteral>;

    /// Reports currently live allocations.
    fn memory(&self) -> MemoryReport;
}
