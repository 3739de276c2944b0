//! Error taxonomies for graph construction and execution.
//!
//! Construction errors come out of builder and build calls synchronously
//! and are always recoverable by correcting the graph definition.
//! Execution errors come out of [`crate::graph::Graph::compute`]; validation
//! failures surface before any backend work, and a backend failure is
//! propagated verbatim without retry. The two enums are deliberately
//! separate types: a caller matching on one can never confuse it with the
//! other.

use thiserror::Error;

use crate::backend::BackendError;

/// Failure while defining or building a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An input or output name is already taken.
    #[error("name {name:?} is already in use")]
    DuplicateName { name: String },
    /// A supplied buffer or dimension list contradicts a declared shape.
    #[error("shape mismatch: {context}")]
    ShapeMismatch { context: String },
    /// Two fixed extents are provably incompatible for the operation.
    #[error("{operation}: {detail}")]
    IncompatibleShape {
        operation: &'static str,
        detail: String,
    },
    /// An operand handle was not produced by this builder.
    #[error("unknown operand: {context}")]
    UnknownOperand { context: String },
    /// `build` was called with an empty output set.
    #[error("a graph needs at least one named output")]
    NoOutputs,
    /// The backend rejected a constant while it was uploaded at build time.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Which namespace a compute-time name lookup failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Input,
    Output,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameKind::Input => f.write_str("input"),
            NameKind::Output => f.write_str("output"),
        }
    }
}

/// Failure while computing a graph.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// The graph declares inputs the call did not bind.
    #[error("missing inputs: {detail}")]
    MissingInputs { detail: String },
    /// A bound name is not declared by the graph.
    #[error("{kind} name {name:?} is not declared by this graph")]
    UnknownName { kind: NameKind, name: String },
    /// An input with dynamic dimensions was bound without explicit
    /// dimensions.
    #[error("input {name:?} has unresolved dimensions and the binding supplies none")]
    ShapeUnresolved { name: String },
    /// A binding or a resolved shape contradicts the graph's declarations.
    #[error("shape mismatch: {context}")]
    ShapeMismatch { context: String },
    /// A requested output buffer does not match the resolved output.
    #[error("output {name:?}: {detail}")]
    OutputMismatch { name: String, detail: String },
    /// The backend failed; fatal for this call, never retried.
    #[error(transparent)]
    Backend(#[from] BackendError),
}
