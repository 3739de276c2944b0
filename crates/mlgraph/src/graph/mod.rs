//! Graph construction, compilation, and execution.
//!
//! A [`GraphBuilder`] assembles a DAG of typed operands with eager
//! validation; [`GraphBuilder::build`] freezes the subgraph reachable from
//! a requested output set into an immutable [`Graph`]; [`Graph::compute`]
//! binds caller buffers, resolves dynamic dimensions, and runs the minimal
//! ancestor subgraph on the backend.

mod bindings;
mod builder;
mod compile;
mod compiled;
mod error;
mod gru;
mod infer;
mod manifest;
mod operation;
mod plan;
mod resources;
pub mod timing;

pub use bindings::{ComputeInputs, ComputeOutputs, InputBinding, OutputBinding};
pub use builder::{GraphBuilder, Operand};
pub use compiled::{Graph, ValueId};
pub use error::{ComputeError, GraphError, NameKind};
pub use gru::GruOptions;
pub use manifest::{ConstantManifest, GraphManifest, ManifestSerdeError, NodeManifest};
pub use operation::{
    BinaryOp, ConcatSpec, Operation, ReshapeDim, ReshapeSpec, SplitSpec, TransposeSpec, UnaryOp,
};
pub use plan::PlanCachePolicy;
