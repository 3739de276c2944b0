//! Mutable graph-building sessions.
//!
//! A [`GraphBuilder`] creates operands (inputs, constants, operation
//! results) and validates every construction eagerly: names are checked at
//! declaration, constant buffers at snapshot time, operand provenance and
//! shape compatibility at each operation constructor. Nothing is deferred
//! to build or compute except dimensions that are genuinely unknown until
//! a compute call binds them.
//!
//! Builders are single-writer session objects. Building a graph does not
//! consume or freeze the session; operands and graphs already handed out
//! are never invalidated by later construction.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use smallvec::SmallVec;

use crate::backend::KernelBackend;
use crate::graph::compile;
use crate::graph::compiled::Graph;
use crate::graph::error::GraphError;
use crate::graph::infer;
use crate::graph::operation::{
    BinaryOp, ConcatSpec, Operation, ReshapeDim, ReshapeSpec, SplitSpec, TransposeSpec, UnaryOp,
};
use crate::graph::plan::PlanCachePolicy;
use crate::graph::timing;
use crate::tensor::{f32_to_bytes, i32_to_bytes, DType, TensorDescriptor, TensorLiteral};

static BUILDER_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Index of a value inside its builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandId(pub(crate) u32);

/// Handle to a typed, shaped node in a builder's graph.
///
/// Handles are plain copyable values; they stay valid for the lifetime of
/// the builder that created them and are rejected with
/// [`GraphError::UnknownOperand`] anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub(crate) builder: usize,
    pub(crate) id: OperandId,
}

/// Where a value comes from.
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    Input { name: String },
    Constant { literal: TensorLiteral },
    Node { node: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct ValueRecord {
    pub descriptor: TensorDescriptor,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub operation: Operation,
    pub inputs: SmallVec<[OperandId; 4]>,
    pub outputs: SmallVec<[OperandId; 2]>,
}

/// Mutable session that assembles a DAG of tensor operations over a shared
/// kernel backend.
pub struct GraphBuilder<B: KernelBackend + 'static> {
    backend: Arc<B>,
    pub(crate) id: usize,
    pub(crate) values: Vec<ValueRecord>,
    pub(crate) nodes: Vec<NodeRecord>,
    pub(crate) input_names: BTreeMap<String, OperandId>,
}

impl<B: KernelBackend + 'static> GraphBuilder<B> {
    pub fn new(backend: Arc<B>) -> Self {
        GraphBuilder {
            backend,
            id: BUILDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            values: Vec::new(),
            nodes: Vec::new(),
            input_names: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Declares a named graph input. Dimensions may be
    /// [`crate::tensor::Dimension::Dynamic`]; such axes are bound per
    /// compute call.
    pub fn input(
        &mut self,
        name: impl Into<String>,
        descriptor: TensorDescriptor,
    ) -> Result<Operand, GraphError> {
        let name = name.into();
        if self.input_names.contains_key(&name) {
            return Err(GraphError::DuplicateName { name });
        }
        let operand = self.push_value(
            descriptor,
            Origin::Input { name: name.clone() },
        );
        self.input_names.insert(name, operand.id);
        Ok(operand)
    }

    /// Snapshots `bytes` as an immutable constant. The shape must be fully
    /// fixed and the buffer length must match it exactly; the bytes are
    /// copied now, so later mutation of the caller's buffer cannot reach
    /// any graph built from this operand.
    pub fn constant(
        &mut self,
        descriptor: TensorDescriptor,
        bytes: &[u8],
    ) -> Result<Operand, GraphError> {
        let expected = descriptor
            .byte_len()
            .ok_or_else(|| GraphError::ShapeMismatch {
                context: format!(
                    "constant shape {} must be fully fixed",
                    descriptor.shape
                ),
            })?;
        if bytes.len() != expected {
            return Err(GraphError::ShapeMismatch {
                context: format!(
                    "constant {descriptor} expects {expected} bytes, got {}",
                    bytes.len()
                ),
            });
        }
        let literal = TensorLiteral::new(descriptor.clone(), Arc::from(bytes));
        Ok(self.push_value(descriptor, Origin::Constant { literal }))
    }

    /// [`Self::constant`] over an f32 slice.
    pub fn constant_f32(
        &mut self,
        descriptor: TensorDescriptor,
        values: &[f32],
    ) -> Result<Operand, GraphError> {
        if descriptor.dtype != DType::F32 {
            return Err(GraphError::ShapeMismatch {
                context: format!("f32 buffer bound to {} constant", descriptor.dtype),
            });
        }
        let bytes = f32_to_bytes(values);
        self.constant(descriptor, &bytes)
    }

    /// [`Self::constant`] over an i32 slice.
    pub fn constant_i32(
        &mut self,
        descriptor: TensorDescriptor,
        values: &[i32],
    ) -> Result<Operand, GraphError> {
        if descriptor.dtype != DType::I32 {
            return Err(GraphError::ShapeMismatch {
                context: format!("i32 buffer bound to {} constant", descriptor.dtype),
            });
        }
        let bytes = i32_to_bytes(values);
        self.constant(descriptor, &bytes)
    }

    pub fn add(&mut self, a: Operand, b: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Binary(BinaryOp::Add), &[a, b])
    }

    pub fn sub(&mut self, a: Operand, b: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Binary(BinaryOp::Sub), &[a, b])
    }

    pub fn mul(&mut self, a: Operand, b: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Binary(BinaryOp::Mul), &[a, b])
    }

    pub fn div(&mut self, a: Operand, b: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Binary(BinaryOp::Div), &[a, b])
    }

    pub fn relu(&mut self, x: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Unary(UnaryOp::Relu), &[x])
    }

    pub fn sigmoid(&mut self, x: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Unary(UnaryOp::Sigmoid), &[x])
    }

    pub fn tanh(&mut self, x: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Unary(UnaryOp::Tanh), &[x])
    }

    pub fn matmul(&mut self, a: Operand, b: Operand) -> Result<Operand, GraphError> {
        self.emit_single(Operation::MatMul, &[a, b])
    }

    pub fn transpose(
        &mut self,
        x: Operand,
        perm: impl Into<Vec<usize>>,
    ) -> Result<Operand, GraphError> {
        self.emit_single(
            Operation::Transpose(TransposeSpec { perm: perm.into() }),
            &[x],
        )
    }

    pub fn reshape(
        &mut self,
        x: Operand,
        dims: impl Into<Vec<ReshapeDim>>,
    ) -> Result<Operand, GraphError> {
        self.emit_single(
            Operation::Reshape(ReshapeSpec { dims: dims.into() }),
            &[x],
        )
    }

    /// Evenly partitions `x` along `axis` into `parts` operands, returned
    /// in axis order.
    pub fn split(
        &mut self,
        x: Operand,
        parts: usize,
        axis: usize,
    ) -> Result<Vec<Operand>, GraphError> {
        self.emit(Operation::Split(SplitSpec { axis, parts }), &[x])
    }

    pub fn concat(&mut self, inputs: &[Operand], axis: usize) -> Result<Operand, GraphError> {
        self.emit_single(Operation::Concat(ConcatSpec { axis }), inputs)
    }

    /// Returns the declared or inferred descriptor of `operand`.
    pub fn descriptor(&self, operand: Operand) -> Result<&TensorDescriptor, GraphError> {
        let id = self.expect_operand(operand)?;
        Ok(&self.values[id.0 as usize].descriptor)
    }

    /// Compiles the subgraph reachable from `outputs` into an immutable
    /// [`Graph`] with the default plan-cache policy.
    pub fn build(&self, outputs: &[(&str, Operand)]) -> Result<Graph<B>, GraphError> {
        self.build_with_policy(outputs, PlanCachePolicy::default())
    }

    /// [`Self::build`] with an explicit plan-cache policy.
    pub fn build_with_policy(
        &self,
        outputs: &[(&str, Operand)],
        policy: PlanCachePolicy,
    ) -> Result<Graph<B>, GraphError> {
        let started = Instant::now();
        let graph = compile::compile(self, outputs, policy);
        timing::add_build_time(started.elapsed());
        graph
    }

    fn push_value(&mut self, descriptor: TensorDescriptor, origin: Origin) -> Operand {
        let id = OperandId(self.values.len() as u32);
        self.values.push(ValueRecord { descriptor, origin });
        Operand {
            builder: self.id,
            id,
        }
    }

    pub(crate) fn expect_operand(&self, operand: Operand) -> Result<OperandId, GraphError> {
        if operand.builder != self.id {
            return Err(GraphError::UnknownOperand {
                context: "operand was created by a different builder".to_string(),
            });
        }
        if operand.id.0 as usize >= self.values.len() {
            return Err(GraphError::UnknownOperand {
                context: format!("operand {} is not registered", operand.id.0),
            });
        }
        Ok(operand.id)
    }

    pub(crate) fn emit(
        &mut self,
        operation: Operation,
        inputs: &[Operand],
    ) -> Result<Vec<Operand>, GraphError> {
        let mut ids: SmallVec<[OperandId; 4]> = SmallVec::with_capacity(inputs.len());
        for operand in inputs {
            ids.push(self.expect_operand(*operand)?);
        }
        let descriptors: Vec<TensorDescriptor> = ids
            .iter()
            .map(|id| self.values[id.0 as usize].descriptor.clone())
            .collect();
        let output_descriptors =
            infer::infer(&operation, &descriptors).map_err(|detail| {
                GraphError::IncompatibleShape {
                    operation: operation.name(),
                    detail,
                }
            })?;
        debug_assert_eq!(
            output_descriptors.len(),
            operation.output_count(),
            "inference produces one descriptor per declared result"
        );
        let node_index = self.nodes.len();
        let mut output_ids: SmallVec<[OperandId; 2]> =
            SmallVec::with_capacity(output_descriptors.len());
        let mut handles = Vec::with_capacity(output_descriptors.len());
        for descriptor in output_descriptors {
            let operand = self.push_value(descriptor, Origin::Node { node: node_index });
            output_ids.push(operand.id);
            handles.push(operand);
        }
        self.nodes.push(NodeRecord {
            operation,
            inputs: ids,
            outputs: output_ids,
        });
        Ok(handles)
    }

    fn emit_single(
        &mut self,
        operation: Operation,
        inputs: &[Operand],
    ) -> Result<Operand, GraphError> {
        let name = operation.name();
        let mut outputs = self.emit(operation, inputs)?;
        outputs.pop().ok_or_else(|| GraphError::IncompatibleShape {
            operation: name,
            detail: "operation produced no outputs".to_string(),
        })
    }
}
