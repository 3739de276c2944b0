//! Operation catalog.
//!
//! Each catalog entry is a node kind with two halves: a shape-inference
//! rule (in [`crate::graph::infer`]) consulted eagerly by the builder and
//! again at compute time over resolved extents, and a kernel contract the
//! backend fulfills (a pure function from typed input buffers to typed
//! output buffers). The recurrent cell is deliberately absent: the builder
//! unrolls it into these primitives, so backends never see it.

use serde::{Deserialize, Serialize};

/// Element-wise binary arithmetic with numpy-style broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// Element-wise unary activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Relu => "relu",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Tanh => "tanh",
        }
    }
}

/// Axis permutation: output axis `i` takes input axis `perm[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransposeSpec {
    pub perm: Vec<usize>,
}

/// One target axis of a reshape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReshapeDim {
    /// Explicit extent.
    Fixed(usize),
    /// Extent derived from the element count; at most one per reshape.
    Infer,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReshapeSpec {
    pub dims: Vec<ReshapeDim>,
}

/// Even partition of one axis into `parts` results, in axis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitSpec {
    pub axis: usize,
    pub parts: usize,
}

/// Concatenation of same-rank tensors along `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcatSpec {
    pub axis: usize,
}

/// A node kind together with its construction-time options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Binary(BinaryOp),
    Unary(UnaryOp),
    /// Batched matrix product over the two trailing axes; leading axes
    /// broadcast numpy-style.
    MatMul,
    Transpose(TransposeSpec),
    Reshape(ReshapeSpec),
    Split(SplitSpec),
    Concat(ConcatSpec),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Binary(op) => op.name(),
            Operation::Unary(op) => op.name(),
            Operation::MatMul => "matmul",
            Operation::Transpose(_) => "transpose",
            Operation::Reshape(_) => "reshape",
            Operation::Split(_) => "split",
            Operation::Concat(_) => "concat",
        }
    }

    /// Number of result operands the node produces.
    pub fn output_count(&self) -> usize {
        match self {
            Operation::Split(spec) => spec.parts,
            _ => 1,
        }
    }
}
