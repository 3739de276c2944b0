//! Enumerates the scalar element types an operand may carry.

use serde::{Deserialize, Serialize};

/// Logical element type of an operand. Fixed at operand creation and never
/// coerced by the engine; mixing dtypes across an operation's inputs is a
/// construction error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 16-bit floating point. Descriptors carry it; the reference CPU
    /// backend reports it as unimplemented at kernel dispatch.
    F16,
    /// 32-bit signed integer.
    I32,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I32 => 4,
        }
    }

    /// Human-readable name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I32 => "i32",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
