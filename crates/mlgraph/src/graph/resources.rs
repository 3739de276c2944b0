//! Backend-side resources owned by a compiled graph.
//!
//! The only allocations a graph retains between compute calls are its
//! constant tensors, uploaded once at build time. Everything a compute call
//! creates (input uploads, intermediates) is call-scoped and dropped before
//! the call returns, so the pool is the entire difference between the
//! backend's baseline accounting and its accounting while the graph is
//! alive. Draining it is what makes `dispose` observable.

use crate::backend::{KernelBackend, MemoryReport};
use crate::tensor::TensorLiteral;

pub(crate) struct ConstantEntry<B: KernelBackend + 'static> {
    pub literal: TensorLiteral,
    pub handle: B::TensorHandle,
}

/// Build-time constant uploads, indexed by pool position.
pub(crate) struct ConstantPool<B: KernelBackend + 'static> {
    entries: Vec<ConstantEntry<B>>,
}

impl<B: KernelBackend + 'static> ConstantPool<B> {
    pub fn new() -> Self {
        ConstantPool {
            entries: Vec::new(),
        }
    }

    /// Registers an uploaded constant and returns its pool index.
    pub fn push(&mut self, literal: TensorLiteral, handle: B::TensorHandle) -> usize {
        let index = self.entries.len();
        self.entries.push(ConstantEntry { literal, handle });
        index
    }

    pub fn handle(&self, index: usize) -> &B::TensorHandle {
        &self.entries[index].handle
    }

    pub fn literal(&self, index: usize) -> &TensorLiteral {
        &self.entries[index].literal
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Host-side view of what the pool pins on the backend.
    pub fn report(&self) -> MemoryReport {
        MemoryReport {
            tensors: self.entries.len(),
            bytes: self
                .entries
                .iter()
                .map(|entry| entry.literal.byte_len())
                .sum(),
        }
    }

    /// Releases every retained handle. Equivalent to dropping the pool;
    /// spelled out so graph disposal has an explicit release point.
    pub fn drain(&mut self) {
        self.entries.clear();
    }
}
