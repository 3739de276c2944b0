//! A delegating backend wrapper that counts kernel dispatches.
//!
//! Used to pin down the minimal-subgraph law: the number of
//! `run_operation` calls a compute performs equals the size of the
//! ancestor set of the requested outputs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mlgraph::backend::{BackendResult, KernelBackend, MemoryReport};
use mlgraph::graph::Operation;
use mlgraph::tensor::{TensorDescriptor, TensorLiteral};

pub struct CountingBackend<B: KernelBackend> {
    inner: Arc<B>,
    dispatches: AtomicUsize,
}

impl<B: KernelBackend> CountingBackend<B> {
    pub fn new(inner: Arc<B>) -> Self {
        CountingBackend {
            inner,
            dispatches: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<B> {
        &self.inner
    }

    /// Total `run_operation` calls observed so far.
    pub fn kernel_dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

impl<B: KernelBackend> KernelBackend for CountingBackend<B> {
    type TensorHandle = B::TensorHandle;

    fn backend_name(&self) -> &str {
        "counting"
    }

    fn materialize(&self, literal: &TensorLiteral) -> BackendResult<Self::TensorHandle> {
        self.inner.materialize(literal)
    }

    fn run_operation(
        &self,
        operation: &Operation,
        inputs: &[Self::TensorHandle],
        outputs: &[TensorDescriptor],
    ) -> BackendResult<Vec<Self::TensorHandle>> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        self.inner.run_operation(operation, inputs, outputs)
    }

    fn to_literal(&self, tensor: &Self::TensorHandle) -> BackendResult<TensorLiteral> {
        self.inner.to_literal(tensor)
    }

    fn memory(&self) -> MemoryReport {
        self.inner.memory()
    }
}
