//! Immutable compiled graphs and their execution entry point.
//!
//! A [`Graph`] is a self-contained snapshot: dense value and node tables in
//! topological order, name maps for inputs and outputs, and a pool of
//! constant tensors already uploaded to the backend. It holds no reference
//! into the builder that produced it and never changes after construction,
//! which is what makes [`Graph::compute`] safe to call from any number of
//! threads at once.
//!
//! Each compute call validates its bindings in a fixed order, resolves any
//! dynamic dimensions over the minimal ancestor subgraph of the requested
//! outputs, dispatches exactly that subgraph to the backend, and copies the
//! results into caller-owned buffers. Every allocation the call created is
//! released before it returns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use smallvec::SmallVec;

use crate::backend::{KernelBackend, MemoryReport};
use crate::graph::bindings::{ComputeInputs, ComputeOutputs, InputBinding};
use crate::graph::error::{ComputeError, NameKind};
use crate::graph::infer;
use crate::graph::operation::Operation;
use crate::graph::plan::{ExecutionPlan, PlanCacheState, PlanKey};
use crate::graph::resources::ConstantPool;
use crate::graph::timing;
use crate::tensor::{Dimension, TensorDescriptor, TensorLiteral};

/// Dense index of a value inside a compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a compiled value gets its tensor from at compute time.
#[derive(Debug, Clone)]
pub(crate) enum ValueSource {
    /// Bound by the caller under this name.
    Input { name: String },
    /// Served from the graph's constant pool.
    Constant { pool_index: usize },
    /// Produced by node `node`; its position among the node's results is
    /// recorded on the node itself.
    Node { node: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct GraphValue {
    pub descriptor: TensorDescriptor,
    pub source: ValueSource,
}

#[derive(Debug, Clone)]
pub(crate) struct GraphNode {
    pub operation: Operation,
    pub inputs: SmallVec<[ValueId; 4]>,
    pub outputs: SmallVec<[ValueId; 2]>,
}

/// Immutable, topologically ordered snapshot of a builder's reachable
/// subgraph for a fixed output set.
pub struct Graph<B: KernelBackend + 'static> {
    pub(crate) backend: Arc<B>,
    pub(crate) values: Vec<GraphValue>,
    /// Topological order: every node appears after the producers of all its
    /// inputs.
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) inputs: BTreeMap<String, ValueId>,
    pub(crate) outputs: BTreeMap<String, ValueId>,
    pub(crate) constants: ConstantPool<B>,
    pub(crate) plan_cache: PlanCacheState,
}

impl<B: KernelBackend + 'static> fmt::Debug for Graph<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("backend", &self.backend.backend_name())
            .field("values", &self.values.len())
            .field("nodes", &self.nodes.len())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("constants", &self.constants.len())
            .finish_non_exhaustive()
    }
}

impl<B: KernelBackend + 'static> Graph<B> {
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Declared input names, in sorted order.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Declared output names, in sorted order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn input_descriptor(&self, name: &str) -> Option<&TensorDescriptor> {
        self.inputs
            .get(name)
            .map(|id| &self.values[id.index()].descriptor)
    }

    pub fn output_descriptor(&self, name: &str) -> Option<&TensorDescriptor> {
        self.outputs
            .get(name)
            .map(|id| &self.values[id.index()].descriptor)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Memory pinned by this graph's constant pool. Equals the backend's
    /// report delta from immediately before the graph was built.
    pub fn constant_memory(&self) -> MemoryReport {
        self.constants.report()
    }

    /// Runs the graph once: validates `inputs` and `outputs`, resolves
    /// dynamic dimensions, executes the minimal ancestor subgraph of the
    /// requested outputs in topological order, and copies results into the
    /// caller's buffers. Results are value copies; the engine never retains
    /// or aliases caller memory, and repeated calls cannot observe each
    /// other's buffers.
    pub fn compute(
        &self,
        inputs: &ComputeInputs<'_>,
        outputs: &mut ComputeOutputs<'_>,
    ) -> Result<(), ComputeError> {
        let started = Instant::now();
        let result = self.compute_inner(inputs, outputs);
        timing::add_compute_time(started.elapsed());
        result
    }

    fn compute_inner(
        &self,
        inputs: &ComputeInputs<'_>,
        outputs: &mut ComputeOutputs<'_>,
    ) -> Result<(), ComputeError> {
        // Input validation runs to completion before any output or backend
        // work; the failure order is part of the contract.
        if !self.inputs.is_empty() && inputs.is_empty() {
            return Err(ComputeError::MissingInputs {
                detail: format!(
                    "graph declares {} input(s) and the call binds none",
                    self.inputs.len()
                ),
            });
        }
        for name in inputs.names() {
            if !self.inputs.contains_key(name) {
                return Err(ComputeError::UnknownName {
                    kind: NameKind::Input,
                    name: name.to_string(),
                });
            }
        }
        for name in self.inputs.keys() {
            if inputs.get(name).is_none() {
                return Err(ComputeError::MissingInputs {
                    detail: format!("input {name:?} is not bound"),
                });
            }
        }
        let mut resolved_inputs: BTreeMap<ValueId, TensorDescriptor> = BTreeMap::new();
        for (name, value) in &self.inputs {
            let binding = inputs.get(name).expect("presence checked above");
            let declared = &self.values[value.index()].descriptor;
            let descriptor = resolve_input_binding(name, declared, binding)?;
            resolved_inputs.insert(*value, descriptor);
        }

        for name in outputs.names() {
            if !self.outputs.contains_key(name) {
                return Err(ComputeError::UnknownName {
                    kind: NameKind::Output,
                    name: name.to_string(),
                });
            }
        }
        let plan = self.plan_for(outputs);

        // Shape resolution over the ancestor set, in topological order. All
        // extents are concrete here; a conflict that hid behind a dynamic
        // axis at build time surfaces now, before any kernel runs.
        let resolved = self.resolve_shapes(&plan, &resolved_inputs)?;

        for (name, binding) in outputs.iter() {
            let value = self.outputs[name];
            let descriptor = resolved[value.index()]
                .as_ref()
                .expect("requested outputs are in the ancestor set");
            if binding.dtype() != descriptor.dtype {
                return Err(ComputeError::OutputMismatch {
                    name: name.to_string(),
                    detail: format!(
                        "buffer holds {}, output resolves to {}",
                        binding.dtype(),
                        descriptor.dtype
                    ),
                });
            }
            let expected = descriptor.byte_len().ok_or_else(|| {
                ComputeError::ShapeMismatch {
                    context: format!("output {name:?} did not resolve to a fixed shape"),
                }
            })?;
            if binding.byte_len() != expected {
                return Err(ComputeError::OutputMismatch {
                    name: name.to_string(),
                    detail: format!(
                        "buffer is {} bytes, output resolves to {expected}",
                        binding.byte_len()
                    ),
                });
            }
        }

        self.execute(&plan, inputs, outputs, &resolved)
    }

    /// Explicitly releases every backend allocation attributed to this
    /// graph. Afterwards the backend's memory report equals what it was
    /// immediately before the graph was built. Dropping the graph releases
    /// the same resources; `dispose` makes the point explicit.
    pub fn dispose(mut self) {
        self.constants.drain();
    }

    fn plan_for(&self, outputs: &ComputeOutputs<'_>) -> Arc<ExecutionPlan> {
        let key = PlanKey::new(outputs.names());
        if let Some(plan) = self.plan_cache.get(&key) {
            return plan;
        }
        let roots: Vec<ValueId> = outputs
            .names()
            .map(|name| self.outputs[name])
            .collect();
        let plan = Arc::new(self.build_plan(&roots));
        self.plan_cache.put(key, Arc::clone(&plan));
        plan
    }

    /// Walks backward from `roots` over the dense tables, collecting the
    /// ancestor nodes and every value they touch. The node list keeps the
    /// compiled topological order.
    fn build_plan(&self, roots: &[ValueId]) -> ExecutionPlan {
        let mut value_seen = vec![false; self.values.len()];
        let mut node_seen = vec![false; self.nodes.len()];
        let mut stack: Vec<ValueId> = roots.to_vec();
        while let Some(value) = stack.pop() {
            if value_seen[value.index()] {
                continue;
            }
            value_seen[value.index()] = true;
            if let ValueSource::Node { node } = self.values[value.index()].source {
                if !node_seen[node] {
                    node_seen[node] = true;
                    for input in &self.nodes[node].inputs {
                        stack.push(*input);
                    }
                    // Sibling outputs come out of the same dispatch even
                    // when nothing downstream reads them.
                    for output in &self.nodes[node].outputs {
                        if !value_seen[output.index()] {
                            value_seen[output.index()] = true;
                        }
                    }
                }
            }
        }
        let nodes = (0..self.nodes.len()).filter(|&i| node_seen[i]).collect();
        let needed = (0..self.values.len())
            .filter(|&i| value_seen[i])
            .map(|i| ValueId(i as u32))
            .collect();
        ExecutionPlan { nodes, needed }
    }

    fn resolve_shapes(
        &self,
        plan: &ExecutionPlan,
        resolved_inputs: &BTreeMap<ValueId, TensorDescriptor>,
    ) -> Result<Vec<Option<TensorDescriptor>>, ComputeError> {
        let mut resolved: Vec<Option<TensorDescriptor>> = vec![None; self.values.len()];
        for value in &plan.needed {
            match &self.values[value.index()].source {
                ValueSource::Input { .. } => {
                    resolved[value.index()] = Some(resolved_inputs[value].clone());
                }
                ValueSource::Constant { pool_index } => {
                    resolved[value.index()] =
                        Some(self.constants.literal(*pool_index).descriptor.clone());
                }
                ValueSource::Node { .. } => {}
            }
        }
        for &node_index in &plan.nodes {
            let node = &self.nodes[node_index];
            let input_descriptors: Vec<TensorDescriptor> = node
                .inputs
                .iter()
                .map(|input| {
                    resolved[input.index()]
                        .clone()
                        .expect("topological order resolves inputs first")
                })
                .collect();
            let output_descriptors = infer::infer(&node.operation, &input_descriptors)
                .map_err(|detail| ComputeError::ShapeMismatch {
                    context: format!("{}: {detail}", node.operation.name()),
                })?;
            for (output, descriptor) in node.outputs.iter().zip(output_descriptors) {
                resolved[output.index()] = Some(descriptor);
            }
        }
        Ok(resolved)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &ComputeInputs<'_>,
        outputs: &mut ComputeOutputs<'_>,
        resolved: &[Option<TensorDescriptor>],
    ) -> Result<(), ComputeError> {
        // Call-scoped handle table. Dropping it at the end of the call
        // releases every upload and intermediate this call created;
        // constants stay alive in the pool.
        let mut slots: Vec<Option<B::TensorHandle>> = vec![None; self.values.len()];
        for value in &plan.needed {
            match &self.values[value.index()].source {
                ValueSource::Input { name } => {
                    let binding = inputs.get(name).expect("validated above");
                    let descriptor = resolved[value.index()]
                        .clone()
                        .expect("inputs resolve before execution");
                    let literal =
                        TensorLiteral::new(descriptor, Arc::from(binding.to_bytes()));
                    slots[value.index()] = Some(self.backend.materialize(&literal)?);
                }
                ValueSource::Constant { pool_index } => {
                    slots[value.index()] = Some(self.constants.handle(*pool_index).clone());
                }
                ValueSource::Node { .. } => {}
            }
        }
        for &node_index in &plan.nodes {
            let node = &self.nodes[node_index];
            let input_handles: Vec<B::TensorHandle> = node
                .inputs
                .iter()
                .map(|input| {
                    slots[input.index()]
                        .clone()
                        .expect("topological order fills inputs first")
                })
                .collect();
            let output_descriptors: Vec<TensorDescriptor> = node
                .outputs
                .iter()
                .map(|output| {
                    resolved[output.index()]
                        .clone()
                        .expect("resolution covered the ancestor set")
                })
                .collect();
            let results =
                self.backend
                    .run_operation(&node.operation, &input_handles, &output_descriptors)?;
            if results.len() != node.outputs.len() {
                return Err(ComputeError::Backend(
                    crate::backend::BackendError::spec_violation(
                        node.operation.name(),
                        format!(
                            "returned {} tensors for {} outputs",
                            results.len(),
                            node.outputs.len()
                        ),
                    ),
                ));
            }
            for (output, handle) in node.outputs.iter().zip(results) {
                slots[output.index()] = Some(handle);
            }
        }
        let requested: Vec<String> = outputs.names().map(str::to_owned).collect();
        for name in requested {
            let value = self.outputs[&name];
            debug_assert!(plan.needs(value), "requested outputs are in the plan");
            let handle = slots[value.index()]
                .as_ref()
                .expect("requested outputs are produced by the plan");
            let literal = self.backend.to_literal(handle)?;
            let binding = outputs
                .get_mut(&name)
                .expect("requested names come from the output map");
            binding.write_bytes(&literal.bytes);
        }
        Ok(())
    }
}

/// Step-4 validation of one input binding against its declared descriptor.
/// Returns the fully resolved descriptor the call will use.
fn resolve_input_binding(
    name: &str,
    declared: &TensorDescriptor,
    binding: &InputBinding<'_>,
) -> Result<TensorDescriptor, ComputeError> {
    if binding.dtype() != declared.dtype {
        return Err(ComputeError::ShapeMismatch {
            context: format!(
                "input {name:?} is declared {}, binding holds {}",
                declared.dtype,
                binding.dtype()
            ),
        });
    }
    let dims = match binding.dimensions() {
        Some(dims) => {
            if dims.len() != declared.shape.rank() {
                return Err(ComputeError::ShapeMismatch {
                    context: format!(
                        "input {name:?} has rank {}, binding supplies {} dimension(s)",
                        declared.shape.rank(),
                        dims.len()
                    ),
                });
            }
            for (axis, (dim, declared_dim)) in
                dims.iter().zip(declared.shape.dims()).enumerate()
            {
                if let Dimension::Fixed(extent) = declared_dim {
                    if dim != extent {
                        return Err(ComputeError::ShapeMismatch {
                            context: format!(
                                "input {name:?} axis {axis} is declared {extent}, binding supplies {dim}"
                            ),
                        });
                    }
                }
            }
            dims.to_vec()
        }
        None => match declared.shape.static_dims() {
            Some(dims) => dims,
            None => {
                return Err(ComputeError::ShapeUnresolved {
                    name: name.to_string(),
                });
            }
        },
    };
    let resolved = TensorDescriptor::fixed(declared.dtype, &dims);
    let expected = resolved.byte_len().ok_or_else(|| ComputeError::ShapeMismatch {
        context: format!("input {name:?} resolved byte length overflows"),
    })?;
    if binding.byte_len() != expected {
        return Err(ComputeError::ShapeMismatch {
            context: format!(
                "input {name:?} resolves to {expected} bytes, binding holds {}",
                binding.byte_len()
            ),
        });
    }
    Ok(resolved)
}
