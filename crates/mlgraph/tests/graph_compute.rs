use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use mlgraph::backend::{BackendResult, KernelBackend, MemoryReport};
use mlgraph::graph::{Operation, PlanCachePolicy};
use mlgraph::tensor::Dimension;
use mlgraph::{
    ComputeError, ComputeInputs, ComputeOutputs, DType, GraphBuilder, InputBinding,
    OutputBinding, TensorDescriptor, TensorLiteral,
};
use mlgraph_backend_ref_cpu::CpuBackend;

struct CountingBackend {
    inner: CpuBackend,
    dispatches: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Self {
        CountingBackend {
            inner: CpuBackend::new(),
            dispatches: AtomicUsize::new(0),
        }
    }

    fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

impl KernelBackend for CountingBackend {
    type TensorHandle = <CpuBackend as KernelBackend>::TensorHandle;

    fn backend_name(&self) -> &str {
        "ref-cpu-counting"
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

/// `a -> shifted = a + k -> scaled = shifted * k`, both named as outputs.
fn chain_graph(
    backend: &Arc<CountingBackend>,
    policy: PlanCachePolicy,
) -> Result<mlgraph::Graph<CountingBackend>> {
    let mut builder = GraphBuilder::new(Arc::clone(backend));
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let k = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &[2.0; 2])?;
    let shifted = builder.add(a, k)?;
    let scaled = builder.mul(shifted, k)?;
    Ok(builder.build_with_policy(&[("shifted", shifted), ("scaled", scaled)], policy)?)
}

fn bind_a(values: &'static [f32]) -> ComputeInputs<'static> {
    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(values));
    inputs
}

#[test]
fn subsets_dispatch_only_the_ancestor_subgraph() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let graph = chain_graph(&backend, PlanCachePolicy::default())?;

    let inputs = bind_a(&[1.0, 2.0]);
    let mut shifted = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("shifted", OutputBinding::f32(&mut shifted));
    graph.compute(&inputs, &mut outputs)?;
    assert_eq!(shifted, [3.0, 4.0]);
    assert_eq!(
        backend.dispatches(),
        1,
        "the mul feeding only 'scaled' must not run"
    );

    let mut scaled = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("scaled", OutputBinding::f32(&mut scaled));
    graph.compute(&inputs, &mut outputs)?;
    assert_eq!(scaled, [6.0, 8.0]);
    assert_eq!(
        backend.dispatches(),
        3,
        "nothing is cached across calls: both nodes run again"
    );
    Ok(())
}

#[test]
fn plan_caching_changes_no_observable_behavior() -> Result<()> {
    for policy in [
        PlanCachePolicy::Disabled,
        PlanCachePolicy::Lru { capacity: 2 },
    ] {
        let backend = Arc::new(CountingBackend::new());
        let graph = chain_graph(&backend, policy)?;
        let inputs = bind_a(&[1.0, 2.0]);
        for _ in 0..3 {
            let mut scaled = [0.0f32; 2];
            let mut outputs = ComputeOutputs::new();
            outputs.insert("scaled", OutputBinding::f32(&mut scaled));
            graph.compute(&inputs, &mut outputs)?;
            assert_eq!(scaled, [6.0, 8.0]);
        }
        assert_eq!(backend.dispatches(), 6);
    }
    Ok(())
}

#[test]
fn empty_output_request_validates_but_runs_nothing() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let graph = chain_graph(&backend, PlanCachePolicy::default())?;

    let mut outputs = ComputeOutputs::new();
    graph.compute(&bind_a(&[1.0, 2.0]), &mut outputs)?;
    assert_eq!(backend.dispatches(), 0);

    // Input validation still applies.
    let err = graph
        .compute(&ComputeInputs::new(), &mut ComputeOutputs::new())
        .unwrap_err();
    assert!(matches!(err, ComputeError::MissingInputs { .. }), "{err}");
    Ok(())
}

#[test]
fn validation_failures_precede_backend_work() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let graph = chain_graph(&backend, PlanCachePolicy::default())?;

    // Unknown input keys are reported before missing ones.
    let mut inputs = ComputeInputs::new();
    inputs.insert("mystery", InputBinding::f32(&[0.0]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("shifted", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::UnknownName { .. }), "{err}");

    // A wrong-length output aborts before dispatch as well.
    let mut wrong = [0.0f32; 3];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("shifted", OutputBinding::f32(&mut wrong));
    let err = graph.compute(&bind_a(&[1.0, 2.0]), &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::OutputMismatch { .. }), "{err}");

    assert_eq!(backend.dispatches(), 0);
    Ok(())
}

#[test]
fn bound_dynamic_extents_propagate_through_downstream_nodes() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let mut builder = GraphBuilder::new(Arc::clone(&backend));
    let a = builder.input(
        "a",
        TensorDescriptor::new(DType::F32, vec![Dimension::Dynamic, Dimension::Fixed(2)]),
    )?;
    let b = builder.input(
        "b",
        TensorDescriptor::new(DType::F32, vec![Dimension::Fixed(2), Dimension::Dynamic]),
    )?;
    let product = builder.matmul(a, b)?;
    let graph = builder.build(&[("product", product)])?;

    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0; 6]).with_dimensions([3, 2]));
    inputs.insert("b", InputBinding::f32(&[1.0; 8]).with_dimensions([2, 4]));
    let mut buffer = [0.0f32; 12];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("product", OutputBinding::f32(&mut buffer));
    graph.compute(&inputs, &mut outputs)?;
    assert_eq!(buffer, [2.0; 12]);

    Ok(())
}

#[test]
fn conflicts_behind_dynamic_axes_surface_before_dispatch() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let mut builder = GraphBuilder::new(Arc::clone(&backend));
    let dynamic_pair = TensorDescriptor::new(
        DType::F32,
        vec![Dimension::Dynamic, Dimension::Dynamic],
    );
    let a = builder.input("a", dynamic_pair.clone())?;
    let b = builder.input("b", dynamic_pair)?;
    // Both inner extents are unknown at build time, so construction accepts
    // this matmul unconditionally.
    let product = builder.matmul(a, b)?;
    let graph = builder.build(&[("product", product)])?;

    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0; 6]).with_dimensions([3, 2]));
    inputs.insert("b", InputBinding::f32(&[1.0; 20]).with_dimensions([5, 4]));
    let mut buffer = [0.0f32; 12];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("product", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::ShapeMismatch { .. }), "{err}");
    assert_eq!(backend.dispatches(), 0);
    Ok(())
}

#[test]
fn concurrent_computes_share_one_graph_safely() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let graph = chain_graph(&backend, PlanCachePolicy::default())?;

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..8 {
                    let mut scaled = [0.0f32; 2];
                    let mut outputs = ComputeOutputs::new();
                    outputs.insert("scaled", OutputBinding::f32(&mut scaled));
                    graph
                        .compute(&bind_a(&[1.0, 2.0]), &mut outputs)
                        .expect("concurrent compute failed");
                    assert_eq!(scaled, [6.0, 8.0]);
                }
            });
        }
    });
    assert_eq!(backend.dispatches(), 4 * 8 * 2);
    Ok(())
}

#[test]
fn dispose_returns_the_backend_to_its_baseline() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let baseline = backend.memory();
    let graph = chain_graph(&backend, PlanCachePolicy::default())?;
    assert_eq!(
        backend.memory(),
        MemoryReport {
            tensors: 1,
            bytes: 8
        },
        "one 2-element f32 constant is live after build"
    );
    assert_eq!(
        graph.constant_memory(),
        MemoryReport {
            tensors: 1,
            bytes: 8
        },
        "the graph attributes that constant to its own pool"
    );

    let mut scaled = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("scaled", OutputBinding::f32(&mut scaled));
    graph.compute(&bind_a(&[1.0, 2.0]), &mut outputs)?;
    assert_eq!(backend.memory().tensors, 1, "call-scoped handles are gone");

    graph.dispose();
    assert_eq!(backend.memory(), baseline);
    Ok(())
}

#[test]
fn compute_timing_counters_reset_on_take() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let graph = chain_graph(&backend, PlanCachePolicy::default())?;

    let mut scaled = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("scaled", OutputBinding::f32(&mut scaled));
    graph.compute(&bind_a(&[1.0, 2.0]), &mut outputs)?;

    let _ = mlgraph::graph::timing::take_compute_time();
    assert_eq!(
        mlgraph::graph::timing::take_compute_time(),
        std::time::Duration::ZERO
    );
    Ok(())
}

#[test]
fn outputs_may_be_inputs_passed_straight_through() -> Result<()> {
    let backend = Arc::new(CountingBackend::new());
    let mut builder = GraphBuilder::new(Arc::clone(&backend));
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[3]))?;
    let graph = builder.build(&[("echo", a)])?;

    let mut buffer = [0.0f32; 3];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("echo", OutputBinding::f32(&mut buffer));
    graph.compute(&bind_a(&[7.0, 8.0, 9.0]), &mut outputs)?;
    assert_eq!(buffer, [7.0, 8.0, 9.0]);
    assert_eq!(backend.dispatches(), 0);
    Ok(())
}
