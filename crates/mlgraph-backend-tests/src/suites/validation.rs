//! Compute-time validation contract: every bad binding is a reported
//! error, raised before any backend work.

use std::sync::Arc;

use mlgraph::graph::NameKind;
use mlgraph::tensor::Dimension;
use mlgraph::{
    ComputeError, ComputeInputs, ComputeOutputs, DType, Graph, GraphBuilder, InputBinding,
    KernelBackend, OutputBinding, TensorDescriptor,
};

/// One input `a: f32[2]`, one dynamic input `d: f32[?]`, outputs `sum` (a
/// plus itself) and `dyn` (d plus itself).
fn fixture<B: KernelBackend + 'static>(backend: &Arc<B>) -> Graph<B> {
    let mut builder = GraphBuilder::new(Arc::clone(backend));
    let a = builder
        .input("a", TensorDescriptor::fixed(DType::F32, &[2]))
        .unwrap();
    let d = builder
        .input("d", TensorDescriptor::new(DType::F32, vec![Dimension::Dynamic]))
        .unwrap();
    let sum = builder.add(a, a).unwrap();
    let dynamic = builder.add(d, d).unwrap();
    builder.build(&[("sum", sum), ("dyn", dynamic)]).unwrap()
}

fn bind_all(inputs: &mut ComputeInputs<'_>, a: &'static [f32], d: &'static [f32]) {
    inputs.insert("a", InputBinding::f32(a));
    inputs.insert("d", InputBinding::f32(d).with_dimensions([d.len()]));
}

pub fn empty_input_map_is_missing_inputs<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let graph = fixture(backend);
    let inputs = ComputeInputs::new();
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::MissingInputs { .. }), "{err}");
}

pub fn missing_input_key_is_missing_inputs<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0, 2.0]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::MissingInputs { .. }), "{err}");
}

pub fn unknown_input_key_is_unknown_name<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    bind_all(&mut inputs, &[1.0, 2.0], &[1.0]);
    inputs.insert("mystery", InputBinding::f32(&[0.0]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(
        matches!(
            err,
            ComputeError::UnknownName {
                kind: NameKind::Input,
                ..
            }
        ),
        "{err}"
    );
}

pub fn unknown_output_key_is_unknown_name<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    bind_all(&mut inputs, &[1.0, 2.0], &[1.0]);
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("mystery", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(
        matches!(
            err,
            ComputeError::UnknownName {
                kind: NameKind::Output,
                ..
            }
        ),
        "{err}"
    );
}

pub fn dynamic_input_without_dimensions_is_unresolved<B: KernelBackend + 'static>(
    backend: &Arc<B>,
) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0, 2.0]));
    inputs.insert("d", InputBinding::f32(&[1.0, 2.0, 3.0]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::ShapeUnresolved { .. }), "{err}");
}

pub fn wrong_dtype_binding_is_shape_mismatch<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::i32(&[1, 2]));
    inputs.insert("d", InputBinding::f32(&[1.0]).with_dimensions([1]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::ShapeMismatch { .. }), "{err}");
}

pub fn contradicting_dimensions_are_shape_mismatch<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    // "a" is declared [2]; a binding claiming [3] contradicts the fixed axis.
    inputs.insert("a", InputBinding::f32(&[1.0, 2.0, 3.0]).with_dimensions([3]));
    inputs.insert("d", InputBinding::f32(&[1.0]).with_dimensions([1]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::ShapeMismatch { .. }), "{err}");
}

pub fn wrong_rank_dimensions_are_shape_mismatch<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0, 2.0]));
    inputs.insert("d", InputBinding::f32(&[1.0, 2.0]).with_dimensions([1, 2]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::ShapeMismatch { .. }), "{err}");
}

pub fn wrong_length_output_buffer_is_output_mismatch<B: KernelBackend + 'static>(
    backend: &Arc<B>,
) {
    let graph = fixture(backend);
    let mut inputs = ComputeInputs::new();
    bind_all(&mut inputs, &[1.0, 2.0], &[1.0]);
    let mut buffer = [0.0f32; 5];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("sum", OutputBinding::f32(&mut buffer));
    let err = graph.compute(&inputs, &mut outputs).unwrap_err();
    assert!(matches!(err, ComputeError::OutputMismatch { .. }), "{err}");
}
