//! Numeric end-to-end fixtures.

use std::sync::Arc;

use mlgraph::{
    ComputeInputs, ComputeOutputs, DType, GraphBuilder, InputBinding, KernelBackend,
    OutputBinding, TensorDescriptor,
};
use mlgraph::tensor::Dimension;

use crate::counting::CountingBackend;

use super::{assert_close, gru_expected_first_step, gru_expected_hidden, gru_fixture, gru_input_values};

/// matmul of two 2x2 all-ones matrices is all 2s; adding an all-ones
/// constant on top is all 3s. Both outputs come from one graph.
pub fn matmul_then_add_matches_expected<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let mut builder = GraphBuilder::new(Arc::clone(backend));
    let a = builder
        .input("a", TensorDescriptor::fixed(DType::F32, &[2, 2]))
        .unwrap();
    let ones = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[2, 2]), &[1.0; 4])
        .unwrap();
    let product = builder.matmul(a, ones).unwrap();
    let sum = builder.add(product, ones).unwrap();
    let graph = builder.build(&[("product", product), ("sum", sum)]).unwrap();

    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0; 4]));
    let mut product_buffer = [0.0f32; 4];
    let mut sum_buffer = [0.0f32; 4];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("product", OutputBinding::f32(&mut product_buffer));
    outputs.insert("sum", OutputBinding::f32(&mut sum_buffer));
    graph.compute(&inputs, &mut outputs).unwrap();

    assert_eq!(product_buffer, [2.0; 4]);
    assert_eq!(sum_buffer, [3.0; 4]);
    graph.dispose();
}

/// matmul declared as `[?, 2] x [2, ?]`, bound per call as `[3, 2] x
/// [2, 4]` with all-ones buffers, yields a 3x4 of 2s.
pub fn matmul_resolves_dynamic_dimensions<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let mut builder = GraphBuilder::new(Arc::clone(backend));
    let a = builder
        .input(
            "a",
            TensorDescriptor::new(DType::F32, vec![Dimension::Dynamic, Dimension::Fixed(2)]),
        )
        .unwrap();
    let b = builder
        .input(
            "b",
            TensorDescriptor::new(DType::F32, vec![Dimension::Fixed(2), Dimension::Dynamic]),
        )
        .unwrap();
    let product = builder.matmul(a, b).unwrap();
    let graph = builder.build(&[("product", product)]).unwrap();

    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0; 6]).with_dimensions([3, 2]));
    inputs.insert("b", InputBinding::f32(&[1.0; 8]).with_dimensions([2, 4]));
    let mut buffer = [0.0f32; 12];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("product", OutputBinding::f32(&mut buffer));
    graph.compute(&inputs, &mut outputs).unwrap();

    assert_eq!(buffer, [2.0; 12]);
    graph.dispose();
}

/// Transposing a 1x2x2x1 tensor `[1, 2, 3, 4]` with permutation
/// `[0, 2, 1, 3]` yields `[1, 3, 2, 4]`.
pub fn transpose_moves_elements<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let mut builder = GraphBuilder::new(Arc::clone(backend));
    let x = builder
        .input("x", TensorDescriptor::fixed(DType::F32, &[1, 2, 2, 1]))
        .unwrap();
    let transposed = builder.transpose(x, vec![0, 2, 1, 3]).unwrap();
    let graph = builder.build(&[("y", transposed)]).unwrap();

    let mut inputs = ComputeInputs::new();
    inputs.insert("x", InputBinding::f32(&[1.0, 2.0, 3.0, 4.0]));
    let mut buffer = [0.0f32; 4];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("y", OutputBinding::f32(&mut buffer));
    graph.compute(&inputs, &mut outputs).unwrap();

    assert_eq!(buffer, [1.0, 3.0, 2.0, 4.0]);
    graph.dispose();
}

/// A call may request any subset of the declared outputs; exactly the
/// requested buffers are written, and only the ancestor nodes of the
/// request are dispatched.
pub fn subset_outputs_return_only_requested<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let backend = Arc::new(CountingBackend::new(Arc::clone(backend)));
    let mut builder = GraphBuilder::new(Arc::clone(&backend));
    let a = builder
        .input("a", TensorDescriptor::fixed(DType::F32, &[2]))
        .unwrap();
    let two = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &[2.0; 2])
        .unwrap();
    let doubled = builder.mul(a, two).unwrap();
    let shifted = builder.add(a, two).unwrap();
    let graph = builder
        .build(&[("doubled", doubled), ("shifted", shifted)])
        .unwrap();

    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[3.0, 4.0]));
    let mut doubled_buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("doubled", OutputBinding::f32(&mut doubled_buffer));
    graph.compute(&inputs, &mut outputs).unwrap();
    assert_eq!(doubled_buffer, [6.0, 8.0]);
    assert_eq!(
        backend.kernel_dispatches(),
        1,
        "the add feeding only 'shifted' must not run"
    );

    let mut shifted_buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("shifted", OutputBinding::f32(&mut shifted_buffer));
    graph.compute(&inputs, &mut outputs).unwrap();
    assert_eq!(shifted_buffer, [5.0, 6.0]);
    assert_eq!(backend.kernel_dispatches(), 2);
    graph.dispose();
}

/// Results are value copies; a later call with different buffers never
/// reaches back into the buffers of an earlier one.
pub fn repeated_calls_do_not_alias<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let mut builder = GraphBuilder::new(Arc::clone(backend));
    let a = builder
        .input("a", TensorDescriptor::fixed(DType::F32, &[2]))
        .unwrap();
    let one = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &[1.0; 2])
        .unwrap();
    let incremented = builder.add(a, one).unwrap();
    let graph = builder.build(&[("out", incremented)]).unwrap();

    let mut first = [0.0f32; 2];
    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0, 2.0]));
    let mut outputs = ComputeOutputs::new();
    outputs.insert("out", OutputBinding::f32(&mut first));
    graph.compute(&inputs, &mut outputs).unwrap();
    assert_eq!(first, [2.0, 3.0]);

    let mut second = [0.0f32; 2];
    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[10.0, 20.0]));
    let mut outputs = ComputeOutputs::new();
    outputs.insert("out", OutputBinding::f32(&mut second));
    graph.compute(&inputs, &mut outputs).unwrap();

    assert_eq!(second, [11.0, 21.0]);
    assert_eq!(first, [2.0, 3.0], "first call's buffer must be untouched");
    graph.dispose();
}

/// The unrolled GRU reproduces the reference values of the 2-step fixture.
pub fn gru_matches_reference_values<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let (builder, gru_outputs) = gru_fixture(backend, false);
    let graph = builder.build(&[("hidden", gru_outputs[0])]).unwrap();

    let input = gru_input_values();
    let mut inputs = ComputeInputs::new();
    inputs.insert("x", InputBinding::f32(&input));
    let mut hidden = [0.0f32; 15];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("hidden", OutputBinding::f32(&mut hidden));
    graph.compute(&inputs, &mut outputs).unwrap();

    assert_close(&hidden, &gru_expected_hidden(), 1e-5);
    graph.dispose();
}

/// With `return_sequence`, the second output stacks every step's hidden
/// state as `[steps, 1, batch, hidden]`.
pub fn gru_returns_step_sequence<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let (builder, gru_outputs) = gru_fixture(backend, true);
    assert_eq!(gru_outputs.len(), 2);
    let graph = builder
        .build(&[("hidden", gru_outputs[0]), ("sequence", gru_outputs[1])])
        .unwrap();
    assert_eq!(
        graph
            .output_descriptor("sequence")
            .unwrap()
            .shape
            .static_dims(),
        Some(vec![2, 1, 3, 5])
    );

    let input = gru_input_values();
    let mut inputs = ComputeInputs::new();
    inputs.insert("x", InputBinding::f32(&input));
    let mut hidden = [0.0f32; 15];
    let mut sequence = [0.0f32; 30];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("hidden", OutputBinding::f32(&mut hidden));
    outputs.insert("sequence", OutputBinding::f32(&mut sequence));
    graph.compute(&inputs, &mut outputs).unwrap();

    assert_close(&sequence[..15], &gru_expected_first_step(), 1e-5);
    assert_close(&sequence[15..], &gru_expected_hidden(), 1e-5);
    assert_close(&hidden, &sequence[15..], 1e-6);
    graph.dispose();
}
