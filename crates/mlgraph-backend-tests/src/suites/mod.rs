//! Generic conformance suites, one module per concern.

pub mod compute;
pub mod resources;
pub mod validation;

use std::sync::Arc;

use mlgraph::{DType, GraphBuilder, GruOptions, KernelBackend, Operand, TensorDescriptor};

pub(crate) fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "value count mismatch: {} vs {}",
        actual.len(),
        expected.len()
    );
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {index}: {a} differs from {e} by more than {tolerance}"
        );
    }
}

/// The shared GRU fixture: 2 steps, batch 3, input size 3, hidden size 5,
/// every weight 0.1, input bias 0.1, recurrent bias 0, input declared as a
/// graph input named `"x"`. Returns the builder and the gru outputs.
pub(crate) fn gru_fixture<B: KernelBackend + 'static>(
    backend: &Arc<B>,
    return_sequence: bool,
) -> (GraphBuilder<B>, Vec<Operand>) {
    let mut builder = GraphBuilder::new(Arc::clone(backend));
    let x = builder
        .input("x", TensorDescriptor::fixed(DType::F32, &[2, 3, 3]))
        .unwrap();
    let weight = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[1, 15, 3]), &[0.1; 45])
        .unwrap();
    let recurrent = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[1, 15, 5]), &[0.1; 75])
        .unwrap();
    let bias = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[1, 15]), &[0.1; 15])
        .unwrap();
    let recurrent_bias = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[1, 15]), &[0.0; 15])
        .unwrap();
    let outputs = builder
        .gru(
            x,
            weight,
            recurrent,
            2,
            5,
            GruOptions {
                bias: Some(bias),
                recurrent_bias: Some(recurrent_bias),
                return_sequence,
                ..GruOptions::default()
            },
        )
        .unwrap();
    (builder, outputs)
}

pub(crate) fn gru_input_values() -> Vec<f32> {
    (1..=18).map(|v| v as f32).collect()
}

/// Final hidden state of the fixture: one value per batch row, broadcast
/// across the five hidden units.
pub(crate) fn gru_expected_hidden() -> Vec<f32> {
    let rows = [0.22391089f32, 0.1653014, 0.07973271];
    rows.iter().flat_map(|&v| [v; 5]).collect()
}

/// Hidden state after the first of the two steps.
pub(crate) fn gru_expected_first_step() -> Vec<f32> {
    let rows = [0.20053662f32, 0.15482337, 0.07484277];
    rows.iter().flat_map(|&v| [v; 5]).collect()
}
