//! The zero-leak contract: after disposal, backend allocation accounting
//! returns exactly to its pre-build baseline.

use std::sync::Arc;

use mlgraph::{ComputeInputs, ComputeOutputs, InputBinding, KernelBackend, OutputBinding};

use super::{gru_fixture, gru_input_values};

pub fn dispose_restores_baseline<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let baseline = backend.memory();

    let (builder, gru_outputs) = gru_fixture(backend, true);
    let graph = builder
        .build(&[("hidden", gru_outputs[0]), ("sequence", gru_outputs[1])])
        .unwrap();
    let after_build = backend.memory();
    assert!(
        after_build.tensors > baseline.tensors,
        "constants should be live after build"
    );

    let input = gru_input_values();
    let mut inputs = ComputeInputs::new();
    inputs.insert("x", InputBinding::f32(&input));
    let mut hidden = [0.0f32; 15];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("hidden", OutputBinding::f32(&mut hidden));
    graph.compute(&inputs, &mut outputs).unwrap();
    assert_eq!(
        backend.memory(),
        after_build,
        "intermediates must be released by the end of the call"
    );

    graph.dispose();
    assert_eq!(backend.memory(), baseline, "dispose must restore the baseline");
}

pub fn drop_releases_like_dispose<B: KernelBackend + 'static>(backend: &Arc<B>) {
    let baseline = backend.memory();
    {
        let (builder, gru_outputs) = gru_fixture(backend, false);
        let _graph = builder.build(&[("hidden", gru_outputs[0])]).unwrap();
        assert!(backend.memory().tensors > baseline.tensors);
    }
    assert_eq!(backend.memory(), baseline);
}
