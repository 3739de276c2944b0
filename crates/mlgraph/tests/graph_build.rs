use std::sync::Arc;

use anyhow::Result;
use mlgraph::graph::{GraphManifest, ReshapeDim};
use mlgraph::tensor::Dimension;
use mlgraph::{
    ComputeInputs, ComputeOutputs, DType, GraphBuilder, GraphError, InputBinding, OutputBinding,
    TensorDescriptor,
};
use mlgraph_backend_ref_cpu::CpuBackend;

fn builder() -> GraphBuilder<CpuBackend> {
    GraphBuilder::new(Arc::new(CpuBackend::new()))
}

#[test]
fn duplicate_input_names_are_rejected() -> Result<()> {
    let mut builder = builder();
    builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let err = builder
        .input("a", TensorDescriptor::fixed(DType::F32, &[3]))
        .unwrap_err();
    assert!(matches!(err, GraphError::DuplicateName { .. }), "{err}");
    Ok(())
}

#[test]
fn constants_require_static_shapes_and_exact_byte_lengths() {
    let mut builder = builder();
    let dynamic = TensorDescriptor::new(DType::F32, vec![Dimension::Dynamic]);
    let err = builder.constant(dynamic, &[0u8; 4]).unwrap_err();
    assert!(matches!(err, GraphError::ShapeMismatch { .. }), "{err}");

    let err = builder
        .constant_f32(TensorDescriptor::fixed(DType::F32, &[2, 2]), &[0.0; 3])
        .unwrap_err();
    assert!(matches!(err, GraphError::ShapeMismatch { .. }), "{err}");
}

#[test]
fn matmul_fails_fast_on_fixed_conflicts_and_defers_dynamic_ones() -> Result<()> {
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2, 3]))?;
    let b = builder.input("b", TensorDescriptor::fixed(DType::F32, &[4, 5]))?;
    let err = builder.matmul(a, b).unwrap_err();
    assert!(matches!(err, GraphError::IncompatibleShape { .. }), "{err}");

    let c = builder.input(
        "c",
        TensorDescriptor::new(DType::F32, vec![Dimension::Dynamic, Dimension::Dynamic]),
    )?;
    // The inner extent is unknown, so construction defers to compute time.
    let deferred = builder.matmul(a, c)?;
    let descriptor = builder.descriptor(deferred)?;
    assert_eq!(
        descriptor.shape.dims(),
        &[Dimension::Fixed(2), Dimension::Dynamic]
    );
    Ok(())
}

#[test]
fn transpose_rejects_non_permutations() -> Result<()> {
    let mut builder = builder();
    let x = builder.input("x", TensorDescriptor::fixed(DType::F32, &[2, 3]))?;
    let err = builder.transpose(x, vec![0, 0]).unwrap_err();
    assert!(matches!(err, GraphError::IncompatibleShape { .. }), "{err}");
    let err = builder.transpose(x, vec![0]).unwrap_err();
    assert!(matches!(err, GraphError::IncompatibleShape { .. }), "{err}");
    Ok(())
}

#[test]
fn operands_are_rejected_outside_their_builder() -> Result<()> {
    let mut first = builder();
    let foreign = first.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;

    let mut second = builder();
    let local = second.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let err = second.add(local, foreign).unwrap_err();
    assert!(matches!(err, GraphError::UnknownOperand { .. }), "{err}");

    let err = second.build(&[("out", foreign)]).unwrap_err();
    assert!(matches!(err, GraphError::UnknownOperand { .. }), "{err}");
    Ok(())
}

#[test]
fn build_validates_the_output_set() -> Result<()> {
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let sum = builder.add(a, a)?;

    let err = builder.build(&[]).unwrap_err();
    assert!(matches!(err, GraphError::NoOutputs), "{err}");

    let err = builder.build(&[("out", a), ("out", sum)]).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateName { .. }), "{err}");
    Ok(())
}

#[test]
fn builder_mutation_never_reaches_a_compiled_graph() -> Result<()> {
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let one = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &[1.0; 2])?;
    let sum = builder.add(a, one)?;
    let graph = builder.build(&[("out", sum)])?;
    let nodes_before = graph.node_count();

    // Keep building in the same session; the compiled graph must not see
    // any of it.
    let ten = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &[10.0; 2])?;
    let _ = builder.add(sum, ten)?;
    assert_eq!(graph.node_count(), nodes_before);

    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[1.0, 2.0]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("out", OutputBinding::f32(&mut buffer));
    graph.compute(&inputs, &mut outputs)?;
    assert_eq!(buffer, [2.0, 3.0]);
    Ok(())
}

#[test]
fn constant_buffers_are_copied_at_creation() -> Result<()> {
    let mut source = vec![1.0f32, 2.0];
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let constant = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &source)?;
    let sum = builder.add(a, constant)?;
    let graph = builder.build(&[("out", sum)])?;

    // Mutating the source after the snapshot has zero effect.
    source[0] = 100.0;
    source[1] = 200.0;

    let mut inputs = ComputeInputs::new();
    inputs.insert("a", InputBinding::f32(&[0.0, 0.0]));
    let mut buffer = [0.0f32; 2];
    let mut outputs = ComputeOutputs::new();
    outputs.insert("out", OutputBinding::f32(&mut buffer));
    graph.compute(&inputs, &mut outputs)?;
    assert_eq!(buffer, [1.0, 2.0]);
    Ok(())
}

#[test]
fn a_second_build_with_a_new_constant_sees_the_new_values() -> Result<()> {
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let ones = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &[1.0; 2])?;
    let first_sum = builder.add(a, ones)?;
    let first = builder.build(&[("out", first_sum)])?;

    let threes = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2]), &[3.0; 2])?;
    let second_sum = builder.add(a, threes)?;
    let second = builder.build(&[("out", second_sum)])?;

    let compute = |graph: &mlgraph::Graph<CpuBackend>| -> Result<[f32; 2]> {
        let mut inputs = ComputeInputs::new();
        inputs.insert("a", InputBinding::f32(&[10.0, 20.0]));
        let mut buffer = [0.0f32; 2];
        let mut outputs = ComputeOutputs::new();
        outputs.insert("out", OutputBinding::f32(&mut buffer));
        graph.compute(&inputs, &mut outputs)?;
        Ok(buffer)
    };

    assert_eq!(compute(&second)?, [13.0, 23.0]);
    // The earlier graph keeps its own snapshot of the pool.
    assert_eq!(compute(&first)?, [11.0, 21.0]);
    Ok(())
}

#[test]
fn only_the_reachable_subgraph_is_compiled() -> Result<()> {
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let b = builder.input("b", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let sum = builder.add(a, a)?;
    let _unused = builder.mul(b, b)?;
    let graph = builder.build(&[("out", sum)])?;

    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.input_names().collect::<Vec<_>>(), vec!["a"]);
    Ok(())
}

#[test]
fn reshape_infers_axes_where_statically_possible() -> Result<()> {
    let mut builder = builder();
    let x = builder.input("x", TensorDescriptor::fixed(DType::F32, &[2, 6]))?;
    let reshaped = builder.reshape(x, vec![ReshapeDim::Fixed(3), ReshapeDim::Infer])?;
    assert_eq!(
        builder.descriptor(reshaped)?.shape.static_dims(),
        Some(vec![3, 4])
    );

    let err = builder
        .reshape(x, vec![ReshapeDim::Infer, ReshapeDim::Infer])
        .unwrap_err();
    assert!(matches!(err, GraphError::IncompatibleShape { .. }), "{err}");
    Ok(())
}

#[test]
fn manifests_round_trip_through_json_and_bincode() -> Result<()> {
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2, 2]))?;
    let ones = builder.constant_f32(TensorDescriptor::fixed(DType::F32, &[2, 2]), &[1.0; 4])?;
    let product = builder.matmul(a, ones)?;
    let graph = builder.build(&[("product", product)])?;

    let manifest = graph.manifest();
    assert_eq!(manifest.nodes.len(), 1);
    assert_eq!(manifest.constants.len(), 1);
    assert_eq!(manifest.constants[0].byte_len, 16);

    let json = manifest.to_json_string()?;
    assert_eq!(GraphManifest::from_json_str(&json)?, manifest);

    let bytes = manifest.to_bincode_bytes()?;
    assert_eq!(GraphManifest::from_bincode_slice(&bytes)?, manifest);
    Ok(())
}

#[test]
fn timing_counters_reset_on_take() -> Result<()> {
    let mut builder = builder();
    let a = builder.input("a", TensorDescriptor::fixed(DType::F32, &[2]))?;
    let sum = builder.add(a, a)?;
    let _graph = builder.build(&[("out", sum)])?;

    let _ = mlgraph::graph::timing::take_build_time();
    assert_eq!(
        mlgraph::graph::timing::take_build_time(),
        std::time::Duration::ZERO
    );
    Ok(())
}
