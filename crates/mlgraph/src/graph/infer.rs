//! Shape-inference rules for the operation catalog.
//!
//! The builder calls [`infer`] with declared descriptors, where axes may be
//! [`Dimension::Dynamic`]: a rule defers any result axis it cannot pin down
//! and errors only on conflicts that are provable from fixed extents. The
//! executor calls the same rules again with every axis resolved, so a
//! conflict that hid behind a dynamic axis surfaces there before any kernel
//! runs. Errors are plain detail strings; callers wrap them in the
//! construction or execution error taxonomy.

use crate::graph::operation::{ConcatSpec, Operation, ReshapeDim, ReshapeSpec, SplitSpec, TransposeSpec};
use crate::tensor::{DType, Dimension, TensorDescriptor};

/// Applies `operation`'s shape rule to the given input descriptors,
/// producing one descriptor per output.
pub(crate) fn infer(
    operation: &Operation,
    inputs: &[TensorDescriptor],
) -> Result<Vec<TensorDescriptor>, String> {
    match operation {
        Operation::Binary(_) => {
            expect_arity(inputs, 2)?;
            let dtype = same_dtype(inputs)?;
            let dims = broadcast_shapes(inputs[0].shape.dims(), inputs[1].shape.dims())?;
            Ok(vec![TensorDescriptor::new(dtype, dims)])
        }
        Operation::Unary(_) => {
            expect_arity(inputs, 1)?;
            Ok(vec![inputs[0].clone()])
        }
        Operation::MatMul => {
            expect_arity(inputs, 2)?;
            infer_matmul(&inputs[0], &inputs[1])
        }
        Operation::Transpose(spec) => {
            expect_arity(inputs, 1)?;
            infer_transpose(&inputs[0], spec)
        }
        Operation::Reshape(spec) => {
            expect_arity(inputs, 1)?;
            infer_reshape(&inputs[0], spec)
        }
        Operation::Split(spec) => {
            expect_arity(inputs, 1)?;
            infer_split(&inputs[0], spec)
        }
        Operation::Concat(spec) => infer_concat(inputs, spec),
    }
}

fn expect_arity(inputs: &[TensorDescriptor], expected: usize) -> Result<(), String> {
    if inputs.len() != expected {
        return Err(format!(
            "expects {expected} inputs, got {}",
            inputs.len()
        ));
    }
    Ok(())
}

fn same_dtype(inputs: &[TensorDescriptor]) -> Result<DType, String> {
    let first = inputs[0].dtype;
    for input in &inputs[1..] {
        if input.dtype != first {
            return Err(format!("dtype mismatch: {} vs {}", first, input.dtype));
        }
    }
    Ok(first)
}

/// Broadcasts one axis pair. Any dynamic participant defers the result
/// axis; fixed extents must be equal or one of them 1.
fn broadcast_dim(a: Dimension, b: Dimension) -> Result<Dimension, String> {
    match (a, b) {
        (Dimension::Fixed(x), Dimension::Fixed(y)) => {
            if x == y {
                Ok(Dimension::Fixed(x))
            } else if x == 1 {
                Ok(Dimension::Fixed(y))
            } else if y == 1 {
                Ok(Dimension::Fixed(x))
            } else {
                Err(format!("extents {x} and {y} do not broadcast"))
            }
        }
        _ => Ok(Dimension::Dynamic),
    }
}

fn dim_from_right(dims: &[Dimension], offset: usize) -> Dimension {
    if offset < dims.len() {
        dims[dims.len() - 1 - offset]
    } else {
        Dimension::Fixed(1)
    }
}

fn broadcast_shapes(a: &[Dimension], b: &[Dimension]) -> Result<Vec<Dimension>, String> {
    let rank = a.len().max(b.len());
    let mut dims = vec![Dimension::Fixed(1); rank];
    for offset in 0..rank {
        let merged = broadcast_dim(dim_from_right(a, offset), dim_from_right(b, offset))
            .map_err(|detail| format!("axis {}: {detail}", rank - 1 - offset))?;
        dims[rank - 1 - offset] = merged;
    }
    Ok(dims)
}

fn infer_matmul(
    a: &TensorDescriptor,
    b: &TensorDescriptor,
) -> Result<Vec<TensorDescriptor>, String> {
    if a.dtype != b.dtype {
        return Err(format!("dtype mismatch: {} vs {}", a.dtype, b.dtype));
    }
    let dtype = a.dtype;
    let a_dims = a.shape.dims();
    let b_dims = b.shape.dims();
    if a_dims.len() < 2 || b_dims.len() < 2 {
        return Err(format!(
            "operands must have rank >= 2, got {} and {}",
            a_dims.len(),
            b_dims.len()
        ));
    }
    let rows = a_dims[a_dims.len() - 2];
    let inner_a = a_dims[a_dims.len() - 1];
    let inner_b = b_dims[b_dims.len() - 2];
    let cols = b_dims[b_dims.len() - 1];
    if let (Some(x), Some(y)) = (inner_a.fixed(), inner_b.fixed()) {
        if x != y {
            return Err(format!("inner extents {x} and {y} differ"));
        }
    }
    let mut dims = broadcast_shapes(
        &a_dims[..a_dims.len() - 2],
        &b_dims[..b_dims.len() - 2],
    )
    .map_err(|detail| format!("batch {detail}"))?;
    dims.push(rows);
    dims.push(cols);
    Ok(vec![TensorDescriptor::new(dtype, dims)])
}

fn infer_transpose(
    input: &TensorDescriptor,
    spec: &TransposeSpec,
) -> Result<Vec<TensorDescriptor>, String> {
    let rank = input.shape.rank();
    if spec.perm.len() != rank {
        return Err(format!(
            "permutation length {} does not match rank {rank}",
            spec.perm.len()
        ));
    }
    let mut seen = vec![false; rank];
    for &axis in &spec.perm {
        if axis >= rank || seen[axis] {
            return Err(format!("{:?} is not a permutation of 0..{rank}", spec.perm));
        }
        seen[axis] = true;
    }
    let in_dims = input.shape.dims();
    let dims = spec.perm.iter().map(|&axis| in_dims[axis]).collect();
    Ok(vec![TensorDescriptor::new(input.dtype, dims)])
}

fn infer_reshape(
    input: &TensorDescriptor,
    spec: &ReshapeSpec,
) -> Result<Vec<TensorDescriptor>, String> {
    let inferred_axes = spec
        .dims
        .iter()
        .filter(|dim| matches!(dim, ReshapeDim::Infer))
        .count();
    if inferred_axes > 1 {
        return Err("at most one target axis may be inferred".to_string());
    }
    let mut fixed_product = 1usize;
    for dim in &spec.dims {
        if let ReshapeDim::Fixed(extent) = dim {
            fixed_product = fixed_product
                .checked_mul(*extent)
                .ok_or_else(|| "target element count overflows".to_string())?;
        }
    }
    let dims = match input.shape.element_count() {
        Some(total) => {
            if inferred_axes == 1 {
                if fixed_product == 0 {
                    return Err("cannot infer an axis alongside zero-sized axes".to_string());
                }
                if total % fixed_product != 0 {
                    return Err(format!(
                        "element count {total} is not divisible by the fixed target axes ({fixed_product})"
                    ));
                }
                let inferred = total / fixed_product;
                spec.dims
                    .iter()
                    .map(|dim| match dim {
                        ReshapeDim::Fixed(extent) => Dimension::Fixed(*extent),
                        ReshapeDim::Infer => Dimension::Fixed(inferred),
                    })
                    .collect()
            } else {
                if fixed_product != total {
                    return Err(format!(
                        "target holds {fixed_product} elements, input holds {total}"
                    ));
                }
                spec.dims
                    .iter()
                    .map(|dim| match dim {
                        ReshapeDim::Fixed(extent) => Dimension::Fixed(*extent),
                        ReshapeDim::Infer => unreachable!("no inferred axes in this branch"),
                    })
                    .collect()
            }
        }
        // Input element count unknown until compute time: explicit axes
        // stand, the inferred axis stays open.
        None => spec
            .dims
            .iter()
            .map(|dim| match dim {
                ReshapeDim::Fixed(extent) => Dimension::Fixed(*extent),
                ReshapeDim::Infer => Dimension::Dynamic,
            })
            .collect(),
    };
    Ok(vec![TensorDescriptor::new(input.dtype, dims)])
}

fn infer_split(
    input: &TensorDescriptor,
    spec: &SplitSpec,
) -> Result<Vec<TensorDescriptor>, String> {
    if spec.parts == 0 {
        return Err("parts must be positive".to_string());
    }
    let rank = input.shape.rank();
    if spec.axis >= rank {
        return Err(format!("axis {} out of range for rank {rank}", spec.axis));
    }
    let part = match input.shape.dims()[spec.axis] {
        Dimension::Fixed(extent) => {
            if extent % spec.parts != 0 {
                return Err(format!(
                    "axis extent {extent} does not divide into {} parts",
                    spec.parts
                ));
            }
            Dimension::Fixed(extent / spec.parts)
        }
        Dimension::Dynamic => Dimension::Dynamic,
    };
    let mut outputs = Vec::with_capacity(spec.parts);
    for _ in 0..spec.parts {
        let mut dims = input.shape.dims().to_vec();
        dims[spec.axis] = part;
        outputs.push(TensorDescriptor::new(input.dtype, dims));
    }
    Ok(outputs)
}

fn infer_concat(
    inputs: &[TensorDescriptor],
    spec: &ConcatSpec,
) -> Result<Vec<TensorDescriptor>, String> {
    if inputs.is_empty() {
        return Err("expects at least one input".to_string());
    }
    let dtype = same_dtype(inputs)?;
    let rank = inputs[0].shape.rank();
    for input in &inputs[1..] {
        if input.shape.rank() != rank {
            return Err(format!(
                "rank mismatch: {} vs {rank}",
                input.shape.rank()
            ));
        }
    }
    if spec.axis >= rank {
        return Err(format!("axis {} out of range for rank {rank}", spec.axis));
    }
    let mut dims: Vec<Dimension> = inputs[0].shape.dims().to_vec();
    for input in &inputs[1..] {
        for (axis, dim) in input.shape.dims().iter().enumerate() {
            if axis == spec.axis {
                continue;
            }
            dims[axis] = match (dims[axis], *dim) {
                (Dimension::Fixed(x), Dimension::Fixed(y)) => {
                    if x != y {
                        return Err(format!("axis {axis}: extents {x} and {y} differ"));
                    }
                    Dimension::Fixed(x)
                }
                _ => Dimension::Dynamic,
            };
        }
    }
    let mut total = Some(0usize);
    for input in inputs {
        total = match (total, input.shape.dims()[spec.axis]) {
            (Some(sum), Dimension::Fixed(extent)) => sum.checked_add(extent),
            _ => None,
        };
    }
    dims[spec.axis] = match total {
        Some(sum) => Dimension::Fixed(sum),
        None => Dimension::Dynamic,
    };
    Ok(vec![TensorDescriptor::new(dtype, dims)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::operation::BinaryOp;

    fn f32_desc(dims: &[usize]) -> TensorDescriptor {
        TensorDescriptor::fixed(DType::F32, dims)
    }

    fn dyn_desc(dims: &[Option<usize>]) -> TensorDescriptor {
        TensorDescriptor::new(
            DType::F32,
            dims.iter()
                .map(|dim| match dim {
                    Some(extent) => Dimension::Fixed(*extent),
                    None => Dimension::Dynamic,
                })
                .collect(),
        )
    }

    #[test]
    fn binary_broadcasts_and_rejects_conflicts() {
        let out = infer(
            &Operation::Binary(BinaryOp::Add),
            &[f32_desc(&[2, 3, 4]), f32_desc(&[3, 1])],
        )
        .unwrap();
        assert_eq!(out[0].shape.static_dims(), Some(vec![2, 3, 4]));

        let err = infer(
            &Operation::Binary(BinaryOp::Add),
            &[f32_desc(&[2, 3]), f32_desc(&[2, 4])],
        )
        .unwrap_err();
        assert!(err.contains("do not broadcast"), "{err}");
    }

    #[test]
    fn binary_defers_dynamic_axes() {
        let out = infer(
            &Operation::Binary(BinaryOp::Mul),
            &[dyn_desc(&[None, Some(2)]), f32_desc(&[3, 2])],
        )
        .unwrap();
        assert_eq!(
            out[0].shape.dims(),
            &[Dimension::Dynamic, Dimension::Fixed(2)]
        );
    }

    #[test]
    fn matmul_checks_fixed_inner_extents_only() {
        let err = infer(&Operation::MatMul, &[f32_desc(&[2, 3]), f32_desc(&[4, 5])]).unwrap_err();
        assert!(err.contains("inner extents"), "{err}");

        let out = infer(
            &Operation::MatMul,
            &[dyn_desc(&[None, Some(2)]), dyn_desc(&[Some(2), None])],
        )
        .unwrap();
        assert_eq!(
            out[0].shape.dims(),
            &[Dimension::Dynamic, Dimension::Dynamic]
        );
    }

    #[test]
    fn matmul_broadcasts_batch_axes() {
        let out = infer(
            &Operation::MatMul,
            &[f32_desc(&[7, 1, 2, 3]), f32_desc(&[4, 3, 5])],
        )
        .unwrap();
        assert_eq!(out[0].shape.static_dims(), Some(vec![7, 4, 2, 5]));
    }

    #[test]
    fn transpose_requires_a_permutation() {
        let spec = Operation::Transpose(TransposeSpec { perm: vec![0, 0, 1] });
        let err = infer(&spec, &[f32_desc(&[1, 2, 3])]).unwrap_err();
        assert!(err.contains("not a permutation"), "{err}");

        let spec = Operation::Transpose(TransposeSpec {
            perm: vec![0, 2, 1, 3],
        });
        let out = infer(&spec, &[f32_desc(&[1, 2, 4, 1])]).unwrap();
        assert_eq!(out[0].shape.static_dims(), Some(vec![1, 4, 2, 1]));
    }

    #[test]
    fn reshape_infers_the_open_axis() {
        let spec = Operation::Reshape(ReshapeSpec {
            dims: vec![ReshapeDim::Infer, ReshapeDim::Fixed(3)],
        });
        let out = infer(&spec, &[f32_desc(&[2, 6])]).unwrap();
        assert_eq!(out[0].shape.static_dims(), Some(vec![4, 3]));

        let err = infer(&spec, &[f32_desc(&[2, 5])]).unwrap_err();
        assert!(err.contains("not divisible"), "{err}");
    }

    #[test]
    fn reshape_defers_inference_for_dynamic_inputs() {
        let spec = Operation::Reshape(ReshapeSpec {
            dims: vec![ReshapeDim::Infer, ReshapeDim::Fixed(3)],
        });
        let out = infer(&spec, &[dyn_desc(&[None, Some(3)])]).unwrap();
        assert_eq!(
            out[0].shape.dims(),
            &[Dimension::Dynamic, Dimension::Fixed(3)]
        );
    }

    #[test]
    fn split_requires_even_partitions() {
        let spec = Operation::Split(SplitSpec { axis: 1, parts: 3 });
        let out = infer(&spec, &[f32_desc(&[2, 15, 4])]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].shape.static_dims(), Some(vec![2, 5, 4]));

        let err = infer(&spec, &[f32_desc(&[2, 16, 4])]).unwrap_err();
        assert!(err.contains("does not divide"), "{err}");
    }

    #[test]
    fn concat_sums_the_axis_and_checks_the_rest() {
        let spec = Operation::Concat(ConcatSpec { axis: 0 });
        let out = infer(&spec, &[f32_desc(&[2, 4]), f32_desc(&[3, 4])]).unwrap();
        assert_eq!(out[0].shape.static_dims(), Some(vec![5, 4]));

        let err = infer(&spec, &[f32_desc(&[2, 4]), f32_desc(&[3, 5])]).unwrap_err();
        assert!(err.contains("extents 4 and 5 differ"), "{err}");
    }

    #[test]
    fn dtype_mixing_is_rejected() {
        let err = infer(
            &Operation::Binary(BinaryOp::Add),
            &[
                f32_desc(&[2]),
                TensorDescriptor::fixed(DType::I32, &[2]),
            ],
        )
        .unwrap_err();
        assert!(err.contains("dtype mismatch"), "{err}");
    }
}
