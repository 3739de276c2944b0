use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mlgraph::backend::{BackendError, BackendResult, KernelBackend, MemoryReport};
use mlgraph::graph::{BinaryOp, ConcatSpec, Operation, SplitSpec, TransposeSpec, UnaryOp};
use mlgraph::tensor::{
    bytes_to_f32, bytes_to_i32, f32_to_bytes, i32_to_bytes, DType, TensorDescriptor, TensorLiteral,
};

#[derive(Debug, Default)]
struct MemoryCounters {
    tensors: AtomicUsize,
    bytes: AtomicUsize,
}

/// Ties one allocation to the backend counters for its whole lifetime.
/// Cloning a handle shares the guard, so a tensor is counted once no matter
/// how many slots reference it.
#[derive(Debug)]
struct AllocationGuard {
    counters: Arc<MemoryCounters>,
    bytes: usize,
}

impl AllocationGuard {
    fn new(counters: Arc<MemoryCounters>, bytes: usize) -> Self {
        counters.tensors.fetch_add(1, Ordering::SeqCst);
        counters.bytes.fetch_add(bytes, Ordering::SeqCst);
        AllocationGuard { counters, bytes }
    }
}

impl Drop for AllocationGuard {
    fn drop(&mut self) {
        self.counters.tensors.fetch_sub(1, Ordering::SeqCst);
        self.counters.bytes.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

/// Dense element storage of one CPU tensor.
#[derive(Debug)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl TensorData {
    fn byte_len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len() * 4,
            TensorData::I32(values) => values.len() * 4,
        }
    }
}

/// One device tensor of the reference backend. Row-major, contiguous.
#[derive(Debug)]
pub struct CpuTensor {
    descriptor: TensorDescriptor,
    data: TensorData,
    _guard: AllocationGuard,
}

impl CpuTensor {
    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    fn f32_slice(&self) -> BackendResult<&[f32]> {
        match &self.data {
            TensorData::F32(values) => Ok(values),
            TensorData::I32(_) => Err(BackendError::execution("tensor does not hold f32 data")),
        }
    }

    fn i32_slice(&self) -> BackendResult<&[i32]> {
        match &self.data {
            TensorData::I32(values) => Ok(values),
            TensorData::F32(_) => Err(BackendError::execution("tensor does not hold i32 data")),
        }
    }
}

/// Reference CPU backend.
#[derive(Debug)]
pub struct CpuBackend {
    counters: Arc<MemoryCounters>,
}

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend {
            counters: Arc::new(MemoryCounters::default()),
        }
    }

    fn alloc(&self, descriptor: TensorDescriptor, data: TensorData) -> Arc<CpuTensor> {
        let guard = AllocationGuard::new(Arc::clone(&self.counters), data.byte_len());
        Arc::new(CpuTensor {
            descriptor,
            data,
            _guard: guard,
        })
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBackend for CpuBackend {
    type TensorHandle = Arc<CpuTensor>;

    fn backend_name(&self) -> &str {
        "ref-cpu"
    }

    fn materialize(&self, literal: &TensorLiteral) -> BackendResult<Self::TensorHandle> {
        let dims = static_dims(&literal.descriptor)?;
        let count: usize = dims.iter().product();
        let data = match literal.descriptor.dtype {
            DType::F32 => {
                let values = bytes_to_f32(&literal.bytes);
                if values.len() != count {
                    return Err(BackendError::spec_violation(
                        "materialize",
                        format!("{} f32 values for {count} elements", values.len()),
                    ));
                }
                TensorData::F32(values)
            }
            DType::I32 => {
                let values = bytes_to_i32(&literal.bytes);
                if values.len() != count {
                    return Err(BackendError::spec_violation(
                        "materialize",
                        format!("{} i32 values for {count} elements", values.len()),
                    ));
                }
                TensorData::I32(values)
            }
            DType::F16 => {
                return Err(BackendError::unimplemented(
                    "materialize",
                    "f16 tensors are not supported by the reference backend",
                ));
            }
        };
        Ok(self.alloc(literal.descriptor.clone(), data))
    }

    fn run_operation(
        &self,
        operation: &Operation,
        inputs: &[Self::TensorHandle],
        outputs: &[TensorDescriptor],
    ) -> BackendResult<Vec<Self::TensorHandle>> {
        match operation {
            Operation::Binary(op) => Ok(vec![self.op_binary(*op, inputs, expect_one(outputs)?)?]),
            Operation::Unary(op) => Ok(vec![self.op_unary(*op, inputs, expect_one(outputs)?)?]),
            Operation::MatMul => Ok(vec![self.op_matmul(inputs, expect_one(outputs)?)?]),
            Operation::Transpose(spec) => {
                Ok(vec![self.op_transpose(spec, inputs, expect_one(outputs)?)?])
            }
            Operation::Reshape(_) => Ok(vec![self.op_reshape(inputs, expect_one(outputs)?)?]),
            Operation::Split(spec) => self.op_split(spec, inputs, outputs),
            Operation::Concat(spec) => {
                Ok(vec![self.op_concat(spec, inputs, expect_one(outputs)?)?])
            }
        }
    }

    fn to_literal(&self, tensor: &Self::TensorHandle) -> BackendResult<TensorLiteral> {
        let bytes: Arc<[u8]> = match &tensor.data {
            TensorData::F32(values) => Arc::from(f32_to_bytes(values)),
            TensorData::I32(values) => Arc::from(i32_to_bytes(values)),
        };
        Ok(TensorLiteral::new(tensor.descriptor.clone(), bytes))
    }

    fn memory(&self) -> MemoryReport {
        MemoryReport {
            tensors: self.counters.tensors.load(Ordering::SeqCst),
            bytes: self.counters.bytes.load(Ordering::SeqCst),
        }
    }
}

impl CpuBackend {
    fn op_binary(
        &self,
        op: BinaryOp,
        inputs: &[Arc<CpuTensor>],
        output: &TensorDescriptor,
    ) -> BackendResult<Arc<CpuTensor>> {
        let (a, b) = expect_pair(inputs)?;
        let out_dims = static_dims(output)?;
        let a_dims = static_dims(&a.descriptor)?;
        let b_dims = static_dims(&b.descriptor)?;
        match (&a.data, &b.data) {
            (TensorData::F32(lhs), TensorData::F32(rhs)) => {
                let apply = |x: f32, y: f32| -> BackendResult<f32> {
                    Ok(match op {
                        BinaryOp::Add => x + y,
                        BinaryOp::Sub => x - y,
                        BinaryOp::Mul => x * y,
                        BinaryOp::Div => x / y,
                    })
                };
                let result =
                    broadcast_zip(lhs, &a_dims, rhs, &b_dims, &out_dims, apply)?;
                Ok(self.alloc(output.clone(), TensorData::F32(result)))
            }
            (TensorData::I32(lhs), TensorData::I32(rhs)) => {
                let apply = |x: i32, y: i32| -> BackendResult<i32> {
                    Ok(match op {
                        BinaryOp::Add => x.wrapping_add(y),
                        BinaryOp::Sub => x.wrapping_sub(y),
                        BinaryOp::Mul => x.wrapping_mul(y),
                        BinaryOp::Div => {
                            if y == 0 {
                                return Err(BackendError::execution("i32 division by zero"));
                            }
                            x.wrapping_div(y)
                        }
                    })
                };
                let result =
                    broadcast_zip(lhs, &a_dims, rhs, &b_dims, &out_dims, apply)?;
                Ok(self.alloc(output.clone(), TensorData::I32(result)))
            }
            _ => Err(BackendError::spec_violation(
                op.name(),
                "mixed-dtype operands",
            )),
        }
    }

    fn op_unary(
        &self,
        op: UnaryOp,
        inputs: &[Arc<CpuTensor>],
        output: &TensorDescriptor,
    ) -> BackendResult<Arc<CpuTensor>> {
        let input = expect_single(inputs)?;
        let values = match input.f32_slice() {
            Ok(values) => values,
            Err(_) => {
                return Err(BackendError::unimplemented(
                    op.name(),
                    "only f32 tensors are supported",
                ));
            }
        };
        let result: Vec<f32> = match op {
            UnaryOp::Relu => values.iter().map(|&x| x.max(0.0)).collect(),
            UnaryOp::Sigmoid => values.iter().map(|&x| 1.0 / (1.0 + (-x).exp())).collect(),
            UnaryOp::Tanh => values.iter().map(|&x| x.tanh()).collect(),
        };
        Ok(self.alloc(output.clone(), TensorData::F32(result)))
    }

    fn op_matmul(
        &self,
        inputs: &[Arc<CpuTensor>],
        output: &TensorDescriptor,
    ) -> BackendResult<Arc<CpuTensor>> {
        let (a, b) = expect_pair(inputs)?;
        let a_values = a
            .f32_slice()
            .map_err(|_| BackendError::unimplemented("matmul", "only f32 tensors are supported"))?;
        let b_values = b
            .f32_slice()
            .map_err(|_| BackendError::unimplemented("matmul", "only f32 tensors are supported"))?;
        let a_dims = static_dims(&a.descriptor)?;
        let b_dims = static_dims(&b.descriptor)?;
        let out_dims = static_dims(output)?;
        if a_dims.len() < 2 || b_dims.len() < 2 || out_dims.len() < 2 {
            return Err(BackendError::spec_violation("matmul", "rank must be >= 2"));
        }
        let m = a_dims[a_dims.len() - 2];
        let k = a_dims[a_dims.len() - 1];
        let k2 = b_dims[b_dims.len() - 2];
        let n = b_dims[b_dims.len() - 1];
        if k != k2 {
            return Err(BackendError::spec_violation(
                "matmul",
                format!("inner extents {k} and {k2} differ"),
            ));
        }
        let batch_dims = &out_dims[..out_dims.len() - 2];
        let batch_count: usize = batch_dims.iter().product();
        let a_batch = &a_dims[..a_dims.len() - 2];
        let b_batch = &b_dims[..b_dims.len() - 2];
        let mut result = vec![0.0f32; batch_count * m * n];
        for batch in 0..batch_count {
            let coord = unravel_index(batch, batch_dims);
            let a_offset = broadcast_offset(&coord, a_batch) * m * k;
            let b_offset = broadcast_offset(&coord, b_batch) * k * n;
            let out_offset = batch * m * n;
            for row in 0..m {
                for col in 0..n {
                    let mut acc = 0.0f32;
                    for inner in 0..k {
                        acc += a_values[a_offset + row * k + inner]
                            * b_values[b_offset + inner * n + col];
                    }
                    result[out_offset + row * n + col] = acc;
                }
            }
        }
        Ok(self.alloc(output.clone(), TensorData::F32(result)))
    }

    fn op_transpose(
        &self,
        spec: &TransposeSpec,
        inputs: &[Arc<CpuTensor>],
        output: &TensorDescriptor,
    ) -> BackendResult<Arc<CpuTensor>> {
        let input = expect_single(inputs)?;
        let in_dims = static_dims(&input.descriptor)?;
        let out_dims = static_dims(output)?;
        if spec.perm.len() != in_dims.len() {
            return Err(BackendError::spec_violation(
                "transpose",
                "permutation length mismatches rank",
            ));
        }
        let in_strides = compute_strides(&in_dims);
        let gather = |index: usize| {
            let coord = unravel_index(index, &out_dims);
            coord
                .iter()
                .enumerate()
                .map(|(out_axis, &c)| c * in_strides[spec.perm[out_axis]])
                .sum::<usize>()
        };
        let data = match &input.data {
            TensorData::F32(values) => {
                TensorData::F32((0..values.len()).map(|i| values[gather(i)]).collect())
            }
            TensorData::I32(values) => {
                TensorData::I32((0..values.len()).map(|i| values[gather(i)]).collect())
            }
        };
        Ok(self.alloc(output.clone(), data))
    }

    fn op_reshape(
        &self,
        inputs: &[Arc<CpuTensor>],
        output: &TensorDescriptor,
    ) -> BackendResult<Arc<CpuTensor>> {
        let input = expect_single(inputs)?;
        // Row-major reshape keeps the element order; only the descriptor
        // changes.
        let data = match &input.data {
            TensorData::F32(values) => TensorData::F32(values.clone()),
            TensorData::I32(values) => TensorData::I32(values.clone()),
        };
        Ok(self.alloc(output.clone(), data))
    }

    fn op_split(
        &self,
        spec: &SplitSpec,
        inputs: &[Arc<CpuTensor>],
        outputs: &[TensorDescriptor],
    ) -> BackendResult<Vec<Arc<CpuTensor>>> {
        let input = expect_single(inputs)?;
        let dims = static_dims(&input.descriptor)?;
        if spec.axis >= dims.len() || outputs.len() != spec.parts {
            return Err(BackendError::spec_violation("split", "axis or arity mismatch"));
        }
        let extent = dims[spec.axis];
        if extent % spec.parts != 0 {
            return Err(BackendError::spec_violation(
                "split",
                format!("extent {extent} does not divide into {} parts", spec.parts),
            ));
        }
        let part = extent / spec.parts;
        let outer: usize = dims[..spec.axis].iter().product();
        let inner: usize = dims[spec.axis + 1..].iter().product();
        let mut results = Vec::with_capacity(spec.parts);
        for (index, descriptor) in outputs.iter().enumerate() {
            let data = match &input.data {
                TensorData::F32(values) => TensorData::F32(copy_axis_window(
                    values,
                    outer,
                    extent,
                    inner,
                    index * part,
                    part,
                )),
                TensorData::I32(values) => TensorData::I32(copy_axis_window(
                    values,
                    outer,
                    extent,
                    inner,
                    index * part,
                    part,
                )),
            };
            results.push(self.alloc(descriptor.clone(), data));
        }
        Ok(results)
    }

    fn op_concat(
        &self,
        spec: &ConcatSpec,
        inputs: &[Arc<CpuTensor>],
        output: &TensorDescriptor,
    ) -> BackendResult<Arc<CpuTensor>> {
        if inputs.is_empty() {
            return Err(BackendError::spec_violation("concat", "no inputs"));
        }
        let out_dims = static_dims(output)?;
        if spec.axis >= out_dims.len() {
            return Err(BackendError::spec_violation("concat", "axis out of range"));
        }
        let outer: usize = out_dims[..spec.axis].iter().product();
        let inner: usize = out_dims[spec.axis + 1..].iter().product();
        match output.dtype {
            DType::F32 => {
                let mut parts = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let dims = static_dims(&input.descriptor)?;
                    parts.push((input.f32_slice()?, dims[spec.axis]));
                }
                let result = concat_axis_windows(&parts, outer, inner);
                Ok(self.alloc(output.clone(), TensorData::F32(result)))
            }
            DType::I32 => {
                let mut parts = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let dims = static_dims(&input.descriptor)?;
                    parts.push((input.i32_slice()?, dims[spec.axis]));
                }
                let result = concat_axis_windows(&parts, outer, inner);
                Ok(self.alloc(output.clone(), TensorData::I32(result)))
            }
            DType::F16 => Err(BackendError::unimplemented(
                "concat",
                "f16 tensors are not supported by the reference backend",
            )),
        }
    }
}

fn expect_single(inputs: &[Arc<CpuTensor>]) -> BackendResult<&CpuTensor> {
    if inputs.len() != 1 {
        Err(BackendError::execution("operation expects a single input"))
    } else {
        Ok(&inputs[0])
    }
}

fn expect_pair(inputs: &[Arc<CpuTensor>]) -> BackendResult<(&CpuTensor, &CpuTensor)> {
    if inputs.len() != 2 {
        Err(BackendError::execution("operation expects two inputs"))
    } else {
        Ok((&inputs[0], &inputs[1]))
    }
}

fn expect_one(outputs: &[TensorDescriptor]) -> BackendResult<&TensorDescriptor> {
    if outputs.len() != 1 {
        Err(BackendError::execution("operation expects a single output"))
    } else {
        Ok(&outputs[0])
    }
}

/// The engine hands the backend fully resolved descriptors; a dynamic axis
/// reaching a kernel is an engine bug.
fn static_dims(descriptor: &TensorDescriptor) -> BackendResult<Vec<usize>> {
    descriptor.shape.static_dims().ok_or_else(|| {
        BackendError::spec_violation("run_operation", "unresolved dimension at dispatch")
    })
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dims.len()];
    let mut acc = 1usize;
    for (i, dim) in dims.iter().enumerate().rev() {
        strides[i] = acc;
        acc *= *dim;
    }
    strides
}

fn unravel_index(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (i, dim) in dims.iter().enumerate().rev() {
        coords[i] = index % *dim;
        index /= *dim;
    }
    coords
}

/// Flat index of `coord` (a coordinate in the broadcast result space,
/// right-aligned) inside a tensor of `dims`. Size-1 axes absorb any
/// coordinate; missing leading axes are ignored.
fn broadcast_offset(coord: &[usize], dims: &[usize]) -> usize {
    let strides = compute_strides(dims);
    let skip = coord.len() - dims.len();
    dims.iter()
        .enumerate()
        .map(|(axis, &dim)| {
            let c = if dim == 1 { 0 } else { coord[skip + axis] };
            c * strides[axis]
        })
        .sum()
}

fn broadcast_zip<T: Copy>(
    lhs: &[T],
    lhs_dims: &[usize],
    rhs: &[T],
    rhs_dims: &[usize],
    out_dims: &[usize],
    mut apply: impl FnMut(T, T) -> BackendResult<T>,
) -> BackendResult<Vec<T>> {
    let count: usize = out_dims.iter().product();
    let mut result = Vec::with_capacity(count);
    for index in 0..count {
        let coord = unravel_index(index, out_dims);
        let x = lhs[broadcast_offset(&coord, lhs_dims)];
        let y = rhs[broadcast_offset(&coord, rhs_dims)];
        result.push(apply(x, y)?);
    }
    Ok(result)
}

/// Copies `width` consecutive positions starting at `start` along the split
/// axis, for every (outer, inner) pair.
fn copy_axis_window<T: Copy>(
    values: &[T],
    outer: usize,
    extent: usize,
    inner: usize,
    start: usize,
    width: usize,
) -> Vec<T> {
    let mut result = Vec::with_capacity(outer * width * inner);
    for o in 0..outer {
        let base = o * extent * inner + start * inner;
        result.extend_from_slice(&values[base..base + width * inner]);
    }
    result
}

/// Stitches per-input windows back together along the concat axis.
fn concat_axis_windows<T: Copy>(parts: &[(&[T], usize)], outer: usize, inner: usize) -> Vec<T> {
    let total: usize = parts.iter().map(|(_, extent)| extent * inner).sum();
    let mut result = Vec::with_capacity(outer * total);
    for o in 0..outer {
        for (values, extent) in parts {
            let width = extent * inner;
            result.extend_from_slice(&values[o * width..(o + 1) * width]);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_literal(dims: &[usize], values: &[f32]) -> TensorLiteral {
        TensorLiteral::from_f32(TensorDescriptor::fixed(DType::F32, dims), values)
    }

    fn i32_literal(dims: &[usize], values: &[i32]) -> TensorLiteral {
        TensorLiteral::from_i32(TensorDescriptor::fixed(DType::I32, dims), values)
    }

    #[test]
    fn materialize_and_read_back_round_trips() {
        let backend = CpuBackend::new();
        let handle = backend
            .materialize(&f32_literal(&[2, 2], &[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        let literal = backend.to_literal(&handle).unwrap();
        assert_eq!(literal.f32_data().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn memory_counters_track_allocations_exactly() {
        let backend = CpuBackend::new();
        assert_eq!(backend.memory(), MemoryReport::default());
        let handle = backend
            .materialize(&f32_literal(&[2, 3], &[0.0; 6]))
            .unwrap();
        assert_eq!(
            backend.memory(),
            MemoryReport {
                tensors: 1,
                bytes: 24
            }
        );
        let alias = Arc::clone(&handle);
        assert_eq!(backend.memory().tensors, 1, "clones share the allocation");
        drop(handle);
        drop(alias);
        assert_eq!(backend.memory(), MemoryReport::default());
    }

    #[test]
    fn binary_add_broadcasts_rank_and_size_one_axes() {
        let backend = CpuBackend::new();
        let a = backend
            .materialize(&f32_literal(&[2, 2], &[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        let b = backend.materialize(&f32_literal(&[2], &[10.0, 20.0])).unwrap();
        let out = backend
            .run_operation(
                &Operation::Binary(BinaryOp::Add),
                &[a, b],
                &[TensorDescriptor::fixed(DType::F32, &[2, 2])],
            )
            .unwrap();
        let literal = backend.to_literal(&out[0]).unwrap();
        assert_eq!(literal.f32_data().unwrap(), vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn matmul_broadcasts_batch_axes() {
        let backend = CpuBackend::new();
        // [2, 2, 2] x [2, 2] -> [2, 2, 2]: the rhs is shared across batches.
        let a = backend
            .materialize(&f32_literal(
                &[2, 2, 2],
                &[1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0],
            ))
            .unwrap();
        let b = backend
            .materialize(&f32_literal(&[2, 2], &[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        let out = backend
            .run_operation(
                &Operation::MatMul,
                &[a, b],
                &[TensorDescriptor::fixed(DType::F32, &[2, 2, 2])],
            )
            .unwrap();
        let literal = backend.to_literal(&out[0]).unwrap();
        assert_eq!(
            literal.f32_data().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 2.0, 4.0, 6.0, 8.0]
        );
    }

    #[test]
    fn split_partitions_an_interior_axis() {
        let backend = CpuBackend::new();
        let input = backend
            .materialize(&f32_literal(&[2, 4], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]))
            .unwrap();
        let halves = backend
            .run_operation(
                &Operation::Split(SplitSpec { axis: 1, parts: 2 }),
                &[input],
                &[
                    TensorDescriptor::fixed(DType::F32, &[2, 2]),
                    TensorDescriptor::fixed(DType::F32, &[2, 2]),
                ],
            )
            .unwrap();
        let first = backend.to_literal(&halves[0]).unwrap();
        let second = backend.to_literal(&halves[1]).unwrap();
        assert_eq!(first.f32_data().unwrap(), vec![1.0, 2.0, 5.0, 6.0]);
        assert_eq!(second.f32_data().unwrap(), vec![3.0, 4.0, 7.0, 8.0]);
    }

    #[test]
    fn relu_clamps_negative_values() {
        let backend = CpuBackend::new();
        let x = backend
            .materialize(&f32_literal(&[4], &[-2.0, -0.5, 0.0, 3.0]))
            .unwrap();
        let out = backend
            .run_operation(
                &Operation::Unary(UnaryOp::Relu),
                &[x],
                &[TensorDescriptor::fixed(DType::F32, &[4])],
            )
            .unwrap();
        let literal = backend.to_literal(&out[0]).unwrap();
        assert_eq!(literal.f32_data().unwrap(), vec![0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn f32_div_follows_ieee_semantics() {
        let backend = CpuBackend::new();
        let a = backend
            .materialize(&f32_literal(&[3], &[6.0, 1.0, -1.0]))
            .unwrap();
        let b = backend.materialize(&f32_literal(&[3], &[2.0, 0.0, 0.0])).unwrap();
        let out = backend
            .run_operation(
                &Operation::Binary(BinaryOp::Div),
                &[a, b],
                &[TensorDescriptor::fixed(DType::F32, &[3])],
            )
            .unwrap();
        let values = backend.to_literal(&out[0]).unwrap().f32_data().unwrap();
        assert_eq!(values[0], 3.0);
        assert_eq!(values[1], f32::INFINITY);
        assert_eq!(values[2], f32::NEG_INFINITY);
    }

    #[test]
    fn i32_arithmetic_wraps_and_division_by_zero_fails() {
        let backend = CpuBackend::new();
        let a = backend
            .materialize(&i32_literal(&[3], &[i32::MAX, 7, 6]))
            .unwrap();
        let b = backend.materialize(&i32_literal(&[3], &[1, 2, 3])).unwrap();
        let out_desc = TensorDescriptor::fixed(DType::I32, &[3]);

        let sum = backend
            .run_operation(
                &Operation::Binary(BinaryOp::Add),
                &[Arc::clone(&a), Arc::clone(&b)],
                &[out_desc.clone()],
            )
            .unwrap();
        let values = backend.to_literal(&sum[0]).unwrap().i32_data().unwrap();
        assert_eq!(values, vec![i32::MIN, 9, 9]);

        let quotient = backend
            .run_operation(
                &Operation::Binary(BinaryOp::Div),
                &[Arc::clone(&a), b],
                &[out_desc.clone()],
            )
            .unwrap();
        let values = backend.to_literal(&quotient[0]).unwrap().i32_data().unwrap();
        assert_eq!(values, vec![i32::MAX, 3, 2]);

        let zeros = backend.materialize(&i32_literal(&[3], &[1, 0, 3])).unwrap();
        let err = backend
            .run_operation(&Operation::Binary(BinaryOp::Div), &[a, zeros], &[out_desc])
            .unwrap_err();
        assert!(matches!(err, BackendError::Execution { .. }), "{err}");
    }

    #[test]
    fn f16_is_reported_unimplemented() {
        let backend = CpuBackend::new();
        let literal = TensorLiteral::new(
            TensorDescriptor::fixed(DType::F16, &[2]),
            Arc::from(vec![0u8; 4]),
        );
        let err = backend.materialize(&literal).unwrap_err();
        assert!(matches!(err, BackendError::Unimplemented { .. }));
    }
}
