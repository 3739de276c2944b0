//! Caller-owned buffer bindings for compute calls.
//!
//! An input is bound either as a bare typed slice (every dimension already
//! fixed by the graph) or with explicit `dimensions` resolving the
//! operand's dynamic axes. Outputs are always bound to writable typed
//! slices of exactly the resolved length; the engine copies values in and
//! never retains or aliases the caller's memory.

use std::collections::BTreeMap;

use crate::tensor::DType;

#[derive(Debug)]
enum InputData<'a> {
    F32(&'a [f32]),
    I32(&'a [i32]),
    Raw { dtype: DType, bytes: &'a [u8] },
}

/// One bound input buffer, optionally carrying explicit dimensions.
#[derive(Debug)]
pub struct InputBinding<'a> {
    data: InputData<'a>,
    dimensions: Option<Vec<usize>>,
}

impl<'a> InputBinding<'a> {
    pub fn f32(values: &'a [f32]) -> Self {
        InputBinding {
            data: InputData::F32(values),
            dimensions: None,
        }
    }

    pub fn i32(values: &'a [i32]) -> Self {
        InputBinding {
            data: InputData::I32(values),
            dimensions: None,
        }
    }

    pub fn raw(dtype: DType, bytes: &'a [u8]) -> Self {
        InputBinding {
            data: InputData::Raw { dtype, bytes },
            dimensions: None,
        }
    }

    /// Attaches the concrete per-call shape. Required whenever the bound
    /// operand declares any dynamic dimension.
    pub fn with_dimensions(mut self, dimensions: impl Into<Vec<usize>>) -> Self {
        self.dimensions = Some(dimensions.into());
        self
    }

    pub fn dtype(&self) -> DType {
        match &self.data {
            InputData::F32(_) => DType::F32,
            InputData::I32(_) => DType::I32,
            InputData::Raw { dtype, .. } => *dtype,
        }
    }

    pub fn byte_len(&self) -> usize {
        match &self.data {
            InputData::F32(values) => values.len() * 4,
            InputData::I32(values) => values.len() * 4,
            InputData::Raw { bytes, .. } => bytes.len(),
        }
    }

    pub fn dimensions(&self) -> Option<&[usize]> {
        self.dimensions.as_deref()
    }

    /// Copies the bound buffer into an owned little-endian byte vector.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        match &self.data {
            InputData::F32(values) => crate::tensor::f32_to_bytes(values),
            InputData::I32(values) => crate::tensor::i32_to_bytes(values),
            InputData::Raw { bytes, .. } => bytes.to_vec(),
        }
    }
}

#[derive(Debug)]
enum OutputData<'a> {
    F32(&'a mut [f32]),
    I32(&'a mut [i32]),
    Raw { dtype: DType, bytes: &'a mut [u8] },
}

/// One caller-owned output buffer to be filled by a compute call.
#[derive(Debug)]
pub struct OutputBinding<'a> {
    data: OutputData<'a>,
}

impl<'a> OutputBinding<'a> {
    pub fn f32(values: &'a mut [f32]) -> Self {
        OutputBinding {
            data: OutputData::F32(values),
        }
    }

    pub fn i32(values: &'a mut [i32]) -> Self {
        OutputBinding {
            data: OutputData::I32(values),
        }
    }

    pub fn raw(dtype: DType, bytes: &'a mut [u8]) -> Self {
        OutputBinding {
            data: OutputData::Raw { dtype, bytes },
        }
    }

    pub fn dtype(&self) -> DType {
        match &self.data {
            OutputData::F32(_) => DType::F32,
            OutputData::I32(_) => DType::I32,
            OutputData::Raw { dtype, .. } => *dtype,
        }
    }

    pub fn byte_len(&self) -> usize {
        match &self.data {
            OutputData::F32(values) => values.len() * 4,
            OutputData::I32(values) => values.len() * 4,
            OutputData::Raw { bytes, .. } => bytes.len(),
        }
    }

    /// Decodes `bytes` into the bound buffer. The caller must have checked
    /// that lengths match.
    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        match &mut self.data {
            OutputData::F32(values) => {
                for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
                    *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            OutputData::I32(values) => {
                for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
                    *value = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            OutputData::Raw { bytes: target, .. } => target.copy_from_slice(bytes),
        }
    }
}

/// Named input bindings for one compute call. Iteration order is the sorted
/// name order, which keeps validation reports deterministic.
#[derive(Debug, Default)]
pub struct ComputeInputs<'a> {
    entries: BTreeMap<String, InputBinding<'a>>,
}

impl<'a> ComputeInputs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`, replacing any previous binding of the same name.
    pub fn insert(&mut self, name: impl Into<String>, binding: InputBinding<'a>) -> &mut Self {
        self.entries.insert(name.into(), binding);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&InputBinding<'a>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Named output bindings for one compute call.
#[derive(Debug, Default)]
pub struct ComputeOutputs<'a> {
    entries: BTreeMap<String, OutputBinding<'a>>,
}

impl<'a> ComputeOutputs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: OutputBinding<'a>) -> &mut Self {
        self.entries.insert(name.into(), binding);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut OutputBinding<'a>> {
        self.entries.get_mut(name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &OutputBinding<'a>)> {
        self.entries
            .iter()
            .map(|(name, binding)| (name.as_str(), binding))
    }
}
