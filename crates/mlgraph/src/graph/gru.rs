//! Statically unrolled GRU construction.
//!
//! The recurrent cell is a builder-level composite, not a catalog entry:
//! given a construction-time step count it expands into the existing
//! split/reshape/transpose/matmul/elementwise primitives, so backends never
//! see a recurrent kernel and the compiled graph is an ordinary DAG.
//!
//! Gate layout is update/reset/new (`z`, `r`, `n` thirds of the weight
//! tensors, in that order) with sigmoid/sigmoid/tanh activations:
//!
//! ```text
//! z  = sigmoid(x Wz + bz + h Rz + rbz)
//! r  = sigmoid(x Wr + br + h Rr + rbr)
//! n  = tanh(x Wn + bn + r * (h Rn + rbn))      reset_after
//! n  = tanh(x Wn + bn + (r * h) Rn + rbn)      otherwise
//! h' = n + z * (h - n)
//! ```

use crate::backend::KernelBackend;
use crate::graph::builder::{GraphBuilder, Operand};
use crate::graph::error::GraphError;
use crate::graph::operation::ReshapeDim;
use crate::tensor::{Dimension, TensorDescriptor};

/// Optional pieces of a GRU layer.
///
/// `bias` and `recurrent_bias` are `[1, 3*hidden]` operands applied to the
/// input and recurrent halves of each gate. `initial_hidden_state` is
/// `[1, batch, hidden]`; when absent a zero constant is synthesized, which
/// requires the input's batch dimension to be fixed.
#[derive(Debug, Clone)]
pub struct GruOptions {
    pub bias: Option<Operand>,
    pub recurrent_bias: Option<Operand>,
    pub initial_hidden_state: Option<Operand>,
    /// Apply the reset gate after the recurrent matmul (the common modern
    /// formulation) rather than to the hidden state before it.
    pub reset_after: bool,
    /// Additionally return the per-step hidden states concatenated as
    /// `[steps, 1, batch, hidden]`.
    pub return_sequence: bool,
}

impl Default for GruOptions {
    fn default() -> Self {
        GruOptions {
            bias: None,
            recurrent_bias: None,
            initial_hidden_state: None,
            reset_after: true,
            return_sequence: false,
        }
    }
}

/// The three gate slices of a weight-shaped operand, in z/r/n order.
struct Gates {
    z: Operand,
    r: Operand,
    n: Operand,
}

impl<B: KernelBackend + 'static> GraphBuilder<B> {
    /// Unrolls a single-direction GRU over `steps` time steps.
    ///
    /// `input` is `[steps, batch, input_size]`, `weight` is
    /// `[1, 3*hidden_size, input_size]`, and `recurrent_weight` is
    /// `[1, 3*hidden_size, hidden_size]`; the weight shapes must be fully
    /// fixed. Returns the final hidden state `[1, batch, hidden_size]`,
    /// followed by the step sequence when
    /// [`GruOptions::return_sequence`] is set.
    pub fn gru(
        &mut self,
        input: Operand,
        weight: Operand,
        recurrent_weight: Operand,
        steps: usize,
        hidden_size: usize,
        options: GruOptions,
    ) -> Result<Vec<Operand>, GraphError> {
        if steps == 0 || hidden_size == 0 {
            return Err(incompatible("steps and hidden_size must be positive"));
        }
        let three_hidden = 3 * hidden_size;

        let input_desc = self.descriptor(input)?.clone();
        if input_desc.shape.rank() != 3 {
            return Err(incompatible(format!(
                "input must be [steps, batch, input_size], got rank {}",
                input_desc.shape.rank()
            )));
        }
        if let Dimension::Fixed(extent) = input_desc.shape.dims()[0] {
            if extent != steps {
                return Err(incompatible(format!(
                    "input declares {extent} step(s), gru unrolls {steps}"
                )));
            }
        }
        let batch = input_desc.shape.dims()[1];

        let weight_dims = self.expect_weight(weight, "weight", three_hidden)?;
        let input_size = weight_dims[2];
        if let Dimension::Fixed(declared) = input_desc.shape.dims()[2] {
            if declared != input_size {
                return Err(incompatible(format!(
                    "input size {declared} does not match weight columns {input_size}"
                )));
            }
        }
        let recurrent_dims = self.expect_weight(recurrent_weight, "recurrent_weight", three_hidden)?;
        if recurrent_dims[2] != hidden_size {
            return Err(incompatible(format!(
                "recurrent_weight columns {} must equal hidden_size {hidden_size}",
                recurrent_dims[2]
            )));
        }

        let w = self.gate_weights(weight, three_hidden, input_size)?;
        let r = self.gate_weights(recurrent_weight, three_hidden, hidden_size)?;
        let b = match options.bias {
            Some(bias) => Some(self.gate_biases(bias, "bias", three_hidden)?),
            None => None,
        };
        let rb = match options.recurrent_bias {
            Some(bias) => Some(self.gate_biases(bias, "recurrent_bias", three_hidden)?),
            None => None,
        };

        // Working hidden state is [batch, hidden]; the leading direction
        // axis is squeezed off here and restored on the outputs.
        let mut hidden = match options.initial_hidden_state {
            Some(state) => {
                let desc = self.descriptor(state)?.clone();
                let dims = desc.shape.dims();
                if desc.shape.rank() != 3
                    || dims[0] != Dimension::Fixed(1)
                    || dims[2] != Dimension::Fixed(hidden_size)
                {
                    return Err(incompatible(format!(
                        "initial_hidden_state must be [1, batch, {hidden_size}], got {}",
                        desc.shape
                    )));
                }
                self.reshape(state, vec![ReshapeDim::Infer, ReshapeDim::Fixed(hidden_size)])?
            }
            None => {
                let Dimension::Fixed(batch) = batch else {
                    return Err(incompatible(
                        "a dynamic batch dimension requires an explicit initial_hidden_state",
                    ));
                };
                let zeros = vec![0.0f32; batch * hidden_size];
                self.constant_f32(
                    TensorDescriptor::fixed(input_desc.dtype, &[batch, hidden_size]),
                    &zeros,
                )?
            }
        };

        let step_slices = self.split(input, steps, 0)?;
        let mut sequence = Vec::with_capacity(steps);
        for slice in step_slices {
            // [1, batch, input_size] -> [batch, input_size]
            let x = self.reshape(slice, vec![ReshapeDim::Infer, ReshapeDim::Fixed(input_size)])?;

            let z = {
                let pre = self.gate_preactivation(x, hidden, w.z, r.z, gate_bias(&b, GateBias::Z), gate_bias(&rb, GateBias::Z))?;
                self.sigmoid(pre)?
            };
            let reset = {
                let pre = self.gate_preactivation(x, hidden, w.r, r.r, gate_bias(&b, GateBias::R), gate_bias(&rb, GateBias::R))?;
                self.sigmoid(pre)?
            };
            let candidate = {
                let mut nx = self.matmul(x, w.n)?;
                if let Some(bias) = gate_bias(&b, GateBias::N) {
                    nx = self.add(nx, bias)?;
                }
                let nh = if options.reset_after {
                    let mut nh = self.matmul(hidden, r.n)?;
                    if let Some(bias) = gate_bias(&rb, GateBias::N) {
                        nh = self.add(nh, bias)?;
                    }
                    self.mul(reset, nh)?
                } else {
                    let gated = self.mul(reset, hidden)?;
                    let mut nh = self.matmul(gated, r.n)?;
                    if let Some(bias) = gate_bias(&rb, GateBias::N) {
                        nh = self.add(nh, bias)?;
                    }
                    nh
                };
                let pre = self.add(nx, nh)?;
                self.tanh(pre)?
            };

            // h' = n + z * (h - n), which avoids a synthesized ones tensor
            // for the usual (1 - z) * n + z * h form.
            let kept = self.sub(hidden, candidate)?;
            let scaled = self.mul(z, kept)?;
            hidden = self.add(candidate, scaled)?;

            if options.return_sequence {
                let step_state = self.reshape(
                    hidden,
                    vec![
                        ReshapeDim::Fixed(1),
                        ReshapeDim::Fixed(1),
                        ReshapeDim::Infer,
                        ReshapeDim::Fixed(hidden_size),
                    ],
                )?;
                sequence.push(step_state);
            }
        }

        let final_state = self.reshape(
            hidden,
            vec![
                ReshapeDim::Fixed(1),
                ReshapeDim::Infer,
                ReshapeDim::Fixed(hidden_size),
            ],
        )?;
        let mut outputs = vec![final_state];
        if options.return_sequence {
            outputs.push(self.concat(&sequence, 0)?);
        }
        Ok(outputs)
    }

    /// Checks a `[1, 3*hidden, columns]` weight operand and returns its
    /// fixed extents.
    fn expect_weight(
        &self,
        operand: Operand,
        role: &str,
        three_hidden: usize,
    ) -> Result<Vec<usize>, GraphError> {
        let desc = self.descriptor(operand)?;
        let dims = desc.shape.static_dims().ok_or_else(|| {
            incompatible(format!("{role} must have a fully fixed shape, got {}", desc.shape))
        })?;
        if dims.len() != 3 || dims[0] != 1 {
            return Err(incompatible(format!(
                "{role} must be [1, {three_hidden}, columns], got {}",
                desc.shape
            )));
        }
        if dims[1] != three_hidden {
            return Err(incompatible(format!(
                "{role} packs {} gate rows, expected {three_hidden}",
                dims[1]
            )));
        }
        Ok(dims)
    }

    /// Splits `[1, 3*hidden, columns]` into per-gate `[columns, hidden]`
    /// matmul operands.
    fn gate_weights(
        &mut self,
        operand: Operand,
        three_hidden: usize,
        columns: usize,
    ) -> Result<Gates, GraphError> {
        let stacked = self.reshape(
            operand,
            vec![ReshapeDim::Fixed(three_hidden), ReshapeDim::Fixed(columns)],
        )?;
        let parts = self.split(stacked, 3, 0)?;
        let mut transposed = parts
            .into_iter()
            .map(|part| self.transpose(part, vec![1, 0]))
            .collect::<Result<Vec<_>, _>>()?;
        let n = transposed.pop().expect("split produced three parts");
        let r = transposed.pop().expect("split produced three parts");
        let z = transposed.pop().expect("split produced three parts");
        Ok(Gates { z, r, n })
    }

    /// Splits a `[1, 3*hidden]` bias into per-gate `[hidden]` operands.
    fn gate_biases(
        &mut self,
        operand: Operand,
        role: &str,
        three_hidden: usize,
    ) -> Result<Gates, GraphError> {
        let desc = self.descriptor(operand)?;
        let dims = desc.shape.static_dims().ok_or_else(|| {
            incompatible(format!("{role} must have a fully fixed shape, got {}", desc.shape))
        })?;
        if dims != [1, three_hidden] {
            return Err(incompatible(format!(
                "{role} must be [1, {three_hidden}], got {}",
                desc.shape
            )));
        }
        let flat = self.reshape(operand, vec![ReshapeDim::Fixed(three_hidden)])?;
        let mut parts = self.split(flat, 3, 0)?;
        let n = parts.pop().expect("split produced three parts");
        let r = parts.pop().expect("split produced three parts");
        let z = parts.pop().expect("split produced three parts");
        Ok(Gates { z, r, n })
    }

    /// `x W + b + h R + rb`, shared by the update and reset gates.
    fn gate_preactivation(
        &mut self,
        x: Operand,
        hidden: Operand,
        weight: Operand,
        recurrent: Operand,
        bias: Option<Operand>,
        recurrent_bias: Option<Operand>,
    ) -> Result<Operand, GraphError> {
        let mut from_input = self.matmul(x, weight)?;
        if let Some(bias) = bias {
            from_input = self.add(from_input, bias)?;
        }
        let mut from_hidden = self.matmul(hidden, recurrent)?;
        if let Some(bias) = recurrent_bias {
            from_hidden = self.add(from_hidden, bias)?;
        }
        self.add(from_input, from_hidden)
    }
}

#[derive(Clone, Copy)]
enum GateBias {
    Z,
    R,
    N,
}

fn gate_bias(gates: &Option<Gates>, which: GateBias) -> Option<Operand> {
    gates.as_ref().map(|gates| match which {
        GateBias::Z => gates.z,
        GateBias::R => gates.r,
        GateBias::N => gates.n,
    })
}

fn incompatible(detail: impl Into<String>) -> GraphError {
    GraphError::IncompatibleShape {
        operation: "gru",
        detail: detail.into(),
    }
}
