//! Compilation of a builder's reachable subgraph into a [`Graph`].
//!
//! Walks backward from the requested outputs, keeps exactly the values and
//! nodes reached, and renumbers them densely. The builder's insertion order
//! is already topological (constructors only accept existing operands), so
//! filtering it to the reachable set preserves a valid schedule. Constant
//! literals are `Arc`-shared with the builder — they are immutable byte
//! snapshots, so no further copying is needed — and uploaded to the backend
//! once, here.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::backend::KernelBackend;
use crate::graph::builder::{GraphBuilder, Operand, OperandId, Origin};
use crate::graph::compiled::{Graph, GraphNode, GraphValue, ValueId, ValueSource};
use crate::graph::error::GraphError;
use crate::graph::plan::{PlanCachePolicy, PlanCacheState};
use crate::graph::resources::ConstantPool;

pub(crate) fn compile<B: KernelBackend + 'static>(
    builder: &GraphBuilder<B>,
    outputs: &[(&str, Operand)],
    policy: PlanCachePolicy,
) -> Result<Graph<B>, GraphError> {
    if outputs.is_empty() {
        return Err(GraphError::NoOutputs);
    }
    let mut requested: BTreeMap<String, OperandId> = BTreeMap::new();
    for (name, operand) in outputs {
        let id = builder.expect_operand(*operand)?;
        if requested.insert((*name).to_string(), id).is_some() {
            return Err(GraphError::DuplicateName {
                name: (*name).to_string(),
            });
        }
    }

    // Backward reachability over builder ids. A reachable node claims all
    // of its outputs: sibling results come out of the same dispatch.
    let mut value_seen = vec![false; builder.values.len()];
    let mut node_seen = vec![false; builder.nodes.len()];
    let mut stack: Vec<OperandId> = requested.values().copied().collect();
    while let Some(id) = stack.pop() {
        if value_seen[id.0 as usize] {
            continue;
        }
        value_seen[id.0 as usize] = true;
        if let Origin::Node { node } = builder.values[id.0 as usize].origin {
            if !node_seen[node] {
                node_seen[node] = true;
                for input in &builder.nodes[node].inputs {
                    stack.push(*input);
                }
                for output in &builder.nodes[node].outputs {
                    if !value_seen[output.0 as usize] {
                        value_seen[output.0 as usize] = true;
                    }
                }
            }
        }
    }

    // Dense renumbering in insertion (= topological) order.
    let mut value_map: Vec<Option<ValueId>> = vec![None; builder.values.len()];
    let mut next = 0u32;
    for (index, seen) in value_seen.iter().enumerate() {
        if *seen {
            value_map[index] = Some(ValueId(next));
            next += 1;
        }
    }
    let mut node_map: Vec<Option<usize>> = vec![None; builder.nodes.len()];
    let mut kept_nodes = 0usize;
    for (index, seen) in node_seen.iter().enumerate() {
        if *seen {
            node_map[index] = Some(kept_nodes);
            kept_nodes += 1;
        }
    }

    let mut values = Vec::with_capacity(next as usize);
    let mut inputs: BTreeMap<String, ValueId> = BTreeMap::new();
    let mut constants = ConstantPool::new();
    for (index, record) in builder.values.iter().enumerate() {
        let Some(value_id) = value_map[index] else {
            continue;
        };
        let source = match &record.origin {
            Origin::Input { name } => {
                inputs.insert(name.clone(), value_id);
                ValueSource::Input { name: name.clone() }
            }
            Origin::Constant { literal } => {
                let handle = builder.backend().materialize(literal)?;
                let pool_index = constants.push(literal.clone(), handle);
                ValueSource::Constant { pool_index }
            }
            Origin::Node { node } => ValueSource::Node {
                node: node_map[*node].expect("producer of a reachable value is reachable"),
            },
        };
        values.push(GraphValue {
            descriptor: record.descriptor.clone(),
            source,
        });
    }

    let mut nodes = Vec::with_capacity(kept_nodes);
    for (index, record) in builder.nodes.iter().enumerate() {
        if node_map[index].is_none() {
            continue;
        }
        let remap = |id: &OperandId| {
            value_map[id.0 as usize].expect("operands of a reachable node are reachable")
        };
        nodes.push(GraphNode {
            operation: record.operation.clone(),
            inputs: record.inputs.iter().map(remap).collect::<SmallVec<_>>(),
            outputs: record.outputs.iter().map(remap).collect::<SmallVec<_>>(),
        });
    }

    let outputs = requested
        .into_iter()
        .map(|(name, id)| {
            let value = value_map[id.0 as usize].expect("requested outputs are reachable");
            (name, value)
        })
        .collect();

    Ok(Graph {
        backend: builder.backend().clone(),
        values,
        nodes,
        inputs,
        outputs,
        constants,
        plan_cache: PlanCacheState::new(policy),
    })
}
