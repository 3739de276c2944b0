//! Serializable summaries of compiled graphs.
//!
//! A manifest captures a graph's structure — named inputs and outputs,
//! value descriptors, the topologically ordered node list, and constant
//! sizes — without the constant payloads or any backend state. It is meant
//! for inspection, diffing, and persistence of graph metadata, not for
//! round-tripping an executable graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::KernelBackend;
use crate::graph::compiled::{Graph, ValueSource};
use crate::graph::operation::Operation;
use crate::tensor::TensorDescriptor;

#[derive(Debug, Error)]
pub enum ManifestSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// One node of the compiled schedule; indices refer to the manifest's
/// `values` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeManifest {
    pub operation: Operation,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
}

/// One constant of the graph: which value it backs and how large its
/// snapshot is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantManifest {
    pub value: u32,
    pub byte_len: usize,
}

/// Structural summary of a [`Graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphManifest {
    pub inputs: BTreeMap<String, u32>,
    pub outputs: BTreeMap<String, u32>,
    pub values: Vec<TensorDescriptor>,
    pub nodes: Vec<NodeManifest>,
    pub constants: Vec<ConstantManifest>,
}

impl GraphManifest {
    pub fn to_json_string(&self) -> Result<String, ManifestSerdeError> {
        serde_json::to_string_pretty(self).map_err(ManifestSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ManifestSerdeError> {
        serde_json::from_str(src).map_err(ManifestSerdeError::from)
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>, ManifestSerdeError> {
        bincode::serialize(self).map_err(ManifestSerdeError::from)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self, ManifestSerdeError> {
        bincode::deserialize(bytes).map_err(ManifestSerdeError::from)
    }
}

impl<B: KernelBackend + 'static> Graph<B> {
    /// Summarizes this graph's structure.
    pub fn manifest(&self) -> GraphManifest {
        let mut constants = Vec::with_capacity(self.constants.len());
        for (index, value) in self.values.iter().enumerate() {
            if let ValueSource::Constant { pool_index } = &value.source {
                constants.push(ConstantManifest {
                    value: index as u32,
                    byte_len: self.constants.literal(*pool_index).byte_len(),
                });
            }
        }
        GraphManifest {
            inputs: self
                .inputs
                .iter()
                .map(|(name, id)| (name.clone(), id.0))
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|(name, id)| (name.clone(), id.0))
                .collect(),
            values: self
                .values
                .iter()
                .map(|value| value.descriptor.clone())
                .collect(),
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeManifest {
                    operation: node.operation.clone(),
                    inputs: node.inputs.iter().map(|id| id.0).collect(),
                    outputs: node.outputs.iter().map(|id| id.0).collect(),
                })
                .collect(),
            constants,
        }
    }
}
