use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{GraphNode, NodeId, NodeKind, END};
use crate::profile::{CompositionWarning, TaskProfile};

/// Namespace for pipeline ids (UUIDv5)
pub const PIPELINE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1e_2b7a_9c4d_4e58_8a3f_0d15_c2b9_7e41);

/// Immutable, validated pipeline ready to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPipeline {
    /// Deterministic id derived from the sanitised profile and node sequence
    pub id: Uuid,

    /// Sanitised profile the pipeline was built from
    pub profile: TaskProfile,

    /// Nodes in execution order
    pub nodes: Vec<GraphNode>,

    /// Ids of all checkpoint nodes (candidate suspension points)
    pub checkpoint_nodes: BTreeSet<NodeId>,

    /// First node to run
    pub entry: NodeId,

    /// Terminal sentinel
    pub terminal: NodeId,

    /// Recoverable problems found while composing
    #[serde(default)]
    pub warnings: Vec<CompositionWarning>,
}

impl CompiledPipeline {
    /// Nodes that suspend a run in the given mode
    ///
    /// Every checkpoint node with human review on, none with it off.
    pub fn suspension_set(&self, human_review: bool) -> BTreeSet<NodeId> {
        if human_review {
            self.checkpoint_nodes.clone()
        } else {
            BTreeSet::new()
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Node after `id`; [`END`] for the last node
    pub fn successor(&self, id: &str) -> Option<&str> {
        self.node(id).map(|n| n.successor.as_str())
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Stage nodes in execution order
    pub fn stages(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Stage)
    }

    /// Checkpoint nodes in execution order
    pub fn checkpoints(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Checkpoint)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn allow_iteration(&self) -> bool {
        self.profile.allow_iteration
    }

    /// Carried from the profile; rejection stays terminal
    pub fn allow_rewrite(&self) -> bool {
        self.profile.allow_rewrite
    }

    pub fn is_terminal(&self, id: &str) -> bool {
        id == self.terminal || id == END
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
