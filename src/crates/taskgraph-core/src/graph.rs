//! Pipeline graph data structures
//!
//! Pipelines are plain data: an ordered node array plus a next-pointer map.
//! Nothing here executes; the [`composer`](crate::composer) fills a [`ComposedGraph`]
//! and the [`compiler`](crate::compiled) validates it into a
//! [`CompiledPipeline`](crate::CompiledPipeline).
//!
//! # Graph Structure
//!
//! ```text
//! START ──► analyze ──► retrieve ──► review_retrieval ──► write ──► END
//!           (stage)     (stage)      (checkpoint)         (stage)
//! ```
//!
//! Every node has exactly one successor and, apart from the entry node, exactly one
//! predecessor. [`START`] and [`END`] are virtual sentinels and never run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Node identifier, unique within a pipeline
///
/// The first occurrence of a stage or checkpoint uses its registry id as node id;
/// repeats (only possible when iteration is allowed) get a `#n` suffix.
pub type NodeId = String;

/// Virtual node preceding the entry node
pub const START: &str = "__start__";

/// Virtual node following the last node
pub const END: &str = "__end__";

/// What a node does when the engine reaches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Runs a registered stage handler
    Stage,
    /// Potential human-review suspension point
    Checkpoint,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Stage => write!(f, "stage"),
            NodeKind::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

/// Node as emitted by the composer, before linking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedNode {
    pub id: NodeId,
    /// Registry id of the stage or checkpoint
    pub name: String,
    pub kind: NodeKind,
}

/// Node placed in a compiled pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    /// Registry id of the stage or checkpoint
    pub name: String,
    pub kind: NodeKind,
    /// Previous node, [`START`] for the entry node
    pub predecessor: NodeId,
    /// Next node, [`END`] for the last node
    pub successor: NodeId,
}

impl GraphNode {
    pub fn is_checkpoint(&self) -> bool {
        self.kind == NodeKind::Checkpoint
    }
}

/// Adjacency-list output of the composer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposedGraph {
    /// Nodes in emission order
    pub nodes: Vec<ComposedNode>,
    /// Next-pointer map, including `START -> entry` and `last -> END`
    pub edges: BTreeMap<NodeId, NodeId>,
}

impl ComposedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; the id is made unique against the nodes already present
    pub fn push(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let name = name.into();
        let occurrences = self.nodes.iter().filter(|n| n.name == name).count();
        let mut id = if occurrences == 0 {
            name.clone()
        } else {
            format!("{}#{}", name, occurrences + 1)
        };
        let mut n = occurrences + 1;
        while self.nodes.iter().any(|node| node.id == id) {
            n += 1;
            id = format!("{}#{}", name, n);
        }
        self.nodes.push(ComposedNode {
            id: id.clone(),
            name,
            kind,
        });
        id
    }

    /// Set the successor of `from`
    pub fn link(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) {
        self.edges.insert(from.into(), to.into());
    }

    /// Chain the nodes in emission order from [`START`] to [`END`]
    pub fn link_in_order(&mut self) {
        self.edges.clear();
        let mut previous = START.to_string();
        for node in &self.nodes {
            self.edges.insert(previous, node.id.clone());
            previous = node.id.clone();
        }
        self.edges.insert(previous, END.to_string());
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the linear-chain invariant
    ///
    /// Node ids are unique and distinct from the sentinels, following the edges from
    /// [`START`] visits every node exactly once and ends at [`END`].
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("pipeline has no nodes".to_string());
        }

        let mut ids = BTreeSet::new();
        for node in &self.nodes {
            if node.id == START || node.id == END {
                return Err(format!("node id {} is reserved", node.id));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(format!("duplicate node id {}", node.id));
            }
        }

        for (from, to) in &self.edges {
            if from != START && !ids.contains(from.as_str()) {
                return Err(format!("edge source {} does not exist", from));
            }
            if to != END && !ids.contains(to.as_str()) {
                return Err(format!("edge target {} does not exist", to));
            }
        }

        let mut visited = BTreeSet::new();
        let mut current = START;
        loop {
            let next = self
                .edges
                .get(current)
                .ok_or_else(|| format!("node {} has no successor", current))?;
            if next == END {
                break;
            }
            if !visited.insert(next.as_str()) {
                return Err(format!("cycle detected at node {}", next));
            }
            current = next.as_str();
        }

        if visited.len() != ids.len() {
            let orphans: Vec<&str> = ids.difference(&visited).copied().collect();
            return Err(format!("unreachable nodes: {}", orphans.join(", ")));
        }

        Ok(())
    }
}
