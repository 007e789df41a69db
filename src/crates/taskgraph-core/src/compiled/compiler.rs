use std::collections::BTreeSet;

use uuid::Uuid;

use super::pipeline::{CompiledPipeline, PIPELINE_NAMESPACE};
use crate::composer::{compose, Composition};
use crate::error::{PipelineError, Result};
use crate::graph::{GraphNode, NodeKind, END, START};
use crate::profile::TaskProfile;
use crate::registry::StageRegistry;

/// Compose and compile `profile` against `registry`
///
/// Pure: no I/O, no handler calls. Identical inputs give an identical pipeline,
/// id included.
pub fn compile(profile: &TaskProfile, registry: &StageRegistry) -> Result<CompiledPipeline> {
    compile_composition(compose(profile, registry))
}

/// Validate and link an already composed graph
pub fn compile_composition(composition: Composition) -> Result<CompiledPipeline> {
    let Composition {
        profile,
        graph,
        warnings,
    } = composition;

    graph.validate().map_err(PipelineError::Validation)?;

    // validate() guarantees a single START..END path covering every node
    let mut nodes = Vec::with_capacity(graph.len());
    let mut predecessor = START.to_string();
    let mut current = graph
        .edges
        .get(START)
        .cloned()
        .ok_or_else(|| PipelineError::Validation("missing entry edge".to_string()))?;
    while current != END {
        let composed = graph
            .nodes
            .iter()
            .find(|n| n.id == current)
            .ok_or_else(|| PipelineError::Validation(format!("unknown node {}", current)))?;
        let successor = graph
            .edges
            .get(&current)
            .cloned()
            .ok_or_else(|| PipelineError::Validation(format!("{} has no successor", current)))?;
        nodes.push(GraphNode {
            id: composed.id.clone(),
            name: composed.name.clone(),
            kind: composed.kind,
            predecessor: predecessor.clone(),
            successor: successor.clone(),
        });
        predecessor = current;
        current = successor;
    }

    let checkpoint_nodes: BTreeSet<_> = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Checkpoint)
        .map(|n| n.id.clone())
        .collect();

    let entry = nodes
        .first()
        .map(|n| n.id.clone())
        .ok_or_else(|| PipelineError::Validation("pipeline has no nodes".to_string()))?;

    let id = pipeline_id(&profile, &nodes);
    tracing::debug!(
        pipeline_id = %id,
        nodes = nodes.len(),
        checkpoints = checkpoint_nodes.len(),
        "compiled pipeline"
    );

    Ok(CompiledPipeline {
        id,
        profile,
        nodes,
        checkpoint_nodes,
        entry,
        terminal: END.to_string(),
        warnings,
    })
}

fn pipeline_id(profile: &TaskProfile, nodes: &[GraphNode]) -> Uuid {
    let mut key = profile.fingerprint();
    for node in nodes {
        key.push('|');
        key.push_str(&node.id);
        key.push(':');
        key.push_str(&node.kind.to_string());
    }
    Uuid::new_v5(&PIPELINE_NAMESPACE, key.as_bytes())
}
