//! Graph composer: TaskProfile + registry -> node/edge list
//!
//! [`compose`] is a pure function. It performs no I/O and consults the registry only
//! to validate ids and read the trigger map, so identical inputs always produce an
//! identical [`Composition`].
//!
//! # Algorithm
//!
//! 1. Sanitise the profile (unknown ids dropped, see [`TaskProfile::sanitize`]).
//! 2. If no stages remain, substitute the default stage sequence.
//! 3. Emit one stage node per entry, in order.
//! 4. After a stage that appears in the trigger map, emit the mapped checkpoint node
//!    when the profile requested that checkpoint.
//! 5. Chain everything from `START` to `END`.
//!
//! Checkpoint nodes are placed regardless of human-review mode. Whether they
//! actually suspend is decided per run by the engine.

use std::collections::BTreeSet;

use crate::graph::{ComposedGraph, NodeKind};
use crate::profile::{CompositionWarning, TaskProfile, DEFAULT_STAGES};
use crate::registry::StageRegistry;

/// Result of composing a profile
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    /// Sanitised profile the graph was built from
    pub profile: TaskProfile,
    pub graph: ComposedGraph,
    pub warnings: Vec<CompositionWarning>,
}

/// Compose the pipeline graph for `profile`
pub fn compose(profile: &TaskProfile, registry: &StageRegistry) -> Composition {
    let (mut profile, mut warnings) = profile.sanitize(registry);

    if profile.stages.is_empty() {
        tracing::warn!("no usable stages in profile, substituting the default sequence");
        warnings.push(CompositionWarning::DefaultStagesSubstituted);
        profile.stages = DEFAULT_STAGES.iter().map(|s| s.to_string()).collect();
    }

    let mut graph = ComposedGraph::new();
    let mut placed = BTreeSet::new();
    for stage in &profile.stages {
        graph.push(stage.clone(), NodeKind::Stage);

        if let Some(checkpoint) = registry.trigger_for(stage) {
            if profile.checkpoints.contains(checkpoint) {
                graph.push(checkpoint.clone(), NodeKind::Checkpoint);
                placed.insert(checkpoint.clone());
            }
        }
    }
    graph.link_in_order();

    for checkpoint in profile.checkpoints.difference(&placed) {
        tracing::debug!(%checkpoint, "requested checkpoint has no trigger stage, omitted");
        warnings.push(CompositionWarning::CheckpointWithoutTrigger {
            checkpoint: checkpoint.clone(),
        });
    }

    Composition {
        profile,
        graph,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageOutput;
    use crate::graph::{END, START};
    use crate::profile::TaskType;

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        for stage in ["analyze", "retrieve", "write", "design"] {
            registry.register_stage(stage, |_ctx| async { Ok(StageOutput::empty()) });
        }
        registry
    }

    fn ids(composition: &Composition) -> Vec<&str> {
        composition
            .graph
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .collect()
    }

    #[test]
    fn test_checkpoint_follows_trigger_stage() {
        let profile = TaskProfile::new(TaskType::Research, ["analyze", "retrieve", "write"])
            .with_checkpoints(["review_draft"]);
        let composition = compose(&profile, &registry());

        assert_eq!(ids(&composition), vec!["analyze", "retrieve", "write", "review_draft"]);
        assert_eq!(composition.graph.nodes[3].kind, NodeKind::Checkpoint);
        assert_eq!(composition.graph.edges["write"], "review_draft");
        assert_eq!(composition.graph.edges["review_draft"], END);
        assert!(composition.graph.validate().is_ok());
    }

    #[test]
    fn test_both_checkpoints_placed() {
        let profile = TaskProfile::new(TaskType::Research, ["analyze", "retrieve", "write"])
            .with_checkpoints(["review_draft", "review_retrieval"]);
        let composition = compose(&profile, &registry());
        assert_eq!(
            ids(&composition),
            vec!["analyze", "retrieve", "review_retrieval", "write", "review_draft"]
        );
    }

    #[test]
    fn test_unknown_stage_keeps_chain_continuous() {
        let profile =
            TaskProfile::new(TaskType::Design, ["analyze", "nonexistent_stage", "write"]);
        let composition = compose(&profile, &registry());

        assert_eq!(ids(&composition), vec!["analyze", "write"]);
        assert_eq!(composition.graph.edges[START], "analyze");
        assert_eq!(composition.graph.edges["analyze"], "write");
        assert!(composition.warnings.contains(&CompositionWarning::UnknownStage {
            stage: "nonexistent_stage".to_string()
        }));
    }

    #[test]
    fn test_empty_stages_use_default_sequence() {
        let profile = TaskProfile::new(TaskType::SimpleQa, Vec::<String>::new());
        let composition = compose(&profile, &registry());

        assert_eq!(ids(&composition), vec!["analyze", "retrieve", "write"]);
        assert!(composition
            .warnings
            .contains(&CompositionWarning::DefaultStagesSubstituted));
    }

    #[test]
    fn test_checkpoint_without_trigger_is_omitted() {
        let profile = TaskProfile::new(TaskType::Design, ["analyze", "design"])
            .with_checkpoints(["review_draft"]);
        let composition = compose(&profile, &registry());

        assert_eq!(ids(&composition), vec!["analyze", "design"]);
        assert!(composition
            .warnings
            .contains(&CompositionWarning::CheckpointWithoutTrigger {
                checkpoint: "review_draft".to_string()
            }));
    }

    #[test]
    fn test_iterating_profile_keeps_repeats() {
        let profile = TaskProfile::new(TaskType::Implementation, ["write", "write"])
            .with_checkpoints(["review_draft"])
            .with_iteration(true);
        let composition = compose(&profile, &registry());
        assert_eq!(
            ids(&composition),
            vec!["write", "review_draft", "write#2", "review_draft#2"]
        );
        assert!(composition.graph.validate().is_ok());
    }

    #[test]
    fn test_compose_is_deterministic() {
        let profile = TaskProfile::new(TaskType::Research, ["retrieve", "analyze", "write"])
            .with_checkpoints(["review_retrieval", "review_draft"]);
        let registry = registry();
        assert_eq!(compose(&profile, &registry), compose(&profile, &registry));
    }
}
