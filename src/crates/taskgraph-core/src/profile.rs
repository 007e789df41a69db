//! Task profiles: the blueprint a pipeline is composed from
//!
//! A [`TaskProfile`] is produced by a [`ProfileResolver`](crate::resolver::ProfileResolver)
//! and is immutable afterwards. Before composition it is sanitised against the
//! registry ([`TaskProfile::sanitize`]); everything that can be repaired is repaired
//! and reported as a [`CompositionWarning`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::StageRegistry;

/// Registry key of a stage
pub type StageId = String;

/// Registry key of a checkpoint
pub type CheckpointId = String;

/// Stage sequence used when a profile has none
pub const DEFAULT_STAGES: [&str; 3] = ["analyze", "retrieve", "write"];

/// Rationale attached to the Default Profile
pub const FALLBACK_RATIONALE: &str = "fallback";

/// Confidence attached to the Default Profile
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Kind of task being handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    SimpleQa,
    Implementation,
    Design,
    Integration,
    Debugging,
    Documentation,
    Research,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::SimpleQa,
        TaskType::Implementation,
        TaskType::Design,
        TaskType::Integration,
        TaskType::Debugging,
        TaskType::Documentation,
        TaskType::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SimpleQa => "simple_qa",
            TaskType::Implementation => "implementation",
            TaskType::Design => "design",
            TaskType::Integration => "integration",
            TaskType::Debugging => "debugging",
            TaskType::Documentation => "documentation",
            TaskType::Research => "research",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated task complexity
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_confidence() -> f64 {
    FALLBACK_CONFIDENCE
}

/// Classifier output describing how to assemble a pipeline for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    pub task_type: TaskType,

    #[serde(default)]
    pub complexity: Complexity,

    /// Ordered stage sequence
    #[serde(default)]
    pub stages: Vec<StageId>,

    /// Requested checkpoints
    #[serde(default)]
    pub checkpoints: BTreeSet<CheckpointId>,

    #[serde(default)]
    pub knowledge_scope: Vec<String>,

    /// Carried through to the compiled pipeline; rejection is still terminal
    #[serde(default)]
    pub allow_rewrite: bool,

    /// Stages may request to run again (bounded by the iteration ceiling)
    #[serde(default)]
    pub allow_iteration: bool,

    /// Classifier confidence in `[0, 1]`
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    #[serde(default)]
    pub rationale: String,
}

impl TaskProfile {
    /// A profile with the given stages and neutral defaults for everything else
    pub fn new<I, S>(task_type: TaskType, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StageId>,
    {
        Self {
            task_type,
            complexity: Complexity::default(),
            stages: stages.into_iter().map(Into::into).collect(),
            checkpoints: BTreeSet::new(),
            knowledge_scope: Vec::new(),
            allow_rewrite: false,
            allow_iteration: false,
            confidence: FALLBACK_CONFIDENCE,
            rationale: String::new(),
        }
    }

    /// Fixed profile substituted when the resolver fails
    ///
    /// Three stages, no checkpoints, confidence 0.5, rationale "fallback".
    pub fn default_profile() -> Self {
        let mut profile = Self::new(TaskType::SimpleQa, DEFAULT_STAGES);
        profile.complexity = Complexity::Simple;
        profile.rationale = FALLBACK_RATIONALE.to_string();
        profile
    }

    pub fn with_checkpoints<I, S>(mut self, checkpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CheckpointId>,
    {
        self.checkpoints = checkpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_iteration(mut self, allow: bool) -> Self {
        self.allow_iteration = allow;
        self
    }

    pub fn with_rewrite(mut self, allow: bool) -> Self {
        self.allow_rewrite = allow;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_knowledge_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.knowledge_scope = scope.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this profile is the resolver fallback
    pub fn is_fallback(&self) -> bool {
        self.rationale == FALLBACK_RATIONALE
    }

    /// Canonical JSON used for pipeline ids and cache keys
    ///
    /// Field order is fixed by the struct and checkpoints are a sorted set, so equal
    /// profiles always produce equal strings.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// Repair the profile against `registry`
    ///
    /// - stage ids the registry does not know are dropped
    /// - checkpoint ids the registry does not know are dropped
    /// - adjacent duplicate stages collapse into one unless iteration is allowed
    /// - confidence is clamped into `[0, 1]` (NaN becomes 0)
    ///
    /// An empty stage sequence is left empty; the composer substitutes the default.
    pub fn sanitize(&self, registry: &StageRegistry) -> (TaskProfile, Vec<CompositionWarning>) {
        let mut warnings = Vec::new();
        let mut profile = self.clone();

        let mut stages: Vec<StageId> = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            if !registry.has_stage(stage) {
                warnings.push(CompositionWarning::UnknownStage {
                    stage: stage.clone(),
                });
                continue;
            }
            if !self.allow_iteration && stages.last() == Some(stage) {
                warnings.push(CompositionWarning::DuplicateStageCollapsed {
                    stage: stage.clone(),
                });
                continue;
            }
            stages.push(stage.clone());
        }
        profile.stages = stages;

        profile.checkpoints = self
            .checkpoints
            .iter()
            .filter(|checkpoint| {
                let known = registry.has_checkpoint(checkpoint);
                if !known {
                    warnings.push(CompositionWarning::UnknownCheckpoint {
                        checkpoint: (*checkpoint).clone(),
                    });
                }
                known
            })
            .cloned()
            .collect();

        if !(0.0..=1.0).contains(&self.confidence) {
            let clamped = if self.confidence.is_nan() {
                0.0
            } else {
                self.confidence.clamp(0.0, 1.0)
            };
            warnings.push(CompositionWarning::ConfidenceClamped {
                original: self.confidence,
                clamped,
            });
            profile.confidence = clamped;
        }

        for warning in &warnings {
            tracing::warn!(%warning, "profile repaired");
        }
        (profile, warnings)
    }
}

impl Default for TaskProfile {
    fn default() -> Self {
        Self::default_profile()
    }
}

/// Recoverable problem found while turning a profile into a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositionWarning {
    /// Stage id unknown to the registry; dropped
    UnknownStage { stage: StageId },

    /// Checkpoint id unknown to the registry; dropped
    UnknownCheckpoint { checkpoint: CheckpointId },

    /// Adjacent duplicate stage removed (iteration not allowed)
    DuplicateStageCollapsed { stage: StageId },

    /// Confidence outside `[0, 1]`
    ConfidenceClamped { original: f64, clamped: f64 },

    /// No usable stages; the default sequence was substituted
    DefaultStagesSubstituted,

    /// Requested checkpoint whose trigger stage is not in the sequence; omitted
    CheckpointWithoutTrigger { checkpoint: CheckpointId },

    /// The resolver failed and the Default Profile was used
    FallbackProfile { reason: String },
}

impl fmt::Display for CompositionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositionWarning::UnknownStage { stage } => {
                write!(f, "unknown stage '{}' dropped", stage)
            }
            CompositionWarning::UnknownCheckpoint { checkpoint } => {
                write!(f, "unknown checkpoint '{}' dropped", checkpoint)
            }
            CompositionWarning::DuplicateStageCollapsed { stage } => {
                write!(f, "adjacent duplicate stage '{}' collapsed", stage)
            }
            CompositionWarning::ConfidenceClamped { original, clamped } => {
                write!(f, "confidence {} clamped to {}", original, clamped)
            }
            CompositionWarning::DefaultStagesSubstituted => {
                write!(f, "empty stage sequence replaced by the default")
            }
            CompositionWarning::CheckpointWithoutTrigger { checkpoint } => {
                write!(f, "checkpoint '{}' has no trigger stage in the sequence", checkpoint)
            }
            CompositionWarning::FallbackProfile { reason } => {
                write!(f, "profile resolution failed, using fallback: {}", reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageOutput;

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        for stage in ["analyze", "retrieve", "write"] {
            registry.register_stage(stage, |_ctx| async { Ok(StageOutput::empty()) });
        }
        registry
    }

    #[test]
    fn test_default_profile_shape() {
        let profile = TaskProfile::default_profile();
        assert_eq!(profile.stages, vec!["analyze", "retrieve", "write"]);
        assert!(profile.checkpoints.is_empty());
        assert_eq!(profile.confidence, 0.5);
        assert_eq!(profile.rationale, "fallback");
        assert!(profile.is_fallback());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let profile: TaskProfile = serde_json::from_str(
            r#"{"task_type": "debugging", "stages": ["analyze"], "checkpoints": ["review_draft"]}"#,
        )
        .unwrap();
        assert_eq!(profile.task_type, TaskType::Debugging);
        assert_eq!(profile.complexity, Complexity::Medium);
        assert_eq!(profile.confidence, 0.5);
        assert!(profile.checkpoints.contains("review_draft"));
    }

    #[test]
    fn test_sanitize_drops_unknown_ids() {
        let profile = TaskProfile::new(TaskType::Research, ["analyze", "nonexistent_stage", "write"])
            .with_checkpoints(["review_draft", "review_code"]);

        let (clean, warnings) = profile.sanitize(&registry());
        assert_eq!(clean.stages, vec!["analyze", "write"]);
        assert_eq!(clean.checkpoints.len(), 1);
        assert!(warnings.contains(&CompositionWarning::UnknownStage {
            stage: "nonexistent_stage".to_string()
        }));
        assert!(warnings.contains(&CompositionWarning::UnknownCheckpoint {
            checkpoint: "review_code".to_string()
        }));
    }

    #[test]
    fn test_sanitize_collapses_duplicates_unless_iterating() {
        let profile = TaskProfile::new(TaskType::Design, ["analyze", "analyze", "write"]);
        let (clean, warnings) = profile.sanitize(&registry());
        assert_eq!(clean.stages, vec!["analyze", "write"]);
        assert_eq!(warnings.len(), 1);

        let (clean, warnings) = profile.with_iteration(true).sanitize(&registry());
        assert_eq!(clean.stages, vec!["analyze", "analyze", "write"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_sanitize_clamps_confidence() {
        let (clean, _) = TaskProfile::default_profile()
            .with_confidence(1.7)
            .sanitize(&registry());
        assert_eq!(clean.confidence, 1.0);

        let (clean, warnings) = TaskProfile::default_profile()
            .with_confidence(f64::NAN)
            .sanitize(&registry());
        assert_eq!(clean.confidence, 0.0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = TaskProfile::new(TaskType::Implementation, ["analyze", "write"])
            .with_checkpoints(["review_draft", "review_retrieval"]);
        let b = TaskProfile::new(TaskType::Implementation, ["analyze", "write"])
            .with_checkpoints(["review_retrieval", "review_draft"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), a.clone().with_iteration(true).fingerprint());
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = CompositionWarning::UnknownStage {
            stage: "x".to_string(),
        };
        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["kind"], "unknown_stage");
        assert_eq!(warning.to_string(), "unknown stage 'x' dropped");
    }
}
