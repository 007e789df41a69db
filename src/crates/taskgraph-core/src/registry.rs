//! Stage & checkpoint registry
//!
//! String-keyed lookup from stage and checkpoint ids to their handlers, plus the
//! static trigger map that decides which checkpoint may follow which stage.
//!
//! ```text
//! trigger map (default)
//!   retrieve ──► review_retrieval
//!   write    ──► review_draft
//! ```
//!
//! Lookups return a typed [`RegistryError`] instead of panicking on a missing key.
//!
//! # Example
//!
//! ```rust
//! use taskgraph_core::registry::StageRegistry;
//! use taskgraph_core::context::StageOutput;
//! use serde_json::json;
//!
//! let mut registry = StageRegistry::new();
//! registry.register_stage("analyze", |ctx| async move {
//!     let task = ctx.get("task").cloned().unwrap_or_default();
//!     Ok(StageOutput::empty().with("analysis", json!({ "task": task })))
//! });
//!
//! assert!(registry.has_stage("analyze"));
//! assert_eq!(registry.trigger_for("write").map(String::as_str), Some("review_draft"));
//! assert!(registry.stage_handler("summarize").is_err());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::context::{ContextMap, ExecutionContext, StageError, StageOutput};
use crate::profile::{CheckpointId, StageId};

/// Stage that retrieves supporting material
pub const RETRIEVE_STAGE: &str = "retrieve";
/// Stage that drafts the final output
pub const WRITE_STAGE: &str = "write";
/// Checkpoint reviewing retrieved material
pub const REVIEW_RETRIEVAL: &str = "review_retrieval";
/// Checkpoint reviewing the draft
pub const REVIEW_DRAFT: &str = "review_draft";

/// Result type of a stage handler
pub type StageResult = std::result::Result<StageOutput, StageError>;

/// Boxed future returned by a stage handler
pub type StageFuture = Pin<Box<dyn Future<Output = StageResult> + Send>>;

/// Stage handler: receives a snapshot of the context values, returns a partial update
pub type StageHandler = Arc<dyn Fn(ContextMap) -> StageFuture + Send + Sync>;

/// Checkpoint handler: builds the payload shown to the human reviewer
pub type CheckpointHandler = Arc<dyn Fn(&ExecutionContext) -> Value + Send + Sync>;

/// Which table a failed lookup was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Stage,
    Checkpoint,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKind::Stage => write!(f, "Stage"),
            RegistryKind::Checkpoint => write!(f, "Checkpoint"),
        }
    }
}

/// Typed lookup failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} '{id}' is not registered")]
    NotFound { kind: RegistryKind, id: String },
}

impl RegistryError {
    pub fn stage_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: RegistryKind::Stage,
            id: id.into(),
        }
    }

    pub fn checkpoint_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: RegistryKind::Checkpoint,
            id: id.into(),
        }
    }
}

/// Default review payload: the checkpoint name plus the last stage's output
pub fn default_checkpoint_handler(checkpoint: impl Into<CheckpointId>) -> CheckpointHandler {
    let checkpoint = checkpoint.into();
    Arc::new(move |ctx: &ExecutionContext| {
        let stage = ctx.last_completed().map(|r| r.stage.clone());
        json!({
            "checkpoint": checkpoint,
            "stage": stage,
            "output": Value::Object(ctx.last_output()),
        })
    })
}

/// Registry of stage handlers, checkpoint handlers and the trigger map
#[derive(Clone)]
pub struct StageRegistry {
    stages: HashMap<StageId, StageHandler>,
    checkpoints: HashMap<CheckpointId, CheckpointHandler>,
    triggers: BTreeMap<StageId, CheckpointId>,
}

impl StageRegistry {
    /// Registry with the default trigger map and its two review checkpoints
    ///
    /// No stages are registered; callers plug in their own handlers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.set_trigger(RETRIEVE_STAGE, REVIEW_RETRIEVAL);
        registry.set_trigger(WRITE_STAGE, REVIEW_DRAFT);
        registry
    }

    /// Registry with no stages, checkpoints or triggers
    pub fn empty() -> Self {
        Self {
            stages: HashMap::new(),
            checkpoints: HashMap::new(),
            triggers: BTreeMap::new(),
        }
    }

    /// Register (or replace) a stage handler
    pub fn register_stage<F, Fut>(&mut self, id: impl Into<StageId>, handler: F) -> &mut Self
    where
        F: Fn(ContextMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult> + Send + 'static,
    {
        let handler: StageHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.stages.insert(id.into(), handler);
        self
    }

    /// Register an already boxed stage handler
    pub fn register_stage_handler(
        &mut self,
        id: impl Into<StageId>,
        handler: StageHandler,
    ) -> &mut Self {
        self.stages.insert(id.into(), handler);
        self
    }

    /// Register (or replace) a checkpoint with a custom review payload builder
    pub fn register_checkpoint<F>(&mut self, id: impl Into<CheckpointId>, handler: F) -> &mut Self
    where
        F: Fn(&ExecutionContext) -> Value + Send + Sync + 'static,
    {
        self.checkpoints.insert(id.into(), Arc::new(handler));
        self
    }

    /// Map `stage` to the checkpoint that may follow it
    ///
    /// Registers the checkpoint with the default payload builder if it is unknown.
    pub fn set_trigger(
        &mut self,
        stage: impl Into<StageId>,
        checkpoint: impl Into<CheckpointId>,
    ) -> &mut Self {
        let checkpoint = checkpoint.into();
        if !self.checkpoints.contains_key(&checkpoint) {
            self.checkpoints.insert(
                checkpoint.clone(),
                default_checkpoint_handler(checkpoint.clone()),
            );
        }
        self.triggers.insert(stage.into(), checkpoint);
        self
    }

    /// Look up a stage handler
    pub fn stage_handler(&self, id: &str) -> Result<StageHandler, RegistryError> {
        self.stages
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::stage_not_found(id))
    }

    /// Look up a checkpoint handler
    pub fn checkpoint_handler(&self, id: &str) -> Result<CheckpointHandler, RegistryError> {
        self.checkpoints
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::checkpoint_not_found(id))
    }

    pub fn has_stage(&self, id: &str) -> bool {
        self.stages.contains_key(id)
    }

    pub fn has_checkpoint(&self, id: &str) -> bool {
        self.checkpoints.contains_key(id)
    }

    /// Checkpoint triggered by `stage`, if any
    pub fn trigger_for(&self, stage: &str) -> Option<&CheckpointId> {
        self.triggers.get(stage)
    }

    /// The full trigger map
    pub fn trigger_map(&self) -> &BTreeMap<StageId, CheckpointId> {
        &self.triggers
    }

    /// Registered stage ids, sorted
    pub fn stage_ids(&self) -> Vec<StageId> {
        let mut ids: Vec<StageId> = self.stages.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registered checkpoint ids, sorted
    pub fn checkpoint_ids(&self) -> Vec<CheckpointId> {
        let mut ids: Vec<CheckpointId> = self.checkpoints.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.stage_ids())
            .field("checkpoints", &self.checkpoint_ids())
            .field("triggers", &self.triggers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry.register_stage("analyze", |_ctx| async move {
            Ok(StageOutput::empty().with("analysis", json!("done")))
        });
        registry
    }

    #[test]
    fn test_default_trigger_map() {
        let registry = StageRegistry::new();
        assert_eq!(registry.trigger_map().len(), 2);
        assert_eq!(
            registry.trigger_for("retrieve").map(String::as_str),
            Some(REVIEW_RETRIEVAL)
        );
        assert!(registry.has_checkpoint(REVIEW_DRAFT));
        assert!(registry.trigger_for("analyze").is_none());
    }

    #[test]
    fn test_empty_registry_has_nothing() {
        let registry = StageRegistry::empty();
        assert!(registry.trigger_map().is_empty());
        assert!(registry.checkpoint_ids().is_empty());
    }

    #[test]
    fn test_missing_lookups_are_typed() {
        let registry = echo_registry();
        let err = registry.stage_handler("nonexistent_stage").err().unwrap();
        assert_eq!(
            err,
            RegistryError::NotFound {
                kind: RegistryKind::Stage,
                id: "nonexistent_stage".to_string()
            }
        );
        assert_eq!(
            registry.checkpoint_handler("review_code").err().unwrap().to_string(),
            "Checkpoint 'review_code' is not registered"
        );
    }

    #[tokio::test]
    async fn test_registered_stage_runs() {
        let registry = echo_registry();
        let handler = registry.stage_handler("analyze").unwrap();
        let out = handler(ContextMap::new()).await.unwrap();
        assert_eq!(out.update["analysis"], "done");
    }

    #[test]
    fn test_default_checkpoint_payload() {
        let registry = StageRegistry::new();
        let mut ctx = ExecutionContext::new();
        ctx.apply(
            "write",
            "write",
            json!({"draft": "hello"}).as_object().cloned().unwrap(),
            1,
        );

        let payload = registry.checkpoint_handler(REVIEW_DRAFT).unwrap()(&ctx);
        assert_eq!(payload["checkpoint"], "review_draft");
        assert_eq!(payload["stage"], "write");
        assert_eq!(payload["output"]["draft"], "hello");
    }

    #[test]
    fn test_custom_trigger_registers_checkpoint() {
        let mut registry = StageRegistry::new();
        registry.set_trigger("design", "review_design");
        assert!(registry.has_checkpoint("review_design"));
        assert_eq!(
            registry.trigger_for("design").map(String::as_str),
            Some("review_design")
        );
    }
}
