//! Execution engine: walks compiled pipelines, suspends and resumes sessions
//!
//! # State machine
//!
//! ```text
//!            start
//!              │
//!              ▼
//!          RUNNING ──────────► COMPLETED
//!           │   ▲  │
//!  checkpoint│   │  └────────► FAILED      (stage error, iteration limit)
//!  in set    ▼   │ approve
//!          SUSPENDED ────────► CANCELLED   (reject)
//! ```
//!
//! `COMPLETED`, `CANCELLED` and `FAILED` are terminal. Only `SUSPENDED` sessions live
//! in the [`CheckpointStore`]; they are written on suspension and claimed with
//! [`CheckpointStore::take`] on resume, so of two concurrent `resume` calls exactly
//! one proceeds.
//!
//! # Example
//!
//! ```rust
//! use taskgraph_core::{compile, ExecutionEngine, StageRegistry, TaskProfile, TaskType};
//! use taskgraph_core::context::StageOutput;
//! use taskgraph_checkpoint::SessionStatus;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = StageRegistry::new();
//! registry.register_stage("analyze", |_ctx| async { Ok(StageOutput::empty().with("analysis", json!("ok"))) });
//! registry.register_stage("write", |_ctx| async { Ok(StageOutput::empty().with("draft", json!("text"))) });
//!
//! let profile = TaskProfile::new(TaskType::Documentation, ["analyze", "write"])
//!     .with_checkpoints(["review_draft"]);
//! let pipeline = compile(&profile, &registry)?;
//!
//! let engine = ExecutionEngine::new(registry);
//! let outcome = engine.start(&pipeline, true).await?;
//! assert_eq!(outcome.status, SessionStatus::Suspended);
//! assert_eq!(outcome.suspended_at.as_deref(), Some("review_draft"));
//!
//! let outcome = engine.resume(&outcome.session_id, true, None).await?;
//! assert_eq!(outcome.status, SessionStatus::Completed);
//! assert_eq!(outcome.output.unwrap()["draft"], "text");
//! # Ok(())
//! # }
//! ```

mod ask;
mod ledger;
mod outcome;
mod walk;

pub use outcome::{Answer, FailureReason, RunFailure, RunOutcome};

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use taskgraph_checkpoint::{
    CheckpointStore, InMemoryCheckpointStore, SessionId, SessionState, SessionStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::compiled::{CompiledPipeline, PipelineCache};
use crate::config::EngineConfig;
use crate::context::{ContextMap, ExecutionContext};
use crate::error::{PipelineError, Result};
use crate::graph::NodeId;
use crate::profile::TaskProfile;
use crate::registry::StageRegistry;
use crate::resolver::{resolve_profile, ProfileResolver};
use crate::suspension::{ReviewDecision, FEEDBACK_KEY};

use ledger::SessionLedger;
use walk::Run;

/// Runs compiled pipelines against a registry and a checkpoint store
pub struct ExecutionEngine {
    registry: Arc<StageRegistry>,
    store: Arc<dyn CheckpointStore>,
    config: EngineConfig,
    cache: PipelineCache,
    /// Last known status of sessions run by this engine
    ledger: RwLock<SessionLedger>,
}

impl ExecutionEngine {
    /// Engine with an in-memory store and default configuration
    pub fn new(registry: StageRegistry) -> Self {
        Self::with_store(registry, Arc::new(InMemoryCheckpointStore::new()))
    }

    /// Engine with a caller-provided store
    pub fn with_store(registry: StageRegistry, store: Arc<dyn CheckpointStore>) -> Self {
        let config = EngineConfig::default();
        Self {
            registry: Arc::new(registry),
            store,
            ledger: RwLock::new(SessionLedger::new(config.retained_sessions)),
            config,
            cache: PipelineCache::new(),
        }
    }

    /// Engine whose store is built from `config`
    pub async fn from_config(registry: StageRegistry, config: EngineConfig) -> Result<Self> {
        let config = config.validated()?;
        let store = config.build_store().await?;
        Ok(Self::with_store(registry, store).with_config(config))
    }

    /// Replace the configuration (the store is kept)
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.ledger.get_mut().set_retain(config.retained_sessions);
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Compile `profile`, reusing the cached pipeline for identical profiles
    pub fn compile(&self, profile: &TaskProfile) -> Result<Arc<CompiledPipeline>> {
        self.cache.get_or_compile(profile, &self.registry)
    }

    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    /// Start a new session with an empty context
    pub async fn start(&self, pipeline: &CompiledPipeline, human_review: bool) -> Result<RunOutcome> {
        self.start_with_context(pipeline, human_review, ContextMap::new())
            .await
    }

    /// Start a new session seeded with `initial` context values
    pub async fn start_with_context(
        &self,
        pipeline: &CompiledPipeline,
        human_review: bool,
        initial: ContextMap,
    ) -> Result<RunOutcome> {
        let session_id = Uuid::new_v4().to_string();
        let state = SessionState::new(session_id.clone(), pipeline.entry.clone(), human_review, Value::Null);

        tracing::info!(
            session_id = %session_id,
            pipeline_id = %pipeline.id,
            human_review,
            "starting session"
        );
        self.record(&session_id, SessionStatus::Running).await;

        let run = Run {
            state,
            context: ExecutionContext::with_values(initial),
            suspension: pipeline.suspension_set(human_review),
        };
        self.drive(pipeline, run, pipeline.entry.clone()).await
    }

    /// Continue or cancel a suspended session
    ///
    /// Fails with [`PipelineError::InvalidStateTransition`] unless the session is
    /// suspended in the store. On approval, `feedback` is merged into the context
    /// under `human_feedback` and the walk continues after the checkpoint.
    ///
    /// A claimed record that cannot be loaded is put back, so the session stays
    /// suspended. An error after the walk has started leaves the session `FAILED`.
    pub async fn resume(
        &self,
        session_id: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<RunOutcome> {
        let Some(mut state) = self.store.take(session_id).await? else {
            let current = match self.status_in_ledger(session_id).await {
                // claimed by a concurrent resume that has not finished yet
                Some(SessionStatus::Suspended) => Some(SessionStatus::Running),
                other => other,
            };
            return Err(PipelineError::invalid_transition(session_id, current, "resume"));
        };

        if !state.is_suspended() {
            return Err(PipelineError::invalid_transition(
                session_id,
                Some(state.status),
                "resume",
            ));
        }

        let loaded = CompiledPipeline::from_value(state.pipeline.clone()).and_then(|pipeline| {
            ExecutionContext::from_value(state.context.clone()).map(|context| (pipeline, context))
        });
        let (pipeline, mut context) = match loaded {
            Ok(loaded) => loaded,
            Err(error) => return Err(self.release(state, error.into()).await),
        };
        let checkpoint = state.suspended_at.clone().unwrap_or_default();

        if !approved {
            state.set_status(SessionStatus::Cancelled);
            self.record(session_id, SessionStatus::Cancelled).await;
            tracing::info!(session_id, %checkpoint, "session rejected at checkpoint, cancelled");
            let mut outcome =
                RunOutcome::finished(state.session_id, SessionStatus::Cancelled, context.output());
            outcome.warnings = pipeline.warnings.clone();
            return Ok(outcome);
        }

        if let Some(feedback) = feedback {
            context.insert(FEEDBACK_KEY, Value::String(feedback));
        }
        state.set_status(SessionStatus::Running);
        self.record(session_id, SessionStatus::Running).await;
        tracing::info!(
            session_id,
            %checkpoint,
            resume_at = %state.current_node,
            "session approved, resuming"
        );

        let from = state.current_node.clone();
        let run = Run {
            suspension: pipeline.suspension_set(state.human_review),
            state,
            context,
        };
        self.drive(&pipeline, run, from).await
    }

    /// [`resume`](Self::resume) taking a [`ReviewDecision`]
    pub async fn review(&self, session_id: &str, decision: ReviewDecision) -> Result<RunOutcome> {
        let (approved, feedback) = decision.into_parts();
        self.resume(session_id, approved, feedback).await
    }

    /// Resolve, compile (cached) and start a task in the configured review mode
    ///
    /// The description is added to the context as `task` unless already present.
    pub async fn run_task(
        &self,
        resolver: &dyn ProfileResolver,
        description: &str,
        mut context: ContextMap,
    ) -> Result<RunOutcome> {
        let resolution =
            resolve_profile(resolver, description, &context, self.config.resolver_timeout()).await;
        let pipeline = self.compile(&resolution.profile)?;

        context
            .entry("task")
            .or_insert_with(|| Value::String(description.to_string()));

        let mut outcome = self
            .start_with_context(&pipeline, self.config.human_review, context)
            .await?;
        if let Some(warning) = resolution.fallback {
            outcome.warnings.insert(0, warning);
        }
        Ok(outcome)
    }

    /// Last known status of a session
    ///
    /// Sessions started by another engine are reported as suspended while their
    /// record is in the shared store.
    pub async fn status(&self, session_id: &str) -> Result<Option<SessionStatus>> {
        if let Some(status) = self.status_in_ledger(session_id).await {
            return Ok(Some(status));
        }
        if self.store.contains(session_id).await? {
            return Ok(Some(SessionStatus::Suspended));
        }
        Ok(None)
    }

    /// Ids of all sessions currently suspended in the store
    pub async fn suspended_sessions(&self) -> Result<Vec<SessionId>> {
        let mut stream = self.store.list().await?;
        let mut ids = Vec::new();
        while let Some(state) = stream.next().await {
            ids.push(state?.session_id);
        }
        Ok(ids)
    }

    /// Walk, then attach the pipeline's warnings; a walk error marks the session failed
    async fn drive(
        &self,
        pipeline: &CompiledPipeline,
        run: Run,
        from: NodeId,
    ) -> Result<RunOutcome> {
        let session_id = run.state.session_id.clone();
        match self.walk(pipeline, run, from).await {
            Ok(mut outcome) => {
                outcome.warnings = pipeline.warnings.clone();
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!(session_id = %session_id, error = %error, "session aborted");
                self.record(&session_id, SessionStatus::Failed).await;
                Err(error)
            }
        }
    }

    /// Put back a record claimed by `resume` that could not be loaded
    async fn release(&self, state: SessionState, error: PipelineError) -> PipelineError {
        let session_id = state.session_id.clone();
        match self.store.put(state).await {
            Ok(()) => {
                tracing::warn!(session_id = %session_id, error = %error, "suspended session could not be loaded, record restored");
                self.record(&session_id, SessionStatus::Suspended).await;
            }
            Err(put_error) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %error,
                    restore_error = %put_error,
                    "suspended session could not be loaded or restored"
                );
                self.record(&session_id, SessionStatus::Failed).await;
            }
        }
        error
    }

    async fn status_in_ledger(&self, session_id: &str) -> Option<SessionStatus> {
        self.ledger.read().await.get(session_id)
    }

    async fn record(&self, session_id: &str, status: SessionStatus) {
        self.ledger.write().await.record(session_id, status);
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("cached_pipelines", &self.cache.len())
            .finish()
    }
}
