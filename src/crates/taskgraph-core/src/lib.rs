//! # taskgraph-core - Task-Driven Pipeline Composition
//!
//! Decides which processing stages a task needs, in what order, and where a human
//! must review the work, then runs the resulting pipeline straight through or
//! pauses and resumes it across process boundaries.
//!
//! ## Data flow
//!
//! ```text
//! description ──► ProfileResolver ──► TaskProfile
//!                                         │ compose (pure)
//!                                         ▼
//!                                   ComposedGraph ──► compile ──► CompiledPipeline
//!                                                                     │
//!                      CheckpointStore ◄── suspend ── ExecutionEngine ┘
//!                            │                             ▲
//!                            └──────── take on resume ─────┘
//! ```
//!
//! ## Core Concepts
//!
//! - **Stage**: a named, pluggable async handler. It receives the context map and
//!   returns a partial update ([`StageOutput`]). Registered in a [`StageRegistry`].
//! - **Checkpoint**: a named suspension point. The registry's trigger map decides
//!   which stage it may follow (`retrieve → review_retrieval`, `write → review_draft`).
//! - **Task Profile**: the blueprint ([`TaskProfile`]) produced by a resolver.
//! - **Compiled Pipeline**: the validated linear chain ([`CompiledPipeline`]). It is
//!   plain data, deterministic for identical inputs, and cached per profile.
//! - **Session**: one run of a pipeline, identified by a session id. Suspended
//!   sessions are persisted in a `taskgraph_checkpoint::CheckpointStore`.
//!
//! Human-review mode does not change the compiled structure. It selects, per run,
//! whether checkpoint nodes suspend or pass through.
//!
//! ## Quick Start
//!
//! ```rust
//! use taskgraph_core::{ExecutionEngine, KeywordProfileResolver, StageRegistry};
//! use taskgraph_core::context::{ContextMap, StageOutput};
//! use taskgraph_checkpoint::SessionStatus;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = StageRegistry::new();
//! registry.register_stage("analyze", |ctx| async move {
//!     let task = ctx.get("task").cloned().unwrap_or_default();
//!     Ok(StageOutput::empty().with("analysis", json!({ "task": task })))
//! });
//! registry.register_stage("write", |_ctx| async move {
//!     Ok(StageOutput::empty().with("answer", json!("42")))
//! });
//!
//! let engine = ExecutionEngine::new(registry);
//! let outcome = engine
//!     .run_task(&KeywordProfileResolver::new(), "What is the answer?", ContextMap::new())
//!     .await?;
//!
//! assert_eq!(outcome.status, SessionStatus::Completed);
//! assert_eq!(outcome.output.unwrap()["answer"], "42");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`profile`] - task profiles, sanitisation, composition warnings
//! - [`registry`] - stage/checkpoint handlers and the trigger map
//! - [`resolver`] - resolver boundary, keyword resolver, response parsing
//! - [`composer`] - profile → node/edge list
//! - [`compiled`] - validation, compiled pipelines, pipeline cache
//! - [`engine`] - start / resume / ask
//! - [`config`] - YAML engine configuration
//! - [`visualization`] - Mermaid and ASCII rendering

pub mod compiled;
pub mod composer;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod profile;
pub mod registry;
pub mod resolver;
pub mod suspension;
pub mod visualization;

pub use compiled::{compile, compile_composition, CompiledPipeline, PipelineCache};
pub use composer::{compose, Composition};
pub use config::{
    CheckpointBackend, CheckpointConfig, EngineConfig, DEFAULT_RETAINED_SESSIONS,
    MAX_ITERATIONS_CEILING,
};
pub use context::{
    ContextMap, ExecutionContext, StageError, StageFailure, StageOutput, ERRORS_KEY,
};
pub use engine::{Answer, ExecutionEngine, FailureReason, RunFailure, RunOutcome};
pub use error::{PipelineError, Result};
pub use graph::{ComposedGraph, GraphNode, NodeId, NodeKind, END, START};
pub use profile::{
    CheckpointId, Complexity, CompositionWarning, StageId, TaskProfile, TaskType, DEFAULT_STAGES,
};
pub use registry::{RegistryError, StageRegistry};
pub use resolver::{
    parse_profile_response, resolve_profile, KeywordProfileResolver, ProfileResolver,
    Resolution, ResolveError, StaticProfileResolver,
};
pub use suspension::{ReviewDecision, Suspension};
pub use visualization::{VisualizationFormat, VisualizationOptions};
