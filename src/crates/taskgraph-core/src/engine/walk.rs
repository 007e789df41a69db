//! Node walk
//!
//! One stage handler runs at a time; the context has a single writer. Handler
//! errors and panics are caught here and turned into a `FAILED` outcome with the
//! failure appended to the context's error list.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use taskgraph_checkpoint::{SessionState, SessionStatus};

use super::outcome::{FailureReason, RunFailure, RunOutcome};
use super::ExecutionEngine;
use crate::compiled::CompiledPipeline;
use crate::context::{ExecutionContext, StageFailure, StageOutput};
use crate::error::{PipelineError, Result};
use crate::graph::{GraphNode, NodeId, NodeKind};
use crate::registry::default_checkpoint_handler;
use crate::suspension::{Suspension, SUSPENSION_METADATA_KEY};

/// Live state of one session while it is being walked
pub(super) struct Run {
    pub state: SessionState,
    pub context: ExecutionContext,
    pub suspension: BTreeSet<NodeId>,
}

enum StageStep {
    Continue,
    Failed(RunFailure),
}

impl ExecutionEngine {
    /// Walk `pipeline` from node `from` until it completes, fails or suspends
    pub(super) async fn walk(
        &self,
        pipeline: &CompiledPipeline,
        mut run: Run,
        from: NodeId,
    ) -> Result<RunOutcome> {
        let session_id = run.state.session_id.clone();
        let mut current = from;

        while !pipeline.is_terminal(&current) {
            let node = pipeline.node(&current).cloned().ok_or_else(|| {
                PipelineError::Validation(format!(
                    "session {} points at unknown node {}",
                    session_id, current
                ))
            })?;

            match node.kind {
                NodeKind::Stage => {
                    if let StageStep::Failed(failure) =
                        self.run_stage(pipeline, &node, &mut run.context).await
                    {
                        tracing::warn!(
                            session_id = %session_id,
                            stage = %failure.stage,
                            reason = %failure.reason,
                            error = %failure.message,
                            "session failed"
                        );
                        self.record(&session_id, SessionStatus::Failed).await;
                        return Ok(RunOutcome::failed(
                            session_id,
                            run.context.output(),
                            failure,
                        ));
                    }
                }
                NodeKind::Checkpoint if run.suspension.contains(&node.id) => {
                    return self.suspend(pipeline, &node, run).await;
                }
                NodeKind::Checkpoint => {
                    tracing::debug!(session_id = %session_id, checkpoint = %node.name, "checkpoint passed through");
                }
            }

            current = node.successor;
        }

        tracing::info!(session_id = %session_id, stages = run.context.history.len(), "session completed");
        self.record(&session_id, SessionStatus::Completed).await;
        Ok(RunOutcome::finished(
            session_id,
            SessionStatus::Completed,
            run.context.output(),
        ))
    }

    /// Run one stage node, repeating it while it asks to iterate
    async fn run_stage(
        &self,
        pipeline: &CompiledPipeline,
        node: &GraphNode,
        context: &mut ExecutionContext,
    ) -> StageStep {
        let max_runs = self.config.effective_max_iterations();
        let mut iteration = 0u32;

        loop {
            iteration += 1;
            tracing::debug!(stage = %node.name, node_id = %node.id, iteration, "running stage");

            let output = match self.call_handler(node, context).await {
                Ok(output) => output,
                Err(failure) => {
                    let run_failure = RunFailure {
                        reason: FailureReason::StageHandlerError,
                        stage: failure.stage.clone(),
                        node_id: failure.node_id.clone(),
                        message: failure.message.clone(),
                    };
                    context.record_failure(failure);
                    return StageStep::Failed(run_failure);
                }
            };

            let wants_more = output.iterate;
            context.apply(&node.name, &node.id, output.update, iteration);

            if !wants_more {
                return StageStep::Continue;
            }
            if !pipeline.allow_iteration() {
                tracing::debug!(stage = %node.name, "iteration requested but not allowed, continuing");
                return StageStep::Continue;
            }
            if iteration >= max_runs {
                let message = format!(
                    "stage '{}' requested another iteration after {} runs",
                    node.name, iteration
                );
                context.record_failure(StageFailure::new(
                    node.name.clone(),
                    node.id.clone(),
                    "iteration_limit",
                    message.clone(),
                ));
                return StageStep::Failed(RunFailure {
                    reason: FailureReason::IterationLimitExceeded,
                    stage: node.name.clone(),
                    node_id: node.id.clone(),
                    message,
                });
            }
        }
    }

    /// Invoke the handler for `node`, converting every failure mode into a `StageFailure`
    async fn call_handler(
        &self,
        node: &GraphNode,
        context: &ExecutionContext,
    ) -> std::result::Result<StageOutput, StageFailure> {
        let handler = self.registry.stage_handler(&node.name).map_err(|e| {
            StageFailure::new(node.name.clone(), node.id.clone(), "missing_handler", e.to_string())
        })?;

        match AssertUnwindSafe(handler(context.values.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => Err(StageFailure::from_stage_error(&node.name, &node.id, &error)),
            Err(panic) => Err(StageFailure::new(
                node.name.clone(),
                node.id.clone(),
                "panic",
                format!("stage panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }

    /// Persist the session at checkpoint `node` and return `SUSPENDED`
    async fn suspend(
        &self,
        pipeline: &CompiledPipeline,
        node: &GraphNode,
        mut run: Run,
    ) -> Result<RunOutcome> {
        let builder = self
            .registry
            .checkpoint_handler(&node.name)
            .unwrap_or_else(|_| default_checkpoint_handler(node.name.clone()));
        let review = builder(&run.context);

        let session_id = run.state.session_id.clone();
        let suspension = Suspension::new(
            session_id.clone(),
            node.name.clone(),
            node.id.clone(),
            node.successor.clone(),
            review,
        );

        run.state.pipeline = pipeline.to_value()?;
        run.state.suspend(&node.name, &node.successor, run.context.to_value()?);
        run.state
            .metadata
            .insert(SUSPENSION_METADATA_KEY.to_string(), serde_json::to_value(&suspension)?);

        self.store.put(run.state).await?;
        self.record(&session_id, SessionStatus::Suspended).await;
        tracing::info!(
            session_id = %session_id,
            checkpoint = %node.name,
            resume_at = %node.successor,
            "session suspended for review"
        );

        Ok(RunOutcome::suspended(session_id, suspension))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
