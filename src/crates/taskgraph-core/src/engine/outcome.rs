use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskgraph_checkpoint::{SessionId, SessionStatus};

use crate::graph::NodeId;
use crate::profile::{CheckpointId, CompositionWarning, StageId};
use crate::suspension::Suspension;

/// Why a run ended in `FAILED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A stage handler returned an error, panicked, or was missing
    StageHandlerError,
    /// A stage kept requesting iterations past the ceiling
    IterationLimitExceeded,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::StageHandlerError => "stage_handler_error",
            FailureReason::IterationLimitExceeded => "iteration_limit_exceeded",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail of a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub reason: FailureReason,
    pub stage: StageId,
    pub node_id: NodeId,
    pub message: String,
}

/// What `start`, `resume` and `run_task` return
///
/// Always a status plus one of: an output, a suspension marker, or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub session_id: SessionId,

    pub status: SessionStatus,

    /// Checkpoint the run is paused at (`SUSPENDED` only)
    pub suspended_at: Option<CheckpointId>,

    /// Suspension record with the review payload (`SUSPENDED` only)
    pub suspension: Option<Suspension>,

    /// Accumulated context (`COMPLETED`, `FAILED`, `CANCELLED`)
    pub output: Option<Value>,

    /// Failure detail (`FAILED` only)
    pub error: Option<RunFailure>,

    /// Recoverable problems from resolution and composition
    #[serde(default)]
    pub warnings: Vec<CompositionWarning>,
}

impl RunOutcome {
    pub(crate) fn finished(session_id: SessionId, status: SessionStatus, output: Value) -> Self {
        Self {
            session_id,
            status,
            suspended_at: None,
            suspension: None,
            output: Some(output),
            error: None,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn failed(session_id: SessionId, output: Value, failure: RunFailure) -> Self {
        Self {
            error: Some(failure),
            ..Self::finished(session_id, SessionStatus::Failed, output)
        }
    }

    pub(crate) fn suspended(session_id: SessionId, suspension: Suspension) -> Self {
        Self {
            session_id,
            status: SessionStatus::Suspended,
            suspended_at: Some(suspension.checkpoint.clone()),
            suspension: Some(suspension),
            output: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.status == SessionStatus::Suspended
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Review payload of a suspended run
    pub fn review(&self) -> Option<&Value> {
        self.suspension.as_ref().map(|s| &s.review)
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.error.as_ref().map(|e| e.reason)
    }
}

/// Answer produced by [`ExecutionEngine::ask`](crate::ExecutionEngine::ask)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Most recently completed stage, if any
    pub stage: Option<StageId>,
    /// Context keys the answer was built from
    pub keys: Vec<String>,
}
