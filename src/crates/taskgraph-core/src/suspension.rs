//! Human-review suspension records
//!
//! When a run reaches a checkpoint node in its suspension set, the engine builds a
//! [`Suspension`]: which checkpoint paused the run, where it will continue, and the
//! payload the reviewer should look at. The record is returned to the caller and
//! kept in the stored session's metadata under [`SUSPENSION_METADATA_KEY`].
//!
//! ```text
//! analyze ─► write ─► [review_draft] ─► END
//!                          │
//!                          └─ Suspension { checkpoint: review_draft, resume_at: END, review: {...} }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::graph::NodeId;
use crate::profile::CheckpointId;

/// Metadata key holding the serialised [`Suspension`] of a stored session
pub const SUSPENSION_METADATA_KEY: &str = "suspension";

/// Context key under which reviewer feedback is merged on approval
pub const FEEDBACK_KEY: &str = "human_feedback";

/// A run paused at a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    /// Unique id of this pause
    pub suspension_id: String,

    pub session_id: String,

    /// Checkpoint (registry id) that paused the run
    pub checkpoint: CheckpointId,

    /// Checkpoint node id
    pub node_id: NodeId,

    /// Node the run continues at when approved
    pub resume_at: NodeId,

    /// Payload built by the checkpoint handler
    pub review: Value,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Suspension {
    pub fn new(
        session_id: impl Into<String>,
        checkpoint: impl Into<CheckpointId>,
        node_id: impl Into<NodeId>,
        resume_at: impl Into<NodeId>,
        review: Value,
    ) -> Self {
        Self {
            suspension_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            checkpoint: checkpoint.into(),
            node_id: node_id.into(),
            resume_at: resume_at.into(),
            review,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Reviewer's answer to a suspension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Continue the run, optionally merging feedback into the context
    Approve { feedback: Option<String> },
    /// Cancel the run
    Reject,
}

impl ReviewDecision {
    pub fn approve() -> Self {
        Self::Approve { feedback: None }
    }

    pub fn approve_with(feedback: impl Into<String>) -> Self {
        Self::Approve {
            feedback: Some(feedback.into()),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approve { .. })
    }

    /// Split into the `(approved, feedback)` pair taken by
    /// [`ExecutionEngine::resume`](crate::ExecutionEngine::resume)
    pub fn into_parts(self) -> (bool, Option<String>) {
        match self {
            Self::Approve { feedback } => (true, feedback),
            Self::Reject => (false, None),
        }
    }
}
