//! Session state data structures
//!
//! A [`SessionState`] is the record of one execution of a compiled pipeline. The
//! execution engine owns it while the session runs; it only reaches a
//! [`CheckpointStore`](crate::CheckpointStore) when the session is suspended at a
//! human-review checkpoint.
//!
//! # Lifecycle
//!
//! ```text
//!   Running ──► Suspended ──(approve)──► Running
//!      │            │
//!      │            └──(reject)──► Cancelled
//!      ├──► Completed
//!      └──► Failed
//! ```
//!
//! `Completed`, `Cancelled` and `Failed` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Session identifier
pub type SessionId = String;

/// Execution status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Stages are being executed
    Running,
    /// Paused at a checkpoint, waiting for approval
    Suspended,
    /// Reached the terminal node
    Completed,
    /// Rejected by the reviewer
    Cancelled,
    /// A stage failed or the iteration limit was exceeded
    Failed,
}

impl SessionStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Failed
        )
    }

    /// Whether the session state machine permits moving from `self` to `next`
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Running, Suspended)
                | (Running, Completed)
                | (Running, Failed)
                | (Suspended, Running)
                | (Suspended, Cancelled)
        )
    }

    /// Lowercase name used in logs and serialized records
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Suspended => "suspended",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one pipeline execution
///
/// The context and the compiled pipeline are kept as opaque JSON so this crate stays
/// independent of the engine's types. Embedding the pipeline lets another process,
/// holding an equivalent stage registry, resume the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Record format version
    pub v: i32,

    /// Unique session identifier
    pub session_id: SessionId,

    /// Current status
    pub status: SessionStatus,

    /// Node to execute next (the terminal sentinel when nothing is left)
    pub current_node: String,

    /// Checkpoint the session is suspended at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<String>,

    /// Whether checkpoint nodes pause this run
    pub human_review: bool,

    /// Execution context snapshot
    pub context: serde_json::Value,

    /// Serialized compiled pipeline
    pub pipeline: serde_json::Value,

    /// When execution started
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SessionState {
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a running session positioned at `entry`
    pub fn new(
        session_id: impl Into<SessionId>,
        entry: impl Into<String>,
        human_review: bool,
        pipeline: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            v: Self::CURRENT_VERSION,
            session_id: session_id.into(),
            status: SessionStatus::Running,
            current_node: entry.into(),
            suspended_at: None,
            human_review,
            context: serde_json::Value::Object(serde_json::Map::new()),
            pipeline,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Mark the session suspended at `checkpoint`, to continue at `next_node`
    pub fn suspend(
        &mut self,
        checkpoint: impl Into<String>,
        next_node: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.status = SessionStatus::Suspended;
        self.suspended_at = Some(checkpoint.into());
        self.current_node = next_node.into();
        self.context = context;
        self.updated_at = Utc::now();
    }

    /// Set a new status and bump `updated_at`
    pub fn set_status(&mut self, status: SessionStatus) {
        if status != SessionStatus::Suspended {
            self.suspended_at = None;
        }
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn is_suspended(&self) -> bool {
        self.status == SessionStatus::Suspended
    }
}
