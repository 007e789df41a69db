//! Error types for pipeline composition and execution
//!
//! Only conditions the caller has to act on become a [`PipelineError`]. Problems
//! the core can recover from on its own are reported differently:
//!
//! ```text
//! condition                      handling
//! ─────────────────────────────  ─────────────────────────────────────────────
//! profile resolution failure     Default Profile + CompositionWarning
//! unknown stage / checkpoint id  dropped + CompositionWarning
//! stage handler error            RunOutcome { status: failed, StageHandlerError }
//! iteration limit exceeded       RunOutcome { status: failed, IterationLimitExceeded }
//! resume of a non-suspended run  PipelineError::InvalidStateTransition
//! ```
//!
//! # Matching Errors
//!
//! ```rust
//! use taskgraph_core::error::PipelineError;
//!
//! fn describe(err: &PipelineError) -> String {
//!     match err {
//!         PipelineError::InvalidStateTransition { session_id, .. } => {
//!             format!("session {} cannot be resumed", session_id)
//!         }
//!         PipelineError::Validation(msg) => format!("bad pipeline: {}", msg),
//!         other => other.to_string(),
//!     }
//! }
//! ```

use taskgraph_checkpoint::SessionStatus;
use thiserror::Error;

use crate::registry::RegistryError;

/// Convenience result type using [`PipelineError`]
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced to callers of the composition and execution APIs
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The composed graph violates the linear-chain invariant
    ///
    /// Produced by the compiler: duplicate node ids, cycles, orphan nodes, or a
    /// chain that never reaches the terminal sentinel.
    #[error("Pipeline validation failed: {0}")]
    Validation(String),

    /// A registry lookup failed where no recovery is possible
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Checkpoint store failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] taskgraph_checkpoint::CheckpointError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine configuration is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `resume` was called on a session that is not suspended
    ///
    /// `current` is `None` when the session is unknown to this engine and has no
    /// suspended record in the store.
    #[error(
        "Cannot {action} session '{session_id}': it is {}",
        current.as_ref().map(|s| s.as_str()).unwrap_or("not suspended")
    )]
    InvalidStateTransition {
        /// Session the caller addressed
        session_id: String,
        /// Last known status of that session
        current: Option<SessionStatus>,
        /// Operation that was attempted
        action: &'static str,
    },

    /// No live or suspended session with this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl PipelineError {
    pub fn invalid_transition(
        session_id: impl Into<String>,
        current: Option<SessionStatus>,
        action: &'static str,
    ) -> Self {
        Self::InvalidStateTransition {
            session_id: session_id.into(),
            current,
            action,
        }
    }
}
