//! Execution context threaded through stage handlers
//!
//! Every session owns one [`ExecutionContext`]. Stage handlers receive a copy of its
//! key/value map and return a partial update ([`StageOutput`]) that the engine merges
//! back. Handlers run one at a time, so the context has a single writer.
//!
//! Besides the values, the context keeps:
//!
//! - **errors**: structured [`StageFailure`] records, appended when a handler fails.
//!   The caller-facing output lists them under the reserved key [`ERRORS_KEY`], which
//!   stage updates cannot write.
//! - **history**: one [`StageRecord`] per completed stage run, naming the keys the
//!   stage wrote (used by [`ask`](crate::ExecutionEngine::ask))

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::graph::NodeId;
use crate::profile::StageId;

/// Output key holding recorded stage failures
pub const ERRORS_KEY: &str = "__errors__";

/// Key/value map passed to and returned from stage handlers
pub type ContextMap = serde_json::Map<String, Value>;

/// Partial update produced by a stage handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Keys to insert or overwrite in the context
    pub update: ContextMap,

    /// Ask the engine to run the same stage again
    ///
    /// Honoured only when the pipeline allows iteration, and bounded by the
    /// engine's iteration ceiling.
    pub iterate: bool,
}

impl StageOutput {
    pub fn new(update: ContextMap) -> Self {
        Self {
            update,
            iterate: false,
        }
    }

    /// An output that changes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an output from a JSON object; other JSON values become an empty update
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::empty(),
        }
    }

    /// Add one key to the update
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.update.insert(key.into(), value);
        self
    }

    /// Request another run of this stage
    pub fn iterate(mut self) -> Self {
        self.iterate = true;
        self
    }
}

impl From<ContextMap> for StageOutput {
    fn from(update: ContextMap) -> Self {
        Self::new(update)
    }
}

/// Error returned by a stage handler
///
/// Handlers own their timeouts: a handler that gives up on an external call reports
/// [`StageError::Timeout`] instead of hanging.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// The stage could not produce its output
    #[error("{0}")]
    Failed(String),

    /// An external call made by the stage did not finish in time
    #[error("timed out after {after_ms}ms: {operation}")]
    Timeout {
        /// What the handler was waiting for
        operation: String,
        /// How long it waited
        after_ms: u64,
    },
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Structured record of a failed stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage that failed
    pub stage: StageId,
    /// Node the stage was running as
    pub node_id: NodeId,
    /// Failure category (`failed`, `timeout`, `panic`, `missing_handler`)
    pub kind: String,
    /// Human-readable detail
    pub message: String,
}

impl StageFailure {
    pub fn new(
        stage: impl Into<StageId>,
        node_id: impl Into<NodeId>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            node_id: node_id.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_stage_error(stage: &str, node_id: &str, error: &StageError) -> Self {
        let kind = match error {
            StageError::Failed(_) => "failed",
            StageError::Timeout { .. } => "timeout",
        };
        Self::new(stage, node_id, kind, error.to_string())
    }
}

/// One completed stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub node_id: NodeId,
    /// Keys written by this run, in update order
    pub keys: Vec<String>,
    /// 1 for the first run of the node, 2 for the first repeat, ...
    pub iteration: u32,
}

/// Mutable record accumulated over one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Values written by stages (and the caller's initial values)
    pub values: ContextMap,

    /// Failures recorded during the session
    #[serde(default)]
    pub errors: Vec<StageFailure>,

    /// Completed stage runs, oldest first
    #[serde(default)]
    pub history: Vec<StageRecord>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with caller-provided values
    pub fn with_values(values: ContextMap) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merge a stage's update and record the run in the history
    pub fn apply(&mut self, stage: &str, node_id: &str, update: ContextMap, iteration: u32) {
        let mut keys = Vec::with_capacity(update.len());
        for (key, value) in update {
            if key == ERRORS_KEY {
                tracing::warn!(stage, key = %key, "stage wrote a reserved key, ignored");
                continue;
            }
            keys.push(key.clone());
            self.values.insert(key, value);
        }
        self.history.push(StageRecord {
            stage: stage.to_string(),
            node_id: node_id.to_string(),
            keys,
            iteration,
        });
    }

    pub fn record_failure(&mut self, failure: StageFailure) {
        self.errors.push(failure);
    }

    /// Most recently completed stage run
    pub fn last_completed(&self) -> Option<&StageRecord> {
        self.history.last()
    }

    /// Values written by the most recent stage run
    pub fn last_output(&self) -> ContextMap {
        let mut out = ContextMap::new();
        if let Some(record) = self.last_completed() {
            for key in &record.keys {
                if let Some(value) = self.values.get(key) {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        out
    }

    /// Caller-facing result: the accumulated values plus recorded errors
    pub fn output(&self) -> Value {
        let mut out = self.values.clone();
        if !self.errors.is_empty() {
            out.insert(
                ERRORS_KEY.to_string(),
                serde_json::to_value(&self.errors).unwrap_or(Value::Null),
            );
        }
        Value::Object(out)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_merges_and_records_keys() {
        let mut ctx = ExecutionContext::with_values(map(json!({"task": "x"})));
        ctx.apply("analyze", "analyze", map(json!({"analysis": "a", "task": "y"})), 1);

        assert_eq!(ctx.get("task"), Some(&json!("y")));
        assert_eq!(ctx.get("analysis"), Some(&json!("a")));

        let record = ctx.last_completed().unwrap();
        assert_eq!(record.stage, "analyze");
        assert_eq!(record.keys.len(), 2);
        assert_eq!(ctx.last_output().len(), 2);
    }

    #[test]
    fn test_output_includes_errors_only_when_present() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("draft", json!("text"));
        assert!(ctx.output().get(ERRORS_KEY).is_none());

        ctx.record_failure(StageFailure::new("write", "write", "failed", "boom"));
        let out = ctx.output();
        assert_eq!(out[ERRORS_KEY][0]["stage"], "write");
        assert_eq!(out["draft"], "text");
    }

    #[test]
    fn test_stage_value_named_errors_survives_failures() {
        let mut ctx = ExecutionContext::new();
        ctx.apply("lint", "lint", map(json!({"errors": ["unused import"]})), 1);
        ctx.record_failure(StageFailure::new("write", "write", "failed", "boom"));

        let out = ctx.output();
        assert_eq!(out["errors"], json!(["unused import"]));
        assert_eq!(out[ERRORS_KEY][0]["message"], "boom");
    }

    #[test]
    fn test_reserved_key_is_not_writable() {
        let mut ctx = ExecutionContext::new();
        ctx.apply("write", "write", map(json!({ERRORS_KEY: "spoofed", "draft": "d"})), 1);

        assert!(ctx.get(ERRORS_KEY).is_none());
        assert_eq!(ctx.last_completed().unwrap().keys, vec!["draft"]);
        assert!(ctx.output().get(ERRORS_KEY).is_none());
    }

    #[test]
    fn test_value_round_trip() {
        let mut ctx = ExecutionContext::new();
        ctx.apply("retrieve", "retrieve", map(json!({"docs": [1, 2]})), 1);

        let restored = ExecutionContext::from_value(ctx.to_value().unwrap()).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_stage_output_builders() {
        let out = StageOutput::empty().with("k", json!(1)).iterate();
        assert!(out.iterate);
        assert_eq!(out.update["k"], 1);

        assert!(StageOutput::from_value(json!("not an object")).update.is_empty());
    }

    #[test]
    fn test_failure_kind_from_stage_error() {
        let err = StageError::Timeout {
            operation: "model call".to_string(),
            after_ms: 500,
        };
        let failure = StageFailure::from_stage_error("write", "write", &err);
        assert_eq!(failure.kind, "timeout");
        assert_eq!(failure.message, "timed out after 500ms: model call");
    }
}
