//! Read-only inspection of suspended sessions
//!
//! `ask` answers a question from the stored context without touching the session:
//! it reads with [`CheckpointStore::get`](taskgraph_checkpoint::CheckpointStore::get),
//! never `take`/`put`, so status and current node are unchanged.

use serde_json::Value;

use super::outcome::Answer;
use super::ExecutionEngine;
use crate::context::ExecutionContext;
use crate::error::{PipelineError, Result};

const MAX_VALUE_CHARS: usize = 200;

impl ExecutionEngine {
    /// Answer `question` from the context of a suspended session
    ///
    /// Context keys whose names share a word with the question are used first;
    /// otherwise the answer describes the output of the most recently completed
    /// stage.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<Answer> {
        let Some(state) = self.store.get(session_id).await? else {
            return match self.status_in_ledger(session_id).await {
                Some(status) => Err(PipelineError::invalid_transition(
                    session_id,
                    Some(status),
                    "inspect",
                )),
                None => Err(PipelineError::SessionNotFound(session_id.to_string())),
            };
        };

        let context = ExecutionContext::from_value(state.context)?;
        let stage = context.last_completed().map(|r| r.stage.clone());

        let mut keys = matching_keys(&context, question);
        if keys.is_empty() {
            keys = context
                .last_completed()
                .map(|r| r.keys.clone())
                .unwrap_or_default();
        }

        let answer = match (&stage, keys.is_empty()) {
            (None, _) => "No stage has completed yet.".to_string(),
            (Some(stage), true) => format!("Stage '{}' completed without output.", stage),
            (Some(stage), false) => {
                let facts: Vec<String> = keys
                    .iter()
                    .filter_map(|key| context.get(key).map(|v| format!("{}: {}", key, render(v))))
                    .collect();
                let paused = state
                    .suspended_at
                    .as_deref()
                    .map(|c| format!(", paused at '{}'", c))
                    .unwrap_or_default();
                format!(
                    "After stage '{}'{}: {}",
                    stage,
                    paused,
                    facts.join("; ")
                )
            }
        };

        tracing::debug!(session_id, keys = keys.len(), "answered question about session");
        Ok(Answer {
            answer,
            stage,
            keys,
        })
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Context keys sharing a word with the question, in context order
fn matching_keys(context: &ExecutionContext, question: &str) -> Vec<String> {
    let asked = words(question);
    context
        .values
        .keys()
        .filter(|key| words(key).iter().any(|w| asked.contains(w)))
        .cloned()
        .collect()
}

fn render(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_VALUE_CHARS {
        let truncated: String = text.chars().take(MAX_VALUE_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.apply(
            "retrieve",
            "retrieve",
            json!({"documents": ["a", "b"], "source_count": 2})
                .as_object()
                .cloned()
                .unwrap(),
            1,
        );
        ctx.apply(
            "write",
            "write",
            json!({"draft": "hello"}).as_object().cloned().unwrap(),
            1,
        );
        ctx
    }

    #[test]
    fn test_matching_keys_by_word() {
        let ctx = context();
        assert_eq!(matching_keys(&ctx, "Which documents were found?"), vec!["documents"]);
        assert_eq!(matching_keys(&ctx, "what is the source?"), vec!["source_count"]);
        assert!(matching_keys(&ctx, "anything new?").is_empty());
    }

    #[test]
    fn test_render_truncates() {
        let long = Value::String("x".repeat(500));
        assert_eq!(render(&long).len(), MAX_VALUE_CHARS + 3);
        assert_eq!(render(&json!([1, 2])), "[1,2]");
    }
}
