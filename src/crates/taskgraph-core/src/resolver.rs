//! Profile resolution boundary
//!
//! A [`ProfileResolver`] turns a task description into a [`TaskProfile`]. Real
//! deployments plug in a model-backed classifier; [`KeywordProfileResolver`] is a
//! deterministic heuristic that works without one.
//!
//! Resolution never fails from the caller's point of view: [`resolve_profile`]
//! bounds the call with a timeout and substitutes the Default Profile on any error,
//! reporting the substitution as a [`CompositionWarning::FallbackProfile`].
//!
//! Model output is rarely clean JSON. [`parse_profile_response`] accepts plain JSON,
//! a fenced code block, or an object embedded in prose.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::context::ContextMap;
use crate::profile::{Complexity, CompositionWarning, StageId, TaskProfile, TaskType};
use crate::registry::{REVIEW_DRAFT, REVIEW_RETRIEVAL};

/// Why a resolver could not produce a profile
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("profile resolution timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("malformed profile response: {0}")]
    Malformed(String),

    #[error("resolver backend error: {0}")]
    Backend(String),
}

/// Classifier producing a [`TaskProfile`] from a task description
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve(
        &self,
        description: &str,
        context: &ContextMap,
    ) -> Result<TaskProfile, ResolveError>;
}

/// Outcome of [`resolve_profile`]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub profile: TaskProfile,
    /// Set when the Default Profile was substituted
    pub fallback: Option<CompositionWarning>,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Resolve a profile, falling back to the Default Profile on timeout or error
pub async fn resolve_profile(
    resolver: &dyn ProfileResolver,
    description: &str,
    context: &ContextMap,
    timeout: Duration,
) -> Resolution {
    let outcome = match tokio::time::timeout(timeout, resolver.resolve(description, context)).await
    {
        Ok(result) => result,
        Err(_) => Err(ResolveError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    };

    match outcome {
        Ok(profile) => {
            tracing::debug!(
                task_type = %profile.task_type,
                stages = profile.stages.len(),
                confidence = profile.confidence,
                "resolved task profile"
            );
            Resolution {
                profile,
                fallback: None,
            }
        }
        Err(error) => {
            tracing::warn!(%error, "profile resolution failed, using the default profile");
            Resolution {
                profile: TaskProfile::default_profile(),
                fallback: Some(CompositionWarning::FallbackProfile {
                    reason: error.to_string(),
                }),
            }
        }
    }
}

/// Resolver that always returns the same profile
#[derive(Debug, Clone)]
pub struct StaticProfileResolver {
    profile: TaskProfile,
}

impl StaticProfileResolver {
    pub fn new(profile: TaskProfile) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl ProfileResolver for StaticProfileResolver {
    async fn resolve(&self, _: &str, _: &ContextMap) -> Result<TaskProfile, ResolveError> {
        Ok(self.profile.clone())
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Extract a [`TaskProfile`] from free-form resolver output
pub fn parse_profile_response(text: &str) -> Result<TaskProfile, ResolveError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::Malformed("empty response".to_string()));
    }

    let mut candidates: Vec<&str> = vec![trimmed];
    if let Some(re) = fence_regex() {
        candidates.extend(
            re.captures_iter(trimmed)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str()),
        );
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            candidates.push(&trimmed[start..=end]);
        }
    }

    let mut last_error = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => {
                return serde_json::from_value(value)
                    .map_err(|e| ResolveError::Malformed(e.to_string()));
            }
            Ok(_) => last_error = Some("response is not a JSON object".to_string()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(ResolveError::Malformed(
        last_error.unwrap_or_else(|| "no JSON object found".to_string()),
    ))
}

const COMPLEX_WORDS: &[&str] = &[
    "debug", "optimize", "analyze", "improve", "refactor", "design", "architecture",
    "performance", "scalability", "distributed", "migrate",
];

const QUALITY_WORDS: &[&str] = &[
    "quality", "production", "critical", "robust", "reliable", "security", "review",
    "compliance",
];

const ITERATIVE_WORDS: &[&str] = &["improve", "refine", "iterate", "revise", "polish"];

fn task_keywords(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::SimpleQa => &["what is", "what are", "who", "when", "define", "meaning of"],
        TaskType::Implementation => &[
            "implement", "build", "code", "function", "feature", "endpoint", "write a",
        ],
        TaskType::Design => &["design", "architecture", "architect", "schema", "blueprint"],
        TaskType::Integration => &["integrate", "integration", "connect", "api", "webhook", "sync"],
        TaskType::Debugging => &["debug", "bug", "error", "fix", "crash", "failing", "broken"],
        TaskType::Documentation => &["document", "docs", "readme", "guide", "tutorial", "changelog"],
        TaskType::Research => &["research", "compare", "investigate", "survey", "evaluate", "study"],
    }
}

/// Deterministic keyword classifier
///
/// Scores each task type by keyword hits and estimates complexity the way the
/// pattern selector does: weighted keyword counts plus a length term, with
/// thresholds at 3 and 7. Checkpoints are requested for medium and complex tasks.
#[derive(Debug, Clone)]
pub struct KeywordProfileResolver {
    plans: BTreeMap<TaskType, Vec<StageId>>,
    simple_threshold: f64,
    complex_threshold: f64,
}

impl KeywordProfileResolver {
    pub fn new() -> Self {
        let full: Vec<StageId> = ["analyze", "retrieve", "write"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut plans = BTreeMap::new();
        for task_type in TaskType::ALL {
            plans.insert(task_type, full.clone());
        }
        plans.insert(
            TaskType::SimpleQa,
            vec!["analyze".to_string(), "write".to_string()],
        );
        Self {
            plans,
            simple_threshold: 3.0,
            complex_threshold: 7.0,
        }
    }

    /// Override the stage sequence produced for `task_type`
    pub fn with_plan<I, S>(mut self, task_type: TaskType, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StageId>,
    {
        self.plans
            .insert(task_type, stages.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_thresholds(mut self, simple: f64, complex: f64) -> Self {
        self.simple_threshold = simple;
        self.complex_threshold = complex;
        self
    }

    /// Classify `description` without any I/O
    pub fn classify(&self, description: &str, context: &ContextMap) -> TaskProfile {
        let lower = description.to_lowercase();
        let hits = |words: &[&str]| words.iter().filter(|w| lower.contains(*w)).count();

        // ties resolve to the earlier type in TaskType::ALL
        let mut best = (TaskType::SimpleQa, 0usize);
        for task_type in TaskType::ALL {
            let score = hits(task_keywords(task_type));
            if score > best.1 {
                best = (task_type, score);
            }
        }
        let (task_type, score) = best;

        let complex_count = hits(COMPLEX_WORDS) as f64;
        let quality_count = hits(QUALITY_WORDS);
        let iterative_count = hits(ITERATIVE_WORDS);
        let length_term = ((description.len().max(1) as f64).log2() / 10.0).min(3.0);
        let raw = (complex_count * 1.5 + quality_count as f64 * 0.8 + length_term).min(10.0);

        let complexity = if raw < self.simple_threshold {
            Complexity::Simple
        } else if raw < self.complex_threshold {
            Complexity::Medium
        } else {
            Complexity::Complex
        };

        let mut checkpoints = BTreeSet::new();
        match complexity {
            Complexity::Simple if quality_count == 0 => {}
            Complexity::Simple | Complexity::Medium => {
                checkpoints.insert(REVIEW_DRAFT.to_string());
            }
            Complexity::Complex => {
                checkpoints.insert(REVIEW_RETRIEVAL.to_string());
                checkpoints.insert(REVIEW_DRAFT.to_string());
            }
        }

        let knowledge_scope = context
            .get("knowledge_scope")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let confidence = if score == 0 {
            0.4
        } else {
            (0.5 + 0.1 * score as f64).min(0.95)
        };

        TaskProfile {
            task_type,
            complexity,
            stages: self.plans.get(&task_type).cloned().unwrap_or_default(),
            checkpoints,
            knowledge_scope,
            allow_rewrite: quality_count > 0,
            allow_iteration: iterative_count > 0,
            confidence,
            rationale: format!(
                "keyword match: {} ({} hits), complexity score {:.1}",
                task_type, score, raw
            ),
        }
    }
}

impl Default for KeywordProfileResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileResolver for KeywordProfileResolver {
    async fn resolve(
        &self,
        description: &str,
        context: &ContextMap,
    ) -> Result<TaskProfile, ResolveError> {
        if description.trim().is_empty() {
            return Err(ResolveError::Malformed("empty task description".to_string()));
        }
        Ok(self.classify(description, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingResolver;

    #[async_trait]
    impl ProfileResolver for FailingResolver {
        async fn resolve(&self, _: &str, _: &ContextMap) -> Result<TaskProfile, ResolveError> {
            Err(ResolveError::Backend("model unavailable".to_string()))
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl ProfileResolver for SlowResolver {
        async fn resolve(&self, _: &str, _: &ContextMap) -> Result<TaskProfile, ResolveError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TaskProfile::new(TaskType::Research, ["analyze"]))
        }
    }

    #[tokio::test]
    async fn test_backend_error_falls_back() {
        let resolution =
            resolve_profile(&FailingResolver, "anything", &ContextMap::new(), Duration::from_secs(1))
                .await;
        assert!(resolution.is_fallback());
        assert_eq!(resolution.profile, TaskProfile::default_profile());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let resolution = resolve_profile(
            &SlowResolver,
            "anything",
            &ContextMap::new(),
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(
            resolution.fallback,
            Some(CompositionWarning::FallbackProfile {
                reason: "profile resolution timed out after 50ms".to_string()
            })
        );
        assert!(resolution.profile.is_fallback());
    }

    #[test]
    fn test_parse_plain_json() {
        let profile = parse_profile_response(
            r#"{"task_type": "research", "complexity": "complex", "stages": ["analyze", "retrieve"]}"#,
        )
        .unwrap();
        assert_eq!(profile.task_type, TaskType::Research);
        assert_eq!(profile.complexity, Complexity::Complex);
    }

    #[test]
    fn test_parse_fenced_block() {
        let text = "Here is the profile:\n```json\n{\"task_type\": \"design\", \"stages\": [\"analyze\"]}\n```\nLet me know.";
        let profile = parse_profile_response(text).unwrap();
        assert_eq!(profile.task_type, TaskType::Design);
    }

    #[test]
    fn test_parse_embedded_object() {
        let text = "Sure! {\"task_type\": \"debugging\", \"stages\": []} hope that helps";
        let profile = parse_profile_response(text).unwrap();
        assert_eq!(profile.task_type, TaskType::Debugging);
        assert!(profile.stages.is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_profile_response("no json here"),
            Err(ResolveError::Malformed(_))
        ));
        assert!(matches!(
            parse_profile_response(r#"{"task_type": "cooking"}"#),
            Err(ResolveError::Malformed(_))
        ));
        assert!(matches!(
            parse_profile_response("   "),
            Err(ResolveError::Malformed(_))
        ));
    }

    #[test]
    fn test_keyword_classification() {
        let resolver = KeywordProfileResolver::new();

        let qa = resolver.classify("What is a monad?", &ContextMap::new());
        assert_eq!(qa.task_type, TaskType::SimpleQa);
        assert_eq!(qa.complexity, Complexity::Simple);
        assert_eq!(qa.stages, vec!["analyze", "write"]);
        assert!(qa.checkpoints.is_empty());

        let bug = resolver.classify(
            "Debug the crash in the payment service and fix the failing error path",
            &ContextMap::new(),
        );
        assert_eq!(bug.task_type, TaskType::Debugging);
        assert_eq!(bug.stages, vec!["analyze", "retrieve", "write"]);
    }

    #[test]
    fn test_keyword_complexity_requests_checkpoints() {
        let resolver = KeywordProfileResolver::new();
        let profile = resolver.classify(
            "Design a robust distributed architecture for production, analyze performance and scalability, then refactor",
            &ContextMap::new(),
        );
        assert_eq!(profile.complexity, Complexity::Complex);
        assert!(profile.checkpoints.contains(REVIEW_RETRIEVAL));
        assert!(profile.checkpoints.contains(REVIEW_DRAFT));
        assert!(profile.allow_rewrite);
    }

    #[test]
    fn test_keyword_reads_knowledge_scope_from_context() {
        let context = json!({"knowledge_scope": ["billing", "auth"]})
            .as_object()
            .cloned()
            .unwrap();
        let profile = KeywordProfileResolver::new().classify("research auth flows", &context);
        assert_eq!(profile.knowledge_scope, vec!["billing", "auth"]);
        assert!(profile.confidence > 0.5);
    }

    #[tokio::test]
    async fn test_keyword_resolver_rejects_empty_description() {
        let err = KeywordProfileResolver::new()
            .resolve("  ", &ContextMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Malformed(_)));
    }
}
