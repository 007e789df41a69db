//! Engine configuration
//!
//! [`EngineConfig`] is read from YAML. String scalars may reference environment
//! variables as `${VAR:default}`; a scalar that consists of a single placeholder is
//! re-read after expansion, so `${FLAG:false}` yields a boolean.
//!
//! ```yaml
//! human_review: ${TASKGRAPH_HUMAN_REVIEW:false}
//! max_iterations: 3
//! resolver_timeout_ms: 30000
//! retained_sessions: 1024
//! checkpoint:
//!   backend: file
//!   dir: ${TASKGRAPH_CHECKPOINT_DIR:.taskgraph/sessions}
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use taskgraph_checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

use crate::error::{PipelineError, Result};

/// Hard upper bound on runs of a single stage node
pub const MAX_ITERATIONS_CEILING: u32 = 3;

/// Default resolver timeout
pub const DEFAULT_RESOLVER_TIMEOUT_MS: u64 = 30_000;

/// Default number of finished sessions whose status the engine remembers
pub const DEFAULT_RETAINED_SESSIONS: usize = 1024;

/// Checkpoint store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
}

/// Checkpoint store settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// Directory for the file backend
    pub dir: Option<PathBuf>,
}

/// Execution engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Suspend at checkpoint nodes
    pub human_review: bool,

    /// Maximum runs of one stage node; values above the ceiling are clamped
    pub max_iterations: u32,

    /// Upper bound on a profile resolver call
    pub resolver_timeout_ms: u64,

    /// Finished sessions kept in the status ledger; the oldest are forgotten first
    pub retained_sessions: usize,

    pub checkpoint: CheckpointConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            human_review: false,
            max_iterations: MAX_ITERATIONS_CEILING,
            resolver_timeout_ms: DEFAULT_RESOLVER_TIMEOUT_MS,
            retained_sessions: DEFAULT_RETAINED_SESSIONS,
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut value: YamlValue = serde_yaml::from_str(yaml)?;
        if value.is_null() {
            value = YamlValue::Mapping(Default::default());
        }
        expand_variables(&mut value)?;
        let config: EngineConfig = serde_yaml::from_value(value)?;
        config.validated()
    }

    /// Read, parse and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    pub fn with_human_review(mut self, enabled: bool) -> Self {
        self.human_review = enabled;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retained_sessions(mut self, retained: usize) -> Self {
        self.retained_sessions = retained;
        self
    }

    pub fn with_file_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint = CheckpointConfig {
            backend: CheckpointBackend::File,
            dir: Some(dir.into()),
        };
        self
    }

    /// Check values, clamping `max_iterations` to the ceiling
    pub fn validated(mut self) -> Result<Self> {
        if self.max_iterations == 0 {
            return Err(PipelineError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_iterations > MAX_ITERATIONS_CEILING {
            tracing::warn!(
                requested = self.max_iterations,
                ceiling = MAX_ITERATIONS_CEILING,
                "max_iterations clamped"
            );
            self.max_iterations = MAX_ITERATIONS_CEILING;
        }
        if self.resolver_timeout_ms == 0 {
            return Err(PipelineError::Configuration(
                "resolver_timeout_ms must be positive".to_string(),
            ));
        }
        if self.retained_sessions == 0 {
            return Err(PipelineError::Configuration(
                "retained_sessions must be at least 1".to_string(),
            ));
        }
        if self.checkpoint.backend == CheckpointBackend::File {
            match &self.checkpoint.dir {
                Some(dir) if !dir.as_os_str().is_empty() => {}
                _ => {
                    return Err(PipelineError::Configuration(
                        "checkpoint.dir is required for the file backend".to_string(),
                    ))
                }
            }
        }
        Ok(self)
    }

    /// Iteration bound actually enforced by the engine
    pub fn effective_max_iterations(&self) -> u32 {
        self.max_iterations.clamp(1, MAX_ITERATIONS_CEILING)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    /// Construct the configured checkpoint store
    pub async fn build_store(&self) -> Result<Arc<dyn CheckpointStore>> {
        match self.checkpoint.backend {
            CheckpointBackend::Memory => Ok(Arc::new(InMemoryCheckpointStore::new())),
            CheckpointBackend::File => {
                let dir = self.checkpoint.dir.as_ref().ok_or_else(|| {
                    PipelineError::Configuration(
                        "checkpoint.dir is required for the file backend".to_string(),
                    )
                })?;
                Ok(Arc::new(FileCheckpointStore::open(dir).await?))
            }
        }
    }
}

fn placeholder_regex() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").ok())
        .as_ref()
}

/// Expand `${VAR:default}` in every string scalar
fn expand_variables(value: &mut YamlValue) -> Result<()> {
    match value {
        YamlValue::String(s) => {
            if let Some((expanded, whole)) = expand_env_in_string(s) {
                *value = if whole {
                    // re-read so `${FLAG:false}` becomes a bool and `${N:3}` a number
                    serde_yaml::from_str::<YamlValue>(&expanded)
                        .ok()
                        .filter(|v| !matches!(v, YamlValue::Mapping(_) | YamlValue::Sequence(_)))
                        .unwrap_or(YamlValue::String(expanded))
                } else {
                    YamlValue::String(expanded)
                };
            }
        }
        YamlValue::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_variables(v)?;
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                expand_variables(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Returns the expanded string and whether the input was a single placeholder
fn expand_env_in_string(s: &str) -> Option<(String, bool)> {
    if !s.contains("${") {
        return None;
    }
    let re = placeholder_regex()?;

    let mut whole = false;
    let expanded = re
        .replace_all(s, |cap: &regex::Captures<'_>| {
            if cap.get(0).map(|m| m.as_str().len()) == Some(s.len()) {
                whole = true;
            }
            let name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            let default = cap.get(2).map(|m| m.as_str()).unwrap_or_default();
            env::var(name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned();
    Some((expanded, whole))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.human_review);
        assert_eq!(config.effective_max_iterations(), 3);
        assert_eq!(config.resolver_timeout(), Duration::from_secs(30));
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Memory);
        assert_eq!(config.retained_sessions, DEFAULT_RETAINED_SESSIONS);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = EngineConfig::from_yaml_str(
            "human_review: true\nmax_iterations: 2\nresolver_timeout_ms: 500\ncheckpoint:\n  backend: file\n  dir: /tmp/sessions\n",
        )
        .unwrap();
        assert!(config.human_review);
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.checkpoint.dir, Some(PathBuf::from("/tmp/sessions")));
    }

    #[test]
    fn test_env_defaults_are_typed() {
        let config = EngineConfig::from_yaml_str(
            "human_review: ${TASKGRAPH_TEST_UNSET_FLAG_7F3A:true}\nmax_iterations: ${TASKGRAPH_TEST_UNSET_N_7F3A:2}\n",
        )
        .unwrap();
        assert!(config.human_review);
        assert_eq!(config.max_iterations, 2);
    }

    #[test]
    fn test_env_expansion_inside_string() {
        let config = EngineConfig::from_yaml_str(
            "checkpoint:\n  backend: file\n  dir: ${TASKGRAPH_TEST_UNSET_ROOT_7F3A:/var/lib}/sessions\n",
        )
        .unwrap();
        assert_eq!(config.checkpoint.dir, Some(PathBuf::from("/var/lib/sessions")));
    }

    #[test]
    fn test_max_iterations_clamped() {
        let config = EngineConfig::from_yaml_str("max_iterations: 10").unwrap();
        assert_eq!(config.max_iterations, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for yaml in [
            "max_iterations: 0",
            "resolver_timeout_ms: 0",
            "retained_sessions: 0",
            "checkpoint:\n  backend: file\n",
        ] {
            let err = EngineConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, PipelineError::Configuration(_)), "{}", yaml);
        }
        assert!(matches!(
            EngineConfig::from_yaml_str("human_reviw: true"),
            Err(PipelineError::Yaml(_))
        ));
    }

    #[tokio::test]
    async fn test_build_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_file_store(dir.path().join("sessions"));
        let store = config.build_store().await.unwrap();
        assert!(!store.contains("missing").await.unwrap());
        assert!(dir.path().join("sessions").is_dir());
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/taskgraph.yaml").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
