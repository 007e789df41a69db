use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::compiler::compile;
use super::pipeline::CompiledPipeline;
use crate::error::Result;
use crate::profile::TaskProfile;
use crate::registry::StageRegistry;

/// Reuses compiled pipelines for identical profiles
///
/// Keyed by [`TaskProfile::fingerprint`] of the profile as given (before
/// sanitisation). The registry is assumed stable for the cache's lifetime; call
/// [`clear`](Self::clear) after registering new stages or triggers.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: RwLock<HashMap<String, Arc<CompiledPipeline>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached pipeline for `profile`, compiling it on first use
    pub fn get_or_compile(
        &self,
        profile: &TaskProfile,
        registry: &StageRegistry,
    ) -> Result<Arc<CompiledPipeline>> {
        let key = profile.fingerprint();

        if let Some(pipeline) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(pipeline));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compile(profile, registry)?);

        // A concurrent miss may have compiled the same profile; keep the first entry.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(key).or_insert(compiled);
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageOutput;
    use crate::profile::TaskType;

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        for stage in ["analyze", "retrieve", "write"] {
            registry.register_stage(stage, |_ctx| async { Ok(StageOutput::empty()) });
        }
        registry
    }

    #[test]
    fn test_identical_profiles_share_pipeline() {
        let cache = PipelineCache::new();
        let registry = registry();
        let profile = TaskProfile::new(TaskType::Research, ["analyze", "write"]);

        let a = cache.get_or_compile(&profile, &registry).unwrap();
        let b = cache.get_or_compile(&profile.clone(), &registry).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), (1, 1));

        let c = cache
            .get_or_compile(&TaskProfile::default_profile(), &registry)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
