//! Compiled pipeline cache
//!
//! An explicit cache object constructed with the render context and passed
//! by reference to consumers; there is no process-wide state. Entries are
//! keyed by [`ShaderConfiguration`] value equality. Compilation failures are
//! remembered and logged once per configuration, so a broken material skips
//! its draws without spamming the log every frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, error};

use super::device::{ParameterSchema, PipelineHandle, ShaderCompiler};
use crate::material::ShaderConfiguration;

#[derive(Debug, Clone)]
enum CacheEntry {
    Ready {
        pipeline: PipelineHandle,
        #[allow(dead_code)]
        schema: ParameterSchema,
    },
    Failed,
}

/// Cache of compiled pipelines keyed by shader configuration
///
/// A map-level lock keeps population race-free; duplicate compiles cannot
/// happen for the same configuration.
pub struct PipelineCache {
    compiler: Arc<dyn ShaderCompiler>,
    entries: Mutex<HashMap<ShaderConfiguration, CacheEntry>>,
}

impl PipelineCache {
    /// Create an empty cache around a shader compiler collaborator
    pub fn new(compiler: Arc<dyn ShaderCompiler>) -> Self {
        Self {
            compiler,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a pipeline, compiling on first use
    ///
    /// Returns `None` when the configuration previously failed to compile;
    /// callers skip the draw. The underlying error is logged exactly once
    /// per configuration.
    pub fn get_or_compile(
        &self,
        source: &str,
        config: &ShaderConfiguration,
    ) -> Option<PipelineHandle> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(config) {
            return match entry {
                CacheEntry::Ready { pipeline, .. } => Some(*pipeline),
                CacheEntry::Failed => None,
            };
        }

        match self.compiler.compile(source, config) {
            Ok(compiled) => {
                debug!(
                    "compiled pipeline '{}' ({} reflected parameters)",
                    config.label,
                    compiled.schema.parameters.len()
                );
                let pipeline = compiled.pipeline;
                entries.insert(
                    config.clone(),
                    CacheEntry::Ready {
                        pipeline,
                        schema: compiled.schema,
                    },
                );
                Some(pipeline)
            }
            Err(err) => {
                error!("pipeline compilation failed for '{}': {err}", config.label);
                entries.insert(config.clone(), CacheEntry::Failed);
                None
            }
        }
    }

    /// Reflected parameter schema for a ready configuration
    pub fn schema(&self, config: &ShaderConfiguration) -> Option<ParameterSchema> {
        match self.entries.lock().unwrap().get(config) {
            Some(CacheEntry::Ready { schema, .. }) => Some(schema.clone()),
            _ => None,
        }
    }

    /// Drop a configuration so the next lookup recompiles
    ///
    /// Used for hot reload when a source file changes; a changed define set
    /// is a different key and needs no invalidation.
    pub fn invalidate(&self, config: &ShaderConfiguration) {
        self.entries.lock().unwrap().remove(config);
    }

    /// Number of cached entries (ready and failed)
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::render::headless::HeadlessCompiler;

    #[test]
    fn second_lookup_hits_the_cache() {
        let compiler = Arc::new(HeadlessCompiler::new());
        let cache = PipelineCache::new(Arc::clone(&compiler) as Arc<dyn ShaderCompiler>);
        let material = Material::new("standard", "source");
        let config = material.shader_config(false);

        let first = cache.get_or_compile(&material.source, &config).unwrap();
        let second = cache.get_or_compile(&material.source, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(compiler.compile_count(), 1);
    }

    #[test]
    fn failures_are_remembered_and_compiled_once() {
        let compiler = Arc::new(HeadlessCompiler::new());
        let cache = PipelineCache::new(Arc::clone(&compiler) as Arc<dyn ShaderCompiler>);
        let material = Material::new("broken", "#error boom");
        let config = material.shader_config(false);

        assert!(cache.get_or_compile(&material.source, &config).is_none());
        assert!(cache.get_or_compile(&material.source, &config).is_none());
        // The compiler ran once; the second miss came from the cache.
        assert_eq!(compiler.compile_count(), 1);
    }

    #[test]
    fn invalidation_triggers_recompile() {
        let compiler = Arc::new(HeadlessCompiler::new());
        let cache = PipelineCache::new(Arc::clone(&compiler) as Arc<dyn ShaderCompiler>);
        let material = Material::new("standard", "source");
        let config = material.shader_config(false);

        cache.get_or_compile(&material.source, &config);
        cache.invalidate(&config);
        cache.get_or_compile(&material.source, &config);
        assert_eq!(compiler.compile_count(), 2);
    }

    #[test]
    fn changed_defines_are_a_new_entry() {
        let compiler = Arc::new(HeadlessCompiler::new());
        let cache = PipelineCache::new(Arc::clone(&compiler) as Arc<dyn ShaderCompiler>);
        let mut material = Material::new("standard", "source");

        cache.get_or_compile(&material.source, &material.shader_config(false));
        material.set_define("HAS_MAP", "1");
        cache.get_or_compile(&material.source, &material.shader_config(false));

        assert_eq!(compiler.compile_count(), 2);
        assert_eq!(cache.len(), 2);
    }
}
