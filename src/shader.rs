//! Shader Cache
//!
//! This layer never compiles shaders itself. A [`ShaderCompiler`] supplied by
//! the application turns `(source id, entry point)` into bytecode, and the
//! device-owned [`ShaderCache`] makes sure each pair is compiled once.
//!
//! Precompiled bytecode can be registered with [`ShaderCache::insert`]
//! without installing a compiler at all.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::{GpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
}

/// Cache key: where the shader came from and which entry point was compiled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub source_id: String,
    pub entry_point: String,
}

impl ShaderKey {
    #[must_use]
    pub fn new(source_id: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            entry_point: entry_point.into(),
        }
    }
}

/// Compiled shader bytecode.
#[derive(Debug)]
pub struct CompiledShader {
    key: ShaderKey,
    stage: ShaderStage,
    bytecode: Vec<u8>,
    hash: u128,
}

impl CompiledShader {
    #[must_use]
    pub fn new(key: ShaderKey, stage: ShaderStage, bytecode: Vec<u8>) -> Self {
        let hash = xxh3_128(&bytecode);
        Self {
            key,
            stage,
            bytecode,
            hash,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &ShaderKey {
        &self.key
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytecode.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }

    /// xxh3-128 of the bytecode.
    #[inline]
    #[must_use]
    pub fn hash(&self) -> u128 {
        self.hash
    }
}

/// Turns shader source into bytecode. Implemented by the application.
pub trait ShaderCompiler: Send + Sync {
    fn compile(&self, key: &ShaderKey, stage: ShaderStage) -> std::result::Result<Vec<u8>, String>;
}

/// Compiled shaders keyed by `(source id, entry point)`.
#[derive(Default)]
pub struct ShaderCache {
    compiler: RwLock<Option<Arc<dyn ShaderCompiler>>>,
    shaders: Mutex<FxHashMap<ShaderKey, Arc<CompiledShader>>>,
}

impl ShaderCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) the compiler used on cache misses.
    pub fn set_compiler(&self, compiler: Arc<dyn ShaderCompiler>) {
        *self.compiler.write() = Some(compiler);
    }

    #[must_use]
    pub fn get(&self, source_id: &str, entry_point: &str) -> Option<Arc<CompiledShader>> {
        self.shaders
            .lock()
            .get(&ShaderKey::new(source_id, entry_point))
            .cloned()
    }

    /// Registers precompiled bytecode. If the key is already cached, the
    /// cached shader wins and is returned.
    pub fn insert(&self, shader: CompiledShader) -> Arc<CompiledShader> {
        let mut shaders = self.shaders.lock();
        Arc::clone(
            shaders
                .entry(shader.key.clone())
                .or_insert_with(|| Arc::new(shader)),
        )
    }

    /// Returns the cached shader, compiling it on first use.
    pub fn get_or_compile(
        &self,
        source_id: &str,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Arc<CompiledShader>> {
        let key = ShaderKey::new(source_id, entry_point);
        let mut shaders = self.shaders.lock();
        if let Some(shader) = shaders.get(&key) {
            return Ok(Arc::clone(shader));
        }

        let error = |message: String| GpuError::ShaderCompilation {
            source_id: source_id.to_string(),
            entry_point: entry_point.to_string(),
            message,
        };
        let compiler = self
            .compiler
            .read()
            .clone()
            .ok_or_else(|| error("no shader compiler installed".to_string()))?;
        let bytecode = compiler.compile(&key, stage).map_err(|message| {
            log::error!("Shader {source_id}:{entry_point} failed to compile: {message}");
            error(message)
        })?;
        if bytecode.is_empty() {
            return Err(error("compiler returned empty bytecode".to_string()));
        }

        log::debug!(
            "Compiled shader {source_id}:{entry_point} ({} bytes)",
            bytecode.len()
        );
        let shader = Arc::new(CompiledShader::new(key.clone(), stage, bytecode));
        shaders.insert(key, Arc::clone(&shader));
        Ok(shader)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shaders.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shaders.lock().is_empty()
    }

    pub fn clear(&self) {
        self.shaders.lock().clear();
    }
}

impl std::fmt::Debug for ShaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCache")
            .field("shaders", &self.len())
            .field("has_compiler", &self.compiler.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCompiler(AtomicUsize);

    impl ShaderCompiler for CountingCompiler {
        fn compile(
            &self,
            key: &ShaderKey,
            _stage: ShaderStage,
        ) -> std::result::Result<Vec<u8>, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            if key.entry_point.is_empty() {
                return Err("missing entry point".into());
            }
            Ok(format!("{}::{}", key.source_id, key.entry_point).into_bytes())
        }
    }

    #[test]
    fn each_key_compiles_once() {
        let compiler = Arc::new(CountingCompiler(AtomicUsize::new(0)));
        let cache = ShaderCache::new();
        cache.set_compiler(compiler.clone());

        let a = cache.get_or_compile("mesh.hlsl", "vs_main", ShaderStage::Vertex).unwrap();
        let b = cache.get_or_compile("mesh.hlsl", "vs_main", ShaderStage::Vertex).unwrap();
        let c = cache.get_or_compile("mesh.hlsl", "ps_main", ShaderStage::Pixel).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(compiler.0.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn missing_compiler_is_reported() {
        let cache = ShaderCache::new();
        let err = cache
            .get_or_compile("mesh.hlsl", "vs_main", ShaderStage::Vertex)
            .unwrap_err();
        assert!(matches!(err, GpuError::ShaderCompilation { .. }));
    }

    #[test]
    fn precompiled_shaders_are_found_without_compiler() {
        let cache = ShaderCache::new();
        let key = ShaderKey::new("blit", "main");
        cache.insert(CompiledShader::new(key, ShaderStage::Compute, vec![1, 2, 3]));
        let shader = cache.get("blit", "main").unwrap();
        assert_eq!(shader.len(), 3);
        assert_eq!(shader.stage(), ShaderStage::Compute);
    }
}
