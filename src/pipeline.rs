//! Pipeline States
//!
//! Pipeline descriptions, the pipeline objects built from them, and the
//! device-owned [`PipelineCache`].
//!
//! # Deduplication
//!
//! Every description is reduced to a 64-bit xxh3 hash of its shader bytecode
//! hashes and fixed-function state. Creating a pipeline whose hash is already
//! cached returns the cached `Arc` instead of building a new native object.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{GpuError, Result};
use crate::native::{NativeDevice, NativePipeline, PipelineKind};
use crate::resource::FrameBuffer;
use crate::shader::{CompiledShader, ShaderStage};
use crate::types::Format;

// ─── Fixed-Function State ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    AlphaBlend,
    Additive,
}

// ─── Descriptions ────────────────────────────────────────────────────────────

/// Everything needed to build a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub vertex_shader: Arc<CompiledShader>,
    pub pixel_shader: Option<Arc<CompiledShader>>,
    pub color_formats: SmallVec<[Format; 8]>,
    pub depth_format: Option<Format>,
    pub vertex_stride: u32,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub blend: BlendMode,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl GraphicsPipelineDesc {
    #[must_use]
    pub fn new(vertex_shader: Arc<CompiledShader>, pixel_shader: Option<Arc<CompiledShader>>) -> Self {
        Self {
            vertex_shader,
            pixel_shader,
            color_formats: SmallVec::new(),
            depth_format: None,
            vertex_stride: 0,
            topology: PrimitiveTopology::default(),
            cull_mode: CullMode::default(),
            blend: BlendMode::default(),
            depth_test: false,
            depth_write: false,
        }
    }

    #[must_use]
    pub fn with_color_formats(mut self, formats: &[Format]) -> Self {
        self.color_formats = formats.iter().copied().collect();
        self
    }

    /// Enables depth testing and writing against a target of `format`.
    #[must_use]
    pub fn with_depth(mut self, format: Format) -> Self {
        self.depth_format = Some(format);
        self.depth_test = true;
        self.depth_write = true;
        self
    }

    /// Takes the color and depth formats from a frame buffer.
    #[must_use]
    pub fn for_frame_buffer(mut self, frame_buffer: &FrameBuffer) -> Self {
        self.color_formats = frame_buffer.colors().iter().map(|t| t.format()).collect();
        if let Some(depth) = frame_buffer.depth() {
            self = self.with_depth(depth.format());
        }
        self
    }

    #[must_use]
    pub fn with_vertex_stride(mut self, stride: u32) -> Self {
        self.vertex_stride = stride;
        self
    }

    #[must_use]
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    #[must_use]
    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Hash of the shaders and every fixed-function field.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut bytes = Vec::with_capacity(64);
        bytes.push(b'G');
        bytes.extend_from_slice(&self.vertex_shader.hash().to_le_bytes());
        match &self.pixel_shader {
            Some(ps) => bytes.extend_from_slice(&ps.hash().to_le_bytes()),
            None => bytes.extend_from_slice(&[0; 16]),
        }
        bytes.push(self.color_formats.len() as u8);
        for format in &self.color_formats {
            bytes.push(*format as u8);
        }
        bytes.push(self.depth_format.map_or(0xFF, |f| f as u8));
        bytes.extend_from_slice(&self.vertex_stride.to_le_bytes());
        bytes.extend_from_slice(&[
            self.topology as u8,
            self.cull_mode as u8,
            self.blend as u8,
            u8::from(self.depth_test),
            u8::from(self.depth_write),
        ]);
        xxh3_64(&bytes)
    }

    fn validate(&self) -> Result<()> {
        if self.vertex_shader.stage() != ShaderStage::Vertex {
            return Err(GpuError::InvalidState(
                "graphics pipeline vertex shader is not a vertex-stage shader".into(),
            ));
        }
        if self
            .pixel_shader
            .as_ref()
            .is_some_and(|ps| ps.stage() != ShaderStage::Pixel)
        {
            return Err(GpuError::InvalidState(
                "graphics pipeline pixel shader is not a pixel-stage shader".into(),
            ));
        }
        if self.color_formats.len() > FrameBuffer::MAX_COLOR_TARGETS {
            return Err(GpuError::InvalidState(format!(
                "{} color targets exceed the limit of {}",
                self.color_formats.len(),
                FrameBuffer::MAX_COLOR_TARGETS
            )));
        }
        if self.depth_format.is_some_and(|f| !f.is_depth()) {
            return Err(GpuError::InvalidState("depth format is not a depth format".into()));
        }
        Ok(())
    }
}

/// Everything needed to build a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDesc {
    pub shader: Arc<CompiledShader>,
}

impl ComputePipelineDesc {
    #[must_use]
    pub fn new(shader: Arc<CompiledShader>) -> Self {
        Self { shader }
    }

    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut bytes = [0u8; 17];
        bytes[0] = b'C';
        bytes[1..].copy_from_slice(&self.shader.hash().to_le_bytes());
        xxh3_64(&bytes)
    }
}

// ─── Pipelines ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct GraphicsPipeline {
    native: Arc<NativePipeline>,
    desc: GraphicsPipelineDesc,
}

impl GraphicsPipeline {
    #[inline]
    #[must_use]
    pub fn native(&self) -> &Arc<NativePipeline> {
        &self.native
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    #[inline]
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.native.state_hash()
    }
}

#[derive(Debug)]
pub struct ComputePipeline {
    native: Arc<NativePipeline>,
    desc: ComputePipelineDesc,
}

impl ComputePipeline {
    #[inline]
    #[must_use]
    pub fn native(&self) -> &Arc<NativePipeline> {
        &self.native
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &ComputePipelineDesc {
        &self.desc
    }

    #[inline]
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.native.state_hash()
    }
}

// ─── Pipeline Cache ──────────────────────────────────────────────────────────

/// Pipelines deduplicated by state hash.
#[derive(Debug, Default)]
pub struct PipelineCache {
    graphics: Mutex<FxHashMap<u64, Arc<GraphicsPipeline>>>,
    compute: Mutex<FxHashMap<u64, Arc<ComputePipeline>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PipelineCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_graphics(
        &self,
        device: &NativeDevice,
        desc: &GraphicsPipelineDesc,
    ) -> Result<Arc<GraphicsPipeline>> {
        desc.validate()?;
        let hash = desc.state_hash();
        let mut graphics = self.graphics.lock();
        if let Some(pipeline) = graphics.get(&hash) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(pipeline));
        }

        let mut bytecode: SmallVec<[&[u8]; 2]> = SmallVec::new();
        bytecode.push(desc.vertex_shader.bytecode());
        if let Some(ps) = &desc.pixel_shader {
            bytecode.push(ps.bytecode());
        }
        let native = device
            .create_pipeline_state(PipelineKind::Graphics, &bytecode, hash)
            .map_err(|e| {
                log::error!("Failed to create graphics pipeline {hash:016x}: {e}");
                GpuError::from(e)
            })?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Created graphics pipeline {hash:016x}");

        let pipeline = Arc::new(GraphicsPipeline {
            native,
            desc: desc.clone(),
        });
        graphics.insert(hash, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    pub fn get_or_create_compute(
        &self,
        device: &NativeDevice,
        desc: &ComputePipelineDesc,
    ) -> Result<Arc<ComputePipeline>> {
        if desc.shader.stage() != ShaderStage::Compute {
            return Err(GpuError::InvalidState(
                "compute pipeline shader is not a compute-stage shader".into(),
            ));
        }
        let hash = desc.state_hash();
        let mut compute = self.compute.lock();
        if let Some(pipeline) = compute.get(&hash) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(pipeline));
        }

        let native = device
            .create_pipeline_state(PipelineKind::Compute, &[desc.shader.bytecode()], hash)
            .map_err(|e| {
                log::error!("Failed to create compute pipeline {hash:016x}: {e}");
                GpuError::from(e)
            })?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Created compute pipeline {hash:016x}");

        let pipeline = Arc::new(ComputePipeline {
            native,
            desc: desc.clone(),
        });
        compute.insert(hash, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Number of cached pipelines of both kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphics.lock().len() + self.compute.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
