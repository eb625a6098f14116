use std::sync::Arc;

use super::tracked::{GpuResource, ResourceCore};
use super::state::ResourceState;
use crate::descriptor::DescriptorHandle;
use crate::types::Format;

/// Constant buffer views must cover a multiple of this many bytes.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Constant,
    Vertex { stride: u32 },
    Index { format: Format },
}

impl BufferUsage {
    /// The state the buffer rests in between uses.
    #[must_use]
    pub const fn resting_state(self) -> ResourceState {
        match self {
            BufferUsage::Constant | BufferUsage::Vertex { .. } => {
                ResourceState::VERTEX_AND_CONSTANT_BUFFER
            }
            BufferUsage::Index { .. } => ResourceState::INDEX_BUFFER,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            BufferUsage::Constant => "ConstantBuffer",
            BufferUsage::Vertex { .. } => "VertexBuffer",
            BufferUsage::Index { .. } => "IndexBuffer",
        }
    }
}

/// A GPU buffer in device-local memory.
///
/// Constant buffers own a CBV slot; vertex and index buffers are bound
/// directly and carry no descriptor.
#[derive(Debug)]
pub struct Buffer {
    core: Arc<ResourceCore>,
    usage: BufferUsage,
    size: u64,
    view: Option<DescriptorHandle>,
}

impl Buffer {
    pub(crate) fn new(
        core: Arc<ResourceCore>,
        usage: BufferUsage,
        size: u64,
        view: Option<DescriptorHandle>,
    ) -> Self {
        Self {
            core,
            usage,
            size,
            view,
        }
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Size in bytes (padded to [`CONSTANT_BUFFER_ALIGNMENT`] for constant buffers).
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Vertex stride, for vertex buffers.
    #[must_use]
    pub fn stride(&self) -> Option<u32> {
        match self.usage {
            BufferUsage::Vertex { stride } => Some(stride),
            _ => None,
        }
    }

    /// Element format, for index buffers.
    #[must_use]
    pub fn index_format(&self) -> Option<Format> {
        match self.usage {
            BufferUsage::Index { format } => Some(format),
            _ => None,
        }
    }

    /// Number of vertices or indices; 0 for constant buffers.
    #[must_use]
    pub fn element_count(&self) -> u64 {
        match self.usage {
            BufferUsage::Vertex { stride } if stride > 0 => self.size / u64::from(stride),
            BufferUsage::Index { format } => self.size / u64::from(format.bytes_per_pixel()),
            _ => 0,
        }
    }

    /// The constant buffer view, for constant buffers.
    #[inline]
    #[must_use]
    pub fn view(&self) -> Option<&DescriptorHandle> {
        self.view.as_ref()
    }
}

impl GpuResource for Buffer {
    #[inline]
    fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }
}
