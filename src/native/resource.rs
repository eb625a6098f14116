//! Committed resources backed by emulated device memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard};

use super::{NativeError, NativeResult};
use crate::resource::ResourceState;
use crate::types::Format;

/// Memory pool a resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapType {
    /// GPU-local memory; not CPU-mappable.
    Default,
    /// CPU-writable staging memory.
    Upload,
    /// CPU-readable destination for GPU copies.
    Readback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    Buffer,
    Texture2D,
}

bitflags! {
    /// Usages a resource must declare at creation to be bound as a view of that kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        const ALLOW_RENDER_TARGET = 1 << 0;
        const ALLOW_DEPTH_STENCIL = 1 << 1;
        const ALLOW_UNORDERED_ACCESS = 1 << 2;
    }
}

/// Creation parameters of a committed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    /// Width in texels, or size in bytes for buffers.
    pub width: u64,
    pub height: u32,
    pub format: Format,
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    #[must_use]
    pub fn buffer(size: u64) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            format: Format::Unknown,
            flags: ResourceFlags::empty(),
        }
    }

    #[must_use]
    pub fn texture_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::Texture2D,
            width: u64::from(width),
            height,
            format,
            flags: ResourceFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Size of the backing allocation in bytes.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        match self.dimension {
            ResourceDimension::Buffer => self.width,
            ResourceDimension::Texture2D => {
                self.width * u64::from(self.height) * u64::from(self.format.bytes_per_pixel())
            }
        }
    }

    /// Bytes per row for textures, total size for buffers.
    #[must_use]
    pub fn row_pitch(&self) -> u64 {
        match self.dimension {
            ResourceDimension::Buffer => self.width,
            ResourceDimension::Texture2D => self.width * u64::from(self.format.bytes_per_pixel()),
        }
    }
}

/// A committed GPU resource.
pub struct NativeResource {
    id: u64,
    desc: ResourceDesc,
    heap: HeapType,
    name: String,
    memory: Mutex<Vec<u8>>,
    gpu_state: Mutex<ResourceState>,
    budget: Arc<AtomicU64>,
}

impl NativeResource {
    pub(super) fn new(
        id: u64,
        desc: ResourceDesc,
        heap: HeapType,
        initial_state: ResourceState,
        name: &str,
        budget: Arc<AtomicU64>,
    ) -> Self {
        let size = desc.byte_size() as usize;
        Self {
            id,
            desc,
            heap,
            name: name.to_string(),
            memory: Mutex::new(vec![0; size]),
            gpu_state: Mutex::new(initial_state),
            budget,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    #[inline]
    #[must_use]
    pub fn heap(&self) -> HeapType {
        self.heap
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.desc.byte_size()
    }

    /// The state the GPU currently holds the resource in (as seen by executed barriers).
    #[must_use]
    pub fn gpu_state(&self) -> ResourceState {
        *self.gpu_state.lock()
    }

    pub(super) fn gpu_state_mut(&self) -> MutexGuard<'_, ResourceState> {
        self.gpu_state.lock()
    }

    pub(super) fn memory(&self) -> MutexGuard<'_, Vec<u8>> {
        self.memory.lock()
    }

    /// Writes through a CPU mapping. Upload heap only.
    pub fn write_mapped(&self, offset: u64, data: &[u8]) -> NativeResult<()> {
        if self.heap != HeapType::Upload {
            return Err(NativeError::InvalidCall("only upload resources are CPU-writable"));
        }
        let mut memory = self.memory.lock();
        let range = byte_range(offset, data.len() as u64, memory.len())?;
        memory[range].copy_from_slice(data);
        Ok(())
    }

    /// Reads through a CPU mapping. Readback heap only.
    pub fn read_mapped(&self) -> NativeResult<Vec<u8>> {
        if self.heap != HeapType::Readback {
            return Err(NativeError::InvalidCall("only readback resources are CPU-readable"));
        }
        Ok(self.memory.lock().clone())
    }
}

pub(super) fn byte_range(
    offset: u64,
    len: u64,
    size: usize,
) -> NativeResult<std::ops::Range<usize>> {
    let end = offset
        .checked_add(len)
        .ok_or(NativeError::InvalidCall("byte range overflows"))?;
    if end > size as u64 {
        return Err(NativeError::InvalidCall("byte range exceeds resource size"));
    }
    Ok(offset as usize..end as usize)
}

impl Drop for NativeResource {
    fn drop(&mut self) {
        self.budget.fetch_sub(self.desc.byte_size(), Ordering::AcqRel);
    }
}

impl std::fmt::Debug for NativeResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeResource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("heap", &self.heap)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}
