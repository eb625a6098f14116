//! Descriptor heaps: fixed-size arrays of views addressed by CPU/GPU pointers.

use std::sync::Arc;

use parking_lot::Mutex;

use super::resource::NativeResource;
use super::{NativeError, NativeResult};
use crate::types::{DescriptorType, Format};

/// Offset separating the GPU address space from CPU descriptor addresses.
const GPU_ADDRESS_OFFSET: u64 = 1 << 48;

/// CPU-side descriptor address, used when writing views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(pub u64);

/// GPU-side descriptor address, used by shaders through descriptor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(pub u64);

impl GpuDescriptorHandle {
    /// Sentinel carried by descriptors that live in CPU-only heaps.
    pub const NULL: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Filtering mode of a sampler view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerFilter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

/// A view written into a descriptor slot.
#[derive(Debug, Clone)]
pub enum ViewDesc {
    ConstantBuffer {
        resource: Arc<NativeResource>,
        size: u64,
    },
    ShaderResource {
        resource: Arc<NativeResource>,
        format: Format,
    },
    UnorderedAccess {
        resource: Arc<NativeResource>,
        format: Format,
    },
    RenderTarget {
        resource: Arc<NativeResource>,
        format: Format,
    },
    DepthStencil {
        resource: Arc<NativeResource>,
        format: Format,
    },
    Sampler {
        filter: SamplerFilter,
    },
}

impl ViewDesc {
    /// The heap family this view must be written into.
    #[must_use]
    pub fn heap_type(&self) -> DescriptorType {
        match self {
            ViewDesc::ConstantBuffer { .. }
            | ViewDesc::ShaderResource { .. }
            | ViewDesc::UnorderedAccess { .. } => DescriptorType::CbvSrvUav,
            ViewDesc::RenderTarget { .. } => DescriptorType::RenderTarget,
            ViewDesc::DepthStencil { .. } => DescriptorType::DepthStencil,
            ViewDesc::Sampler { .. } => DescriptorType::Sampler,
        }
    }
}

/// A descriptor heap.
pub struct NativeDescriptorHeap {
    kind: DescriptorType,
    capacity: u32,
    stride: u32,
    cpu_base: u64,
    shader_visible: bool,
    slots: Mutex<Vec<Option<ViewDesc>>>,
}

impl NativeDescriptorHeap {
    pub(super) fn new(
        kind: DescriptorType,
        capacity: u32,
        stride: u32,
        cpu_base: u64,
        shader_visible: bool,
    ) -> Self {
        Self {
            kind,
            capacity,
            stride,
            cpu_base,
            shader_visible,
            slots: Mutex::new(vec![None; capacity as usize]),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> DescriptorType {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Distance in bytes between consecutive descriptors.
    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    #[inline]
    #[must_use]
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        CpuDescriptorHandle(self.cpu_base + u64::from(index) * u64::from(self.stride))
    }

    /// GPU address of a slot; [`GpuDescriptorHandle::NULL`] for CPU-only heaps.
    #[inline]
    #[must_use]
    pub fn gpu_handle(&self, index: u32) -> GpuDescriptorHandle {
        if self.shader_visible {
            GpuDescriptorHandle(
                GPU_ADDRESS_OFFSET + self.cpu_base + u64::from(index) * u64::from(self.stride),
            )
        } else {
            GpuDescriptorHandle::NULL
        }
    }

    /// Writes a view into a slot.
    pub fn write(&self, index: u32, view: ViewDesc) -> NativeResult<()> {
        if index >= self.capacity {
            return Err(NativeError::InvalidCall("descriptor index out of heap range"));
        }
        if view.heap_type() != self.kind {
            return Err(NativeError::InvalidCall("view type does not match descriptor heap type"));
        }
        self.slots.lock()[index as usize] = Some(view);
        Ok(())
    }

    /// Clears a slot, dropping the reference to the viewed resource.
    pub fn clear(&self, index: u32) {
        if let Some(slot) = self.slots.lock().get_mut(index as usize) {
            *slot = None;
        }
    }

    #[must_use]
    pub fn view(&self, index: u32) -> Option<ViewDesc> {
        self.slots.lock().get(index as usize).cloned().flatten()
    }
}

impl std::fmt::Debug for NativeDescriptorHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDescriptorHeap")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("shader_visible", &self.shader_visible)
            .finish_non_exhaustive()
    }
}
