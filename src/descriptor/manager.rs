use std::sync::Arc;

use super::handle::DescriptorHandle;
use super::heap::DescriptorHeap;
use crate::errors::{GpuError, Result};
use crate::native::NativeDevice;
use crate::settings::DescriptorCapacities;
use crate::types::DescriptorType;

/// Slot usage of one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorUsage {
    pub allocated: u32,
    pub capacity: u32,
}

/// Owns one [`DescriptorHeap`] per descriptor type.
#[derive(Debug)]
pub struct DescriptorHeapManager {
    heaps: [Arc<DescriptorHeap>; 4],
}

impl DescriptorHeapManager {
    pub fn new(device: &NativeDevice, capacities: &DescriptorCapacities) -> Result<Self> {
        let heap = |kind| DescriptorHeap::new(device, kind, capacities.get(kind));
        Ok(Self {
            heaps: [
                heap(DescriptorType::RenderTarget)?,
                heap(DescriptorType::DepthStencil)?,
                heap(DescriptorType::CbvSrvUav)?,
                heap(DescriptorType::Sampler)?,
            ],
        })
    }

    #[inline]
    #[must_use]
    pub fn heap(&self, kind: DescriptorType) -> &Arc<DescriptorHeap> {
        &self.heaps[kind.index()]
    }

    /// Allocates a slot of the given type, or `None` when that heap is full.
    #[must_use]
    pub fn allocate(&self, kind: DescriptorType) -> Option<DescriptorHandle> {
        self.heap(kind).allocate()
    }

    /// Like [`allocate`](Self::allocate), reporting exhaustion as
    /// [`GpuError::DescriptorHeapExhausted`].
    pub fn try_allocate(&self, kind: DescriptorType) -> Result<DescriptorHandle> {
        self.allocate(kind).ok_or_else(|| {
            let capacity = self.heap(kind).capacity();
            log::warn!("{kind:?} descriptor heap exhausted ({capacity} slots)");
            GpuError::DescriptorHeapExhausted { kind, capacity }
        })
    }

    /// Releases a slot. Idempotent.
    pub fn free(&self, handle: &DescriptorHandle) {
        handle.release();
    }

    #[must_use]
    pub fn usage(&self, kind: DescriptorType) -> DescriptorUsage {
        let heap = self.heap(kind);
        DescriptorUsage {
            allocated: heap.allocated_count(),
            capacity: heap.capacity(),
        }
    }
}
