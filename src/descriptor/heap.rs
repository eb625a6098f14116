use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::DescriptorHandle;
use crate::errors::{GpuError, Result};
use crate::native::{NativeDescriptorHeap, NativeDevice, ViewDesc};
use crate::types::DescriptorType;

#[derive(Debug, Default)]
struct SlotState {
    /// Slots below the watermark have been handed out at least once.
    watermark: u32,
    /// Reclaimed slots, smallest first.
    free: BTreeSet<u32>,
}

/// Fixed-capacity slot allocator over one native descriptor heap.
///
/// Allocation pops the smallest reclaimed index, else bumps the watermark,
/// and fails once both are exhausted. The heap never grows.
pub struct DescriptorHeap {
    kind: DescriptorType,
    native: NativeDescriptorHeap,
    slots: Mutex<SlotState>,
}

impl DescriptorHeap {
    pub fn new(device: &NativeDevice, kind: DescriptorType, capacity: u32) -> Result<Arc<Self>> {
        let native = device
            .create_descriptor_heap(kind, capacity, kind.is_shader_visible())
            .map_err(|e| {
                log::error!("Failed to create {kind:?} descriptor heap: {e}");
                GpuError::from(e)
            })?;
        log::debug!("{kind:?} descriptor heap created ({capacity} slots)");
        Ok(Arc::new(Self {
            kind,
            native,
            slots: Mutex::new(SlotState::default()),
        }))
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> DescriptorType {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.native.capacity()
    }

    #[inline]
    #[must_use]
    pub fn native(&self) -> &NativeDescriptorHeap {
        &self.native
    }

    /// Hands out a slot, or `None` when the heap is full.
    #[must_use]
    pub fn allocate(self: &Arc<Self>) -> Option<DescriptorHandle> {
        let index = {
            let mut slots = self.slots.lock();
            if let Some(index) = slots.free.pop_first() {
                index
            } else if slots.watermark < self.capacity() {
                slots.watermark += 1;
                slots.watermark - 1
            } else {
                return None;
            }
        };
        Some(DescriptorHandle::new(
            index,
            self.kind,
            self.native.cpu_handle(index),
            self.native.gpu_handle(index),
            Arc::downgrade(self),
        ))
    }

    /// Returns a slot to the free list. Returns `false` (and changes nothing)
    /// for an index that is not currently allocated.
    pub(super) fn free(&self, index: u32) -> bool {
        let mut slots = self.slots.lock();
        if index >= slots.watermark || slots.free.contains(&index) {
            log::warn!("{:?} descriptor {index} freed twice or never allocated", self.kind);
            return false;
        }
        self.native.clear(index);
        slots.free.insert(index);
        true
    }

    pub(super) fn write(&self, index: u32, view: ViewDesc) -> Result<()> {
        self.native.write(index, view).map_err(GpuError::from)
    }

    /// Number of slots currently handed out.
    #[must_use]
    pub fn allocated_count(&self) -> u32 {
        let slots = self.slots.lock();
        slots.watermark - slots.free.len() as u32
    }

    /// Highest index ever handed out, plus one.
    #[must_use]
    pub fn watermark(&self) -> u32 {
        self.slots.lock().watermark
    }

    /// Snapshot of the reclaimed indices, ascending.
    #[must_use]
    pub fn free_list(&self) -> Vec<u32> {
        self.slots.lock().free.iter().copied().collect()
    }

    #[must_use]
    pub fn is_allocated(&self, index: u32) -> bool {
        let slots = self.slots.lock();
        index < slots.watermark && !slots.free.contains(&index)
    }
}

impl std::fmt::Debug for DescriptorHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated_count())
            .finish()
    }
}
