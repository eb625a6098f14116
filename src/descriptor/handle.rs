use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use super::heap::DescriptorHeap;
use crate::errors::{GpuError, Result};
use crate::native::{CpuDescriptorHandle, GpuDescriptorHandle, ViewDesc};
use crate::types::DescriptorType;

/// An allocated descriptor slot.
///
/// Holds only a weak reference to its heap: the handle never keeps the heap
/// alive, and releasing a handle whose heap is gone is a no-op. The slot is
/// released on drop, or earlier through [`DescriptorHandle::release`].
pub struct DescriptorHandle {
    index: u32,
    kind: DescriptorType,
    cpu: CpuDescriptorHandle,
    gpu: GpuDescriptorHandle,
    heap: Weak<DescriptorHeap>,
    released: AtomicBool,
}

impl DescriptorHandle {
    pub(super) fn new(
        index: u32,
        kind: DescriptorType,
        cpu: CpuDescriptorHandle,
        gpu: GpuDescriptorHandle,
        heap: Weak<DescriptorHeap>,
    ) -> Self {
        Self {
            index,
            kind,
            cpu,
            gpu,
            heap,
            released: AtomicBool::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> DescriptorType {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn cpu(&self) -> CpuDescriptorHandle {
        self.cpu
    }

    /// GPU address; [`GpuDescriptorHandle::NULL`] for CPU-only heaps.
    #[inline]
    #[must_use]
    pub fn gpu(&self) -> GpuDescriptorHandle {
        self.gpu
    }

    #[inline]
    #[must_use]
    pub fn is_shader_visible(&self) -> bool {
        !self.gpu.is_null()
    }

    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Writes a view into the slot.
    pub fn write(&self, view: ViewDesc) -> Result<()> {
        if self.is_released() {
            return Err(GpuError::InvalidDescriptor(format!(
                "{:?} slot {} was released",
                self.kind, self.index
            )));
        }
        let heap = self.heap.upgrade().ok_or_else(|| {
            GpuError::InvalidDescriptor(format!("{:?} heap no longer exists", self.kind))
        })?;
        heap.write(self.index, view)
    }

    /// Returns the slot to its heap. Idempotent: only the first call has an
    /// effect. Returns `true` if this call released the slot.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.heap.upgrade() {
            Some(heap) => heap.free(self.index),
            None => false,
        }
    }
}

impl Drop for DescriptorHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DescriptorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHandle")
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("cpu", &self.cpu)
            .field("gpu", &self.gpu)
            .field("released", &self.is_released())
            .finish()
    }
}
