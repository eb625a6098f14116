//! Native device: the factory for every driver object.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::command::{NativeCommandAllocator, NativeCommandList};
use super::descriptor::NativeDescriptorHeap;
use super::pipeline::{NativePipeline, PipelineKind};
use super::queue::{ExecutionMode, NativeQueue};
use super::resource::{HeapType, NativeResource, ResourceDesc};
use super::swapchain::NativeSwapChain;
use super::sync::NativeFence;
use super::{NativeError, NativeResult};
use crate::resource::ResourceState;
use crate::types::{DescriptorType, Format, QueueType};

/// Default emulated VRAM budget (4 GiB).
const DEFAULT_MEMORY_BUDGET: u64 = 4 << 30;

/// Spacing between descriptor heap base addresses.
const HEAP_ADDRESS_ALIGNMENT: u64 = 0x1_0000;

// ─── Device Status ───────────────────────────────────────────────────────────

/// Removal state shared by the device and every object that can block on it.
#[derive(Debug, Default)]
pub struct DeviceStatus {
    removed: AtomicBool,
    reason: Mutex<Option<String>>,
    fences: Mutex<Vec<Weak<NativeFence>>>,
}

impl DeviceStatus {
    #[inline]
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn removal_reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    pub(crate) fn check(&self) -> NativeResult<()> {
        if self.is_removed() {
            Err(NativeError::DeviceRemoved(
                self.removal_reason().unwrap_or_default(),
            ))
        } else {
            Ok(())
        }
    }

    fn register_fence(&self, fence: &Arc<NativeFence>) {
        let mut fences = self.fences.lock();
        fences.retain(|f| f.strong_count() > 0);
        fences.push(Arc::downgrade(fence));
    }

    fn remove(&self, reason: &str) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.reason.lock() = Some(reason.to_string());
        log::error!("Native device removed: {reason}");

        let fences: Vec<_> = self.fences.lock().iter().filter_map(Weak::upgrade).collect();
        for fence in fences {
            fence.release_waiters();
        }
    }
}

// ─── Device ──────────────────────────────────────────────────────────────────

/// The native device.
pub struct NativeDevice {
    status: Arc<DeviceStatus>,
    next_object_id: AtomicU64,
    next_heap_address: AtomicU64,
    memory_budget: u64,
    memory_in_use: Arc<AtomicU64>,
    validation: bool,
}

impl NativeDevice {
    #[must_use]
    pub fn new(validation: bool) -> Self {
        Self {
            status: Arc::new(DeviceStatus::default()),
            next_object_id: AtomicU64::new(1),
            next_heap_address: AtomicU64::new(HEAP_ADDRESS_ALIGNMENT),
            memory_budget: DEFAULT_MEMORY_BUDGET,
            memory_in_use: Arc::new(AtomicU64::new(0)),
            validation,
        }
    }

    /// Overrides the emulated VRAM budget.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> &Arc<DeviceStatus> {
        &self.status
    }

    #[inline]
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.status.is_removed()
    }

    /// Simulates device removal (TDR, driver crash, unplug).
    pub fn remove(&self, reason: &str) {
        self.status.remove(reason);
    }

    #[inline]
    #[must_use]
    pub fn memory_in_use(&self) -> u64 {
        self.memory_in_use.load(Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.next_object_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Fixed size of one descriptor of the given type.
    #[must_use]
    pub const fn descriptor_increment_size(kind: DescriptorType) -> u32 {
        match kind {
            DescriptorType::RenderTarget | DescriptorType::DepthStencil => 32,
            DescriptorType::CbvSrvUav => 64,
            DescriptorType::Sampler => 16,
        }
    }

    // ── Queues & synchronization ─────────────────────────────────────────────

    pub fn create_command_queue(
        &self,
        kind: QueueType,
        mode: ExecutionMode,
    ) -> NativeResult<NativeQueue> {
        self.status.check()?;
        NativeQueue::new(self.next_id(), kind, mode, self.validation, Arc::clone(&self.status))
    }

    pub fn create_fence(&self, initial_value: u64) -> NativeResult<Arc<NativeFence>> {
        self.status.check()?;
        let fence = Arc::new(NativeFence::new(
            self.next_id(),
            initial_value,
            Arc::clone(&self.status),
        ));
        self.status.register_fence(&fence);
        Ok(fence)
    }

    // ── Command recording ────────────────────────────────────────────────────

    pub fn create_command_allocator(&self, kind: QueueType) -> NativeResult<NativeCommandAllocator> {
        self.status.check()?;
        Ok(NativeCommandAllocator::new(self.next_id(), kind))
    }

    /// Creates a command list in the closed state; `reset` it before recording.
    pub fn create_command_list(&self, kind: QueueType) -> NativeResult<NativeCommandList> {
        self.status.check()?;
        Ok(NativeCommandList::new(self.next_id(), kind))
    }

    // ── Resources ────────────────────────────────────────────────────────────

    pub fn create_committed_resource(
        &self,
        desc: &ResourceDesc,
        heap: HeapType,
        initial_state: ResourceState,
        name: &str,
    ) -> NativeResult<Arc<NativeResource>> {
        self.status.check()?;
        let size = desc.byte_size();
        if size == 0 {
            return Err(NativeError::InvalidCall("resource with zero size"));
        }
        if heap == HeapType::Upload && initial_state != ResourceState::GENERIC_READ {
            return Err(NativeError::InvalidCall(
                "upload heap resources must start in GENERIC_READ",
            ));
        }
        if heap == HeapType::Readback && initial_state != ResourceState::COPY_DEST {
            return Err(NativeError::InvalidCall(
                "readback heap resources must start in COPY_DEST",
            ));
        }

        let in_use = self.memory_in_use.fetch_add(size, Ordering::AcqRel);
        if in_use + size > self.memory_budget {
            self.memory_in_use.fetch_sub(size, Ordering::AcqRel);
            return Err(NativeError::OutOfMemory { requested: size });
        }

        log::trace!("Native resource '{name}' created ({size} bytes, {heap:?})");
        Ok(Arc::new(NativeResource::new(
            self.next_id(),
            desc.clone(),
            heap,
            initial_state,
            name,
            Arc::clone(&self.memory_in_use),
        )))
    }

    // ── Descriptors ──────────────────────────────────────────────────────────

    pub fn create_descriptor_heap(
        &self,
        kind: DescriptorType,
        capacity: u32,
        shader_visible: bool,
    ) -> NativeResult<NativeDescriptorHeap> {
        self.status.check()?;
        if shader_visible && !kind.is_shader_visible() {
            return Err(NativeError::InvalidCall(
                "render-target and depth-stencil heaps cannot be shader-visible",
            ));
        }
        let stride = Self::descriptor_increment_size(kind);
        let span = (u64::from(capacity) * u64::from(stride)).next_multiple_of(HEAP_ADDRESS_ALIGNMENT)
            + HEAP_ADDRESS_ALIGNMENT;
        let base = self.next_heap_address.fetch_add(span, Ordering::Relaxed);
        Ok(NativeDescriptorHeap::new(kind, capacity, stride, base, shader_visible))
    }

    // ── Pipelines ────────────────────────────────────────────────────────────

    pub fn create_pipeline_state(
        &self,
        kind: PipelineKind,
        shader_bytecode: &[&[u8]],
        state_hash: u64,
    ) -> NativeResult<Arc<NativePipeline>> {
        self.status.check()?;
        if shader_bytecode.is_empty() || shader_bytecode.iter().any(|code| code.is_empty()) {
            return Err(NativeError::InvalidCall("pipeline state without shader bytecode"));
        }
        Ok(Arc::new(NativePipeline::new(self.next_id(), kind, state_hash)))
    }

    // ── Presentation ─────────────────────────────────────────────────────────

    pub fn create_swap_chain(
        &self,
        width: u32,
        height: u32,
        format: Format,
        buffer_count: u32,
    ) -> NativeResult<NativeSwapChain> {
        self.status.check()?;
        if buffer_count < 2 {
            return Err(NativeError::InvalidCall("swap chains need at least two buffers"));
        }
        let buffers = self.create_back_buffers(width, height, format, buffer_count)?;
        Ok(NativeSwapChain::new(buffers, format))
    }

    /// Recreates the back buffers of an existing swap chain.
    pub fn resize_swap_chain(
        &self,
        swap_chain: &mut NativeSwapChain,
        width: u32,
        height: u32,
    ) -> NativeResult<()> {
        self.status.check()?;
        let count = swap_chain.buffer_count();
        let buffers = self.create_back_buffers(width, height, swap_chain.format(), count)?;
        swap_chain.replace_buffers(buffers);
        Ok(())
    }

    fn create_back_buffers(
        &self,
        width: u32,
        height: u32,
        format: Format,
        count: u32,
    ) -> NativeResult<Vec<Arc<NativeResource>>> {
        (0..count)
            .map(|i| {
                self.create_committed_resource(
                    &ResourceDesc::texture_2d(width, height, format),
                    HeapType::Default,
                    ResourceState::PRESENT,
                    &format!("BackBuffer{i}"),
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for NativeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDevice")
            .field("removed", &self.is_removed())
            .field("memory_in_use", &self.memory_in_use())
            .finish_non_exhaustive()
    }
}
