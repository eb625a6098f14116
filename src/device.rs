//! GPU Device
//!
//! [`Device`] is the single owner of the queues, their fences and allocator
//! pools, the descriptor heaps, the shader and pipeline caches, and the swap
//! chain. It is also the only construction point for buffers, textures,
//! render targets and pipelines.
//!
//! # Design
//!
//! ```text
//! Device
//!  ├── NativeDevice
//!  ├── queues[Graphics | Compute | Copy]  ── CommandQueue { NativeQueue, Fence, CommandAllocatorPool }
//!  ├── immediate[Graphics | Compute | Copy] ── Mutex<NativeCommandList>  (synchronous one-off work)
//!  ├── DescriptorHeapManager
//!  ├── ShaderCache, PipelineCache
//!  └── Mutex<Option<SwapChain>>
//!
//! create_graphics_context() ──► CommandContext<'_, GraphicsKind>   (borrows the device)
//! ```
//!
//! Contexts borrow the device, so the device always outlives them. Resources
//! do not reference the device at all.
//!
//! # Execution modes
//!
//! With [`ExecutionMode::Manual`] nothing executes until
//! [`process_queues`](Device::process_queues) runs. Every blocking wait of the
//! device first pumps the queues itself and reports
//! [`GpuError::InvalidState`] instead of blocking when the awaited value still
//! cannot complete (a GPU-side wait that nobody will satisfy).
//!
//! # Immediate contexts
//!
//! Initial uploads, readbacks and presentation record on a per-queue immediate
//! command list guarded by a mutex. Holding an immediate context while calling
//! a device method that needs the same immediate context deadlocks.
//!
//! Copy queues only accept `COMMON`, `COPY_SOURCE` and `COPY_DEST`. Uploads
//! into resources that rest elsewhere and readbacks of resources in any other
//! state run on the graphics queue.

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::command::{
    CommandContext, ComputeContext, ContextKind, CopyContext, CopyKind, GraphicsContext,
    GraphicsKind, ListSlot,
};
use crate::descriptor::{DescriptorHandle, DescriptorHeapManager, DescriptorUsage};
use crate::errors::{GpuError, Result};
use crate::fence::Fence;
use crate::native::{
    ExecutionMode, HeapType, NativeCommandList, NativeDevice, NativeResource, QueueStatsSnapshot,
    ResourceDesc, ResourceFlags, ViewDesc,
};
use crate::pipeline::{
    ComputePipeline, ComputePipelineDesc, GraphicsPipeline, GraphicsPipelineDesc, PipelineCache,
};
use crate::queue::CommandQueue;
use crate::resource::{
    Buffer, BufferUsage, CONSTANT_BUFFER_ALIGNMENT, FrameBuffer, GpuResource, RenderTarget,
    ResourceCore, ResourceState, TargetView, Texture2D, TransitionTarget,
};
use crate::settings::DeviceSettings;
use crate::shader::{CompiledShader, ShaderCache, ShaderStage};
use crate::swapchain::{SwapChain, WindowDesc};
use crate::types::{ClearColor, DescriptorType, Format, QueueType};

/// A snapshot of device-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Per queue, indexed by [`QueueType::index`].
    pub queues: [QueueStatsSnapshot; 3],
    /// Allocators ever created, per queue.
    pub allocators: [usize; 3],
    /// Per heap, indexed by [`DescriptorType::index`].
    pub descriptors: [DescriptorUsage; 4],
    pub pipelines: usize,
    pub shaders: usize,
    pub memory_in_use: u64,
}

impl DeviceStats {
    /// The counters of all queues added together.
    #[must_use]
    pub fn total(&self) -> QueueStatsSnapshot {
        self.queues
            .iter()
            .fold(QueueStatsSnapshot::default(), |acc, q| acc + *q)
    }

    #[must_use]
    pub fn queue(&self, kind: QueueType) -> &QueueStatsSnapshot {
        &self.queues[kind.index()]
    }

    #[must_use]
    pub fn descriptor_usage(&self, kind: DescriptorType) -> DescriptorUsage {
        self.descriptors[kind.index()]
    }
}

/// The GPU device.
pub struct Device {
    settings: DeviceSettings,
    queues: [CommandQueue; 3],
    immediate: [Mutex<NativeCommandList>; 3],
    descriptors: DescriptorHeapManager,
    shaders: ShaderCache,
    pipelines: PipelineCache,
    swap_chain: Mutex<Option<SwapChain>>,
    native: NativeDevice,
}

impl Device {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Creates a headless device.
    pub fn new(settings: DeviceSettings) -> Result<Self> {
        Self::with_native(NativeDevice::new(settings.validation), settings)
    }

    /// Creates a device presenting to `window`.
    pub fn with_window(settings: DeviceSettings, window: WindowDesc) -> Result<Self> {
        let device = Self::new(settings)?;
        let swap_chain = SwapChain::new(
            &device.native,
            window,
            device.settings.back_buffer_count,
            device.settings.back_buffer_format,
            device.settings.vsync,
        )?;
        log::info!(
            "[{}] Swap chain created: {}x{} {:?} x{}",
            device.settings.label(),
            window.width,
            window.height,
            device.settings.back_buffer_format,
            device.settings.back_buffer_count
        );
        *device.swap_chain.lock() = Some(swap_chain);
        Ok(device)
    }

    /// Creates a device on an existing native device, e.g. one with a
    /// reduced memory budget.
    pub fn with_native(native: NativeDevice, settings: DeviceSettings) -> Result<Self> {
        let creation = |e: GpuError| GpuError::DeviceCreation(e.to_string());
        let mode = settings.execution;

        let queues = [
            CommandQueue::new(&native, QueueType::Graphics, mode).map_err(creation)?,
            CommandQueue::new(&native, QueueType::Compute, mode).map_err(creation)?,
            CommandQueue::new(&native, QueueType::Copy, mode).map_err(creation)?,
        ];
        let immediate_list = |kind| {
            native
                .create_command_list(kind)
                .map(Mutex::new)
                .map_err(|e| creation(e.into()))
        };
        let immediate = [
            immediate_list(QueueType::Graphics)?,
            immediate_list(QueueType::Compute)?,
            immediate_list(QueueType::Copy)?,
        ];
        let descriptors = DescriptorHeapManager::new(&native, &settings.descriptor_capacities)
            .map_err(creation)?;

        log::info!(
            "[{}] Device created ({:?} execution, validation {})",
            settings.label(),
            mode,
            if settings.validation { "on" } else { "off" }
        );

        Ok(Self {
            settings,
            queues,
            immediate,
            descriptors,
            shaders: ShaderCache::new(),
            pipelines: PipelineCache::new(),
            swap_chain: Mutex::new(None),
            native,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn native(&self) -> &NativeDevice {
        &self.native
    }

    #[inline]
    #[must_use]
    pub fn queue(&self, kind: QueueType) -> &CommandQueue {
        &self.queues[kind.index()]
    }

    #[inline]
    #[must_use]
    pub fn descriptors(&self) -> &DescriptorHeapManager {
        &self.descriptors
    }

    #[inline]
    #[must_use]
    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    #[inline]
    #[must_use]
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.native.is_removed()
    }

    #[must_use]
    pub fn has_swap_chain(&self) -> bool {
        self.swap_chain.lock().is_some()
    }

    /// Runs `f` against the swap chain, if there is one.
    pub fn with_swap_chain<R>(&self, f: impl FnOnce(&SwapChain) -> R) -> Option<R> {
        self.swap_chain.lock().as_ref().map(f)
    }

    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            queues: QueueType::ALL.map(|kind| self.queue(kind).stats()),
            allocators: QueueType::ALL.map(|kind| self.queue(kind).allocator_pool().allocator_count()),
            descriptors: DescriptorType::ALL.map(|kind| self.descriptors.usage(kind)),
            pipelines: self.pipelines.len(),
            shaders: self.shaders.len(),
            memory_in_use: self.native.memory_in_use(),
        }
    }

    // ========================================================================
    // Execution & Synchronization
    // ========================================================================

    /// Manual execution: retires everything the queues can currently retire,
    /// repeating until no queue makes progress. Returns the number of
    /// operations retired. A no-op for threaded execution.
    pub fn process_queues(&self) -> usize {
        if self.settings.execution != ExecutionMode::Manual {
            return 0;
        }
        let mut total = 0;
        loop {
            let retired: usize = self
                .queues
                .iter()
                .map(|queue| queue.native().process_all())
                .sum();
            if retired == 0 {
                return total;
            }
            total += retired;
        }
    }

    /// Blocks until `queue`'s fence reaches `value`.
    pub fn wait_for_fence(&self, queue: QueueType, value: u64) -> Result<()> {
        self.wait_on(self.queue(queue).fence(), value)
    }

    fn wait_on(&self, fence: &Fence, value: u64) -> Result<()> {
        if self.settings.execution == ExecutionMode::Manual {
            if fence.is_complete(value) {
                return Ok(());
            }
            self.process_queues();
            if fence.is_complete(value)
                || self.native.is_removed()
                || value > fence.last_signaled()
            {
                return fence.cpu_wait(value);
            }
            return Err(GpuError::InvalidState(format!(
                "{} fence value {value} cannot complete: queues are stalled on an unsatisfied wait",
                fence.queue()
            )));
        }
        fence.cpu_wait(value)
    }

    /// Submits a closed command list, signals the queue fence and optionally
    /// blocks until the list has executed. Returns the signaled value.
    pub fn execute_command_list(
        &self,
        queue: QueueType,
        list: &NativeCommandList,
        wait_for_completion: bool,
    ) -> Result<u64> {
        let value = self.queue(queue).execute(&[list])?;
        if wait_for_completion {
            self.wait_for_fence(queue, value)?;
        }
        Ok(value)
    }

    /// Blocks until everything submitted to `queue` so far has executed.
    ///
    /// Signals a throwaway fence behind the queue's work and waits on it.
    pub fn gpu_flush(&self, queue: QueueType) -> Result<()> {
        let fence = Fence::new(&self.native, queue)?;
        let value = self.queue(queue).signal_fence(&fence)?;
        self.wait_on(&fence, value)?;
        log::trace!("{queue} queue flushed");
        Ok(())
    }

    /// [`gpu_flush`](Self::gpu_flush) on every queue.
    pub fn gpu_flush_all(&self) -> Result<()> {
        for kind in QueueType::ALL {
            self.gpu_flush(kind)?;
        }
        Ok(())
    }

    /// Makes later work on `waiter` wait, on the GPU, until `signaler`'s fence
    /// reaches `value`. The CPU does not block.
    pub fn queue_wait_for(&self, waiter: QueueType, signaler: QueueType, value: u64) -> Result<()> {
        let fence = self.queue(signaler).fence();
        if value > fence.last_signaled() {
            return Err(GpuError::InvalidState(format!(
                "{waiter} queue would wait for {signaler} fence value {value}, last signaled {}",
                fence.last_signaled()
            )));
        }
        if waiter == signaler || fence.is_complete(value) {
            return Ok(());
        }
        self.queue(waiter).gpu_wait(fence, value)
    }

    /// Makes `waiter` wait on the GPU for everything the other queues have
    /// submitted so far.
    fn queue_wait_for_others(&self, waiter: QueueType) -> Result<()> {
        for signaler in QueueType::ALL {
            if signaler != waiter {
                let value = self.queue(signaler).fence().last_signaled();
                self.queue_wait_for(waiter, signaler, value)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Command Contexts
    // ========================================================================

    pub fn create_graphics_context(&self) -> Result<GraphicsContext<'_>> {
        self.create_context()
    }

    pub fn create_compute_context(&self) -> Result<ComputeContext<'_>> {
        self.create_context()
    }

    pub fn create_copy_context(&self) -> Result<CopyContext<'_>> {
        self.create_context()
    }

    fn create_context<K: ContextKind>(&self) -> Result<CommandContext<'_, K>> {
        let list = self.native.create_command_list(K::QUEUE).map_err(|e| {
            log::error!("Failed to create {} command list: {e}", K::QUEUE);
            GpuError::from(e)
        })?;
        Ok(CommandContext::new(self, ListSlot::Owned(list)))
    }

    /// The device's immediate context for `K`. Blocks while another thread
    /// holds it.
    #[must_use]
    pub fn immediate_context<K: ContextKind>(&self) -> CommandContext<'_, K> {
        let list = self.immediate[K::QUEUE.index()].lock();
        CommandContext::new(self, ListSlot::Immediate(list))
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Creates a constant buffer of at least `size` bytes, padded to
    /// [`CONSTANT_BUFFER_ALIGNMENT`], with its constant buffer view.
    pub fn create_constant_buffer(&self, size: u64, initial_data: Option<&[u8]>) -> Result<Buffer> {
        let padded = size.max(1).next_multiple_of(CONSTANT_BUFFER_ALIGNMENT);
        if initial_data.is_some_and(|data| data.len() as u64 > padded) {
            return Err(GpuError::InvalidState(format!(
                "{} bytes of initial data for a {padded}-byte constant buffer",
                initial_data.map_or(0, <[u8]>::len)
            )));
        }
        self.create_buffer(BufferUsage::Constant, padded, initial_data.unwrap_or_default())
    }

    /// Creates a constant buffer holding `value`.
    pub fn create_constants<T: Pod>(&self, value: &T) -> Result<Buffer> {
        let bytes = bytemuck::bytes_of(value);
        self.create_constant_buffer(bytes.len() as u64, Some(bytes))
    }

    /// Creates a vertex buffer holding `vertices`; the stride is `size_of::<T>()`.
    pub fn create_vertex_buffer<T: Pod>(&self, vertices: &[T]) -> Result<Buffer> {
        let stride = std::mem::size_of::<T>() as u32;
        if stride == 0 || vertices.is_empty() {
            return Err(GpuError::InvalidState("vertex buffer without vertices".into()));
        }
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        self.create_buffer(BufferUsage::Vertex { stride }, bytes.len() as u64, bytes)
    }

    /// Creates an index buffer from raw index data of `format`.
    pub fn create_index_buffer(&self, data: &[u8], format: Format) -> Result<Buffer> {
        if !format.is_index() {
            return Err(GpuError::InvalidState(format!("{format:?} is not an index format")));
        }
        let element = u64::from(format.bytes_per_pixel());
        let size = data.len() as u64;
        if size == 0 || size % element != 0 {
            return Err(GpuError::InvalidState(format!(
                "{size} bytes is not a whole number of {format:?} indices"
            )));
        }
        self.create_buffer(BufferUsage::Index { format }, size, data)
    }

    /// Creates a 16-bit index buffer.
    pub fn create_index_buffer_u16(&self, indices: &[u16]) -> Result<Buffer> {
        self.create_index_buffer(bytemuck::cast_slice(indices), Format::R16Uint)
    }

    /// Creates a 32-bit index buffer.
    pub fn create_index_buffer_u32(&self, indices: &[u32]) -> Result<Buffer> {
        self.create_index_buffer(bytemuck::cast_slice(indices), Format::R32Uint)
    }

    pub fn create_constant_buffer_shared(
        &self,
        size: u64,
        initial_data: Option<&[u8]>,
    ) -> Result<Arc<Buffer>> {
        self.create_constant_buffer(size, initial_data).map(Arc::new)
    }

    pub fn create_vertex_buffer_shared<T: Pod>(&self, vertices: &[T]) -> Result<Arc<Buffer>> {
        self.create_vertex_buffer(vertices).map(Arc::new)
    }

    pub fn create_index_buffer_shared(&self, data: &[u8], format: Format) -> Result<Arc<Buffer>> {
        self.create_index_buffer(data, format).map(Arc::new)
    }

    /// Creates a device-local buffer and uploads `data` through the immediate
    /// graphics context. The buffer ends in its usage's resting state.
    fn create_buffer(&self, usage: BufferUsage, size: u64, data: &[u8]) -> Result<Buffer> {
        let resting = usage.resting_state();
        let initial = if data.is_empty() {
            resting
        } else {
            ResourceState::COPY_DEST
        };
        let native = self.create_resource(&ResourceDesc::buffer(size), HeapType::Default, initial, usage.name())?;

        let view = if usage == BufferUsage::Constant {
            let cbv = self.descriptors.try_allocate(DescriptorType::CbvSrvUav)?;
            cbv.write(ViewDesc::ConstantBuffer {
                resource: Arc::clone(&native),
                size,
            })?;
            Some(cbv)
        } else {
            None
        };

        let buffer = Buffer::new(ResourceCore::new(native, initial, resting), usage, size, view);
        if !data.is_empty() {
            let mut ctx = self.immediate_context::<GraphicsKind>();
            ctx.open()?;
            ctx.update_buffer(&buffer, 0, data)?;
            ctx.transition_to(&buffer, TransitionTarget::Deferred(resting))?;
            ctx.finish_and_execute(true)?;
        }
        log::debug!("Created {} ({size} bytes)", usage.name());
        Ok(buffer)
    }

    /// A CPU-written upload resource holding `data`, in `GENERIC_READ`.
    pub(crate) fn create_staging_resource(&self, data: &[u8], name: &str) -> Result<Arc<NativeResource>> {
        let staging = self.create_resource(
            &ResourceDesc::buffer(data.len() as u64),
            HeapType::Upload,
            ResourceState::GENERIC_READ,
            name,
        )?;
        staging.write_mapped(0, data)?;
        Ok(staging)
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        heap: HeapType,
        state: ResourceState,
        name: &str,
    ) -> Result<Arc<NativeResource>> {
        self.native
            .create_committed_resource(desc, heap, state, name)
            .map_err(|e| {
                log::error!("Failed to create '{name}': {e}");
                GpuError::from(e)
            })
    }

    // ========================================================================
    // Textures & Targets
    // ========================================================================

    /// Creates a sampled 2D texture, optionally filled with `data`
    /// (tightly packed rows). The texture rests in `ALL_SHADER_RESOURCE`.
    pub fn create_texture_2d(
        &self,
        width: u32,
        height: u32,
        format: Format,
        data: Option<&[u8]>,
    ) -> Result<Texture2D> {
        check_texture_format(format, false)?;
        let desc = ResourceDesc::texture_2d(width, height, format);
        check_extent(width, height)?;
        if let Some(data) = data
            && data.len() as u64 != desc.byte_size()
        {
            return Err(GpuError::InvalidState(format!(
                "{} bytes of data for a {width}x{height} {format:?} texture ({} expected)",
                data.len(),
                desc.byte_size()
            )));
        }

        let resting = ResourceState::ALL_SHADER_RESOURCE;
        let initial = if data.is_some() {
            ResourceState::COPY_DEST
        } else {
            resting
        };
        let native = self.create_resource(&desc, HeapType::Default, initial, "Texture2D")?;
        let srv = self.shader_resource_view(&native, format)?;
        let texture = Texture2D::new(ResourceCore::new(native, initial, resting), width, height, format, srv);

        if let Some(data) = data {
            let staging = ResourceCore::new(
                self.create_staging_resource(data, "TextureStaging")?,
                ResourceState::GENERIC_READ,
                ResourceState::GENERIC_READ,
            );
            let mut ctx = self.immediate_context::<GraphicsKind>();
            ctx.open()?;
            ctx.copy_resource(&texture, &staging)?;
            ctx.transition_to(&texture, TransitionTarget::Deferred(resting))?;
            ctx.finish_and_execute(true)?;
        }
        log::debug!("Created {width}x{height} {format:?} texture");
        Ok(texture)
    }

    pub fn create_texture_2d_shared(
        &self,
        width: u32,
        height: u32,
        format: Format,
        data: Option<&[u8]>,
    ) -> Result<Arc<Texture2D>> {
        self.create_texture_2d(width, height, format, data).map(Arc::new)
    }

    /// Creates a color target that clears to `clear` by default.
    pub fn create_render_target(
        &self,
        width: u32,
        height: u32,
        format: Format,
        clear: ClearColor,
    ) -> Result<RenderTarget> {
        check_texture_format(format, false)?;
        let native = self.create_target_resource(width, height, format, ResourceFlags::ALLOW_RENDER_TARGET, "RenderTarget")?;
        let rtv = self.descriptors.try_allocate(DescriptorType::RenderTarget)?;
        rtv.write(ViewDesc::RenderTarget {
            resource: Arc::clone(&native),
            format,
        })?;
        self.finish_target(native, width, height, format, TargetView::Color { rtv, clear })
    }

    /// Creates a depth-stencil target that clears to `(depth, stencil)` by default.
    pub fn create_depth_target(
        &self,
        width: u32,
        height: u32,
        format: Format,
        depth: f32,
        stencil: u8,
    ) -> Result<RenderTarget> {
        check_texture_format(format, true)?;
        let native = self.create_target_resource(width, height, format, ResourceFlags::ALLOW_DEPTH_STENCIL, "DepthTarget")?;
        let dsv = self.descriptors.try_allocate(DescriptorType::DepthStencil)?;
        dsv.write(ViewDesc::DepthStencil {
            resource: Arc::clone(&native),
            format,
        })?;
        self.finish_target(
            native,
            width,
            height,
            format,
            TargetView::DepthStencil {
                dsv,
                depth,
                stencil,
            },
        )
    }

    /// Creates a target written by compute shaders.
    pub fn create_unordered_access_target(
        &self,
        width: u32,
        height: u32,
        format: Format,
    ) -> Result<RenderTarget> {
        check_texture_format(format, false)?;
        let native = self.create_target_resource(width, height, format, ResourceFlags::ALLOW_UNORDERED_ACCESS, "UnorderedAccessTarget")?;
        let uav = self.descriptors.try_allocate(DescriptorType::CbvSrvUav)?;
        uav.write(ViewDesc::UnorderedAccess {
            resource: Arc::clone(&native),
            format,
        })?;
        self.finish_target(native, width, height, format, TargetView::UnorderedAccess { uav })
    }

    pub fn create_render_target_shared(
        &self,
        width: u32,
        height: u32,
        format: Format,
        clear: ClearColor,
    ) -> Result<Arc<RenderTarget>> {
        self.create_render_target(width, height, format, clear).map(Arc::new)
    }

    pub fn create_depth_target_shared(
        &self,
        width: u32,
        height: u32,
        format: Format,
        depth: f32,
        stencil: u8,
    ) -> Result<Arc<RenderTarget>> {
        self.create_depth_target(width, height, format, depth, stencil).map(Arc::new)
    }

    pub fn create_unordered_access_target_shared(
        &self,
        width: u32,
        height: u32,
        format: Format,
    ) -> Result<Arc<RenderTarget>> {
        self.create_unordered_access_target(width, height, format).map(Arc::new)
    }

    /// Creates a frame buffer of equally sized color targets (cleared to
    /// black) and an optional depth target (cleared to 1.0 / 0).
    pub fn create_frame_buffer(
        &self,
        width: u32,
        height: u32,
        color_formats: &[Format],
        depth_format: Option<Format>,
    ) -> Result<FrameBuffer> {
        if color_formats.len() > FrameBuffer::MAX_COLOR_TARGETS {
            return Err(GpuError::InvalidState(format!(
                "{} color targets exceed the limit of {}",
                color_formats.len(),
                FrameBuffer::MAX_COLOR_TARGETS
            )));
        }
        if color_formats.is_empty() && depth_format.is_none() {
            return Err(GpuError::InvalidState("frame buffer without attachments".into()));
        }
        let colors = color_formats
            .iter()
            .map(|&format| self.create_render_target(width, height, format, ClearColor::BLACK))
            .collect::<Result<SmallVec<[RenderTarget; 8]>>>()?;
        let depth = depth_format
            .map(|format| self.create_depth_target(width, height, format, 1.0, 0))
            .transpose()?;
        Ok(FrameBuffer::new(width, height, colors, depth))
    }

    pub fn create_frame_buffer_shared(
        &self,
        width: u32,
        height: u32,
        color_formats: &[Format],
        depth_format: Option<Format>,
    ) -> Result<Arc<FrameBuffer>> {
        self.create_frame_buffer(width, height, color_formats, depth_format)
            .map(Arc::new)
    }

    fn create_target_resource(
        &self,
        width: u32,
        height: u32,
        format: Format,
        flags: ResourceFlags,
        name: &str,
    ) -> Result<Arc<NativeResource>> {
        check_extent(width, height)?;
        let desc = ResourceDesc::texture_2d(width, height, format).with_flags(flags);
        self.create_resource(&desc, HeapType::Default, ResourceState::COMMON, name)
    }

    fn finish_target(
        &self,
        native: Arc<NativeResource>,
        width: u32,
        height: u32,
        format: Format,
        view: TargetView,
    ) -> Result<RenderTarget> {
        let srv = self.shader_resource_view(&native, format)?;
        log::debug!("Created {width}x{height} {format:?} {}", view.kind_name());
        let core = ResourceCore::new(native, ResourceState::COMMON, ResourceState::COMMON);
        Ok(RenderTarget::new(core, width, height, format, view, srv))
    }

    fn shader_resource_view(&self, native: &Arc<NativeResource>, format: Format) -> Result<DescriptorHandle> {
        let srv = self.descriptors.try_allocate(DescriptorType::CbvSrvUav)?;
        srv.write(ViewDesc::ShaderResource {
            resource: Arc::clone(native),
            format,
        })?;
        Ok(srv)
    }

    // ========================================================================
    // Shaders & Pipelines
    // ========================================================================

    /// Returns the cached shader for `(source_id, entry_point)`, compiling it
    /// with the installed compiler on first use.
    pub fn load_shader(
        &self,
        source_id: &str,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Arc<CompiledShader>> {
        self.shaders.get_or_compile(source_id, entry_point, stage)
    }

    pub fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<GraphicsPipeline>> {
        self.pipelines.get_or_create_graphics(&self.native, desc)
    }

    pub fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<Arc<ComputePipeline>> {
        self.pipelines.get_or_create_compute(&self.native, desc)
    }

    // ========================================================================
    // Readback
    // ========================================================================

    /// Copies a buffer's contents back to the CPU.
    pub fn read_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>> {
        self.read_resource(buffer)
    }

    /// Copies a texture's texels back to the CPU (tightly packed rows).
    pub fn read_texture(&self, texture: &Texture2D) -> Result<Vec<u8>> {
        self.read_resource(texture)
    }

    /// Copies a target's texels back to the CPU (tightly packed rows).
    pub fn read_render_target(&self, target: &RenderTarget) -> Result<Vec<u8>> {
        self.read_resource(target)
    }

    /// Copies any tracked resource back to the CPU.
    ///
    /// Runs on the copy queue when the resource is in a state the copy queue
    /// accepts, on the graphics queue otherwise. The chosen queue first waits
    /// on the GPU for all work submitted to the other queues.
    pub fn read_resource(&self, resource: &impl GpuResource) -> Result<Vec<u8>> {
        let core = resource.core();
        let readback = ResourceCore::new(
            self.create_resource(
                &ResourceDesc::buffer(core.native().size()),
                HeapType::Readback,
                ResourceState::COPY_DEST,
                "Readback",
            )?,
            ResourceState::COPY_DEST,
            ResourceState::COPY_DEST,
        );

        if core.current_state().is_copy_queue_state() {
            self.copy_back::<CopyKind>(core, &readback)?;
        } else {
            self.copy_back::<GraphicsKind>(core, &readback)?;
        }
        Ok(readback.native().read_mapped()?)
    }

    fn copy_back<K: ContextKind>(&self, core: &Arc<ResourceCore>, readback: &Arc<ResourceCore>) -> Result<()> {
        self.queue_wait_for_others(K::QUEUE)?;
        let previous = core.current_state();
        let mut ctx = self.immediate_context::<K>();
        ctx.open()?;
        ctx.transition_to(core, ResourceState::COPY_SOURCE)?;
        ctx.copy_resource(readback, core)?;
        ctx.transition_to(core, TransitionTarget::Deferred(previous))?;
        ctx.finish_and_execute(true)?;
        log::trace!("Read back '{}' on the {} queue", core.name(), K::QUEUE);
        Ok(())
    }

    // ========================================================================
    // Presentation
    // ========================================================================

    /// Copies `target` into the current back buffer and presents it.
    ///
    /// `target` must be a color target matching the swap chain's size and
    /// format.
    pub fn present(&self, target: &RenderTarget) -> Result<()> {
        let mut guard = self.swap_chain.lock();
        let swap_chain = guard.as_mut().ok_or(GpuError::SwapChainMissing)?;
        target.rtv()?;
        if (target.width(), target.height(), target.format())
            != (swap_chain.width(), swap_chain.height(), swap_chain.format())
        {
            return Err(GpuError::InvalidState(format!(
                "presenting a {}x{} {:?} target to a {}x{} {:?} swap chain",
                target.width(),
                target.height(),
                target.format(),
                swap_chain.width(),
                swap_chain.height(),
                swap_chain.format()
            )));
        }

        self.gpu_flush_all()?;
        let back_buffer = Arc::clone(swap_chain.current_back_buffer()?);
        {
            let mut ctx = self.immediate_context::<GraphicsKind>();
            ctx.open()?;
            ctx.transition_to(target, ResourceState::COPY_SOURCE)?;
            ctx.transition_to(&back_buffer, ResourceState::COPY_DEST)?;
            ctx.copy_resource(&back_buffer, target)?;
            ctx.transition_to(&back_buffer, ResourceState::PRESENT)?;
            ctx.transition_to(target, TransitionTarget::Deferred(target.core().resting_state()))?;
            ctx.finish_and_execute(true)?;
        }
        swap_chain.present()?;
        log::trace!("Presented frame {}", swap_chain.presented_frames());
        Ok(())
    }

    /// Recreates the back buffers at a new size.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        let mut guard = self.swap_chain.lock();
        let swap_chain = guard.as_mut().ok_or(GpuError::SwapChainMissing)?;
        self.gpu_flush_all()?;
        swap_chain.resize(&self.native, width, height)?;
        log::info!("[{}] Swap chain resized to {width}x{height}", self.settings.label());
        Ok(())
    }

    pub fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        let mut guard = self.swap_chain.lock();
        let swap_chain = guard.as_mut().ok_or(GpuError::SwapChainMissing)?;
        self.gpu_flush_all()?;
        swap_chain.set_fullscreen(fullscreen);
        Ok(())
    }

    pub fn set_vsync(&self, vsync: bool) -> Result<()> {
        let mut guard = self.swap_chain.lock();
        let swap_chain = guard.as_mut().ok_or(GpuError::SwapChainMissing)?;
        self.gpu_flush_all()?;
        swap_chain.set_vsync(vsync);
        Ok(())
    }
}

fn check_extent(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(GpuError::InvalidState(format!("texture of {width}x{height} texels")));
    }
    Ok(())
}

fn check_texture_format(format: Format, depth: bool) -> Result<()> {
    if format == Format::Unknown || format.is_index() || format.is_depth() != depth {
        let expected = if depth { "a depth" } else { "a color" };
        return Err(GpuError::InvalidState(format!("{format:?} is not {expected} format")));
    }
    Ok(())
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.native.is_removed() {
            return;
        }
        if self.settings.execution == ExecutionMode::Manual {
            self.process_queues();
        } else if let Err(e) = self.gpu_flush_all() {
            log::warn!("[{}] GPU flush on device drop failed: {e}", self.settings.label());
        }
        log::debug!("[{}] Device destroyed", self.settings.label());
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("label", &self.settings.label())
            .field("execution", &self.settings.execution)
            .field("lost", &self.is_lost())
            .field("swap_chain", &self.has_swap_chain())
            .finish_non_exhaustive()
    }
}
