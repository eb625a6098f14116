//! Command Contexts
//!
//! A [`CommandContext`] records one batch of GPU work for one queue family
//! and is the only place resource state transitions are issued.
//!
//! # Lifecycle
//!
//! ```text
//!            open()              finish()                execute(wait)
//!  Closed ───────────► Recording ──────────► Closed(flushed) ──────────► Closed(submitted)
//!    ▲                                                                        │
//!    └────────────────────────────────── open() ◄─────────────────────────────┘
//! ```
//!
//! - `open()` takes an allocator from the queue's pool (unless one is still
//!   assigned) and resets the command list.
//! - `finish()` resolves the deferred buckets, flushes the last barrier batch
//!   and closes the list.
//! - `execute()` submits, signals the queue fence and hands the allocator back
//!   to the pool tagged with the signaled value.
//!
//! # Transitions
//!
//! [`transition_to`](CommandContext::transition_to) never emits a barrier
//! for a resource whose tag already matches. Immediate transitions are queued
//! and written as one batch right before the next command;
//! [`TransitionTarget::Deferred`] transitions wait in per-state buckets until
//! `finish()`. Draw, dispatch and copy calls assume their resources are
//! already in the right state; only `transition_to` and the binding helpers
//! built on it insert barriers.
//!
//! A recording that never reaches the GPU (dropped, re-opened before
//! execution, or discarded with `clear_state()`) restores the state tags it
//! changed.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::MutexGuard;
use smallvec::SmallVec;

use super::kinds::{ComputeCapable, ContextKind, GraphicsKind};
use super::tracker::BarrierTracker;
use crate::descriptor::DescriptorHandle;
use crate::device::Device;
use crate::errors::{GpuError, Result};
use crate::native::{Command, NativeCommandAllocator, NativeCommandList, RecordedBatch};
use crate::pipeline::{ComputePipeline, GraphicsPipeline};
use crate::queue::CommandQueue;
use crate::resource::{
    Buffer, BufferUsage, FrameBuffer, GpuResource, RenderTarget, ResourceCore, ResourceState,
    TargetView, Texture2D, TransitionTarget,
};
use crate::types::{ClearColor, QueueType, ScissorRect, Viewport};

/// Per-recording counters. Reset by `open()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Individual barriers emitted.
    pub barriers: u32,
    /// Batched barrier calls written to the list.
    pub barrier_batches: u32,
    pub draws: u32,
    pub dispatches: u32,
    pub copies: u32,
    pub clears: u32,
}

/// The command list a context records into: its own, or the device's
/// immediate list held for the duration of a synchronous operation.
pub(crate) enum ListSlot<'d> {
    Owned(NativeCommandList),
    Immediate(MutexGuard<'d, NativeCommandList>),
}

impl Deref for ListSlot<'_> {
    type Target = NativeCommandList;

    fn deref(&self) -> &NativeCommandList {
        match self {
            ListSlot::Owned(list) => list,
            ListSlot::Immediate(list) => list,
        }
    }
}

impl DerefMut for ListSlot<'_> {
    fn deref_mut(&mut self) -> &mut NativeCommandList {
        match self {
            ListSlot::Owned(list) => list,
            ListSlot::Immediate(list) => list,
        }
    }
}

/// Records GPU work for the queue family `K`.
pub struct CommandContext<'d, K: ContextKind> {
    device: &'d Device,
    list: ListSlot<'d>,
    allocator: Option<NativeCommandAllocator>,
    recording: bool,
    tracker: BarrierTracker,
    stats: ContextStats,
    _kind: PhantomData<fn() -> K>,
}

pub type GraphicsContext<'d> = CommandContext<'d, GraphicsKind>;
pub type ComputeContext<'d> = CommandContext<'d, super::kinds::ComputeKind>;
/// Records on the copy queue. Keep the resources it transitions in `COMMON`,
/// `COPY_SOURCE` or `COPY_DEST`; the reference driver accepts any state but a
/// hardware copy queue does not.
pub type CopyContext<'d> = CommandContext<'d, super::kinds::CopyKind>;

// ============================================================================
// Lifecycle (all kinds)
// ============================================================================

impl<'d, K: ContextKind> CommandContext<'d, K> {
    pub(crate) fn new(device: &'d Device, list: ListSlot<'d>) -> Self {
        debug_assert_eq!(list.kind(), K::QUEUE);
        Self {
            device,
            list,
            allocator: None,
            recording: false,
            tracker: BarrierTracker::default(),
            stats: ContextStats::default(),
            _kind: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn queue_type(&self) -> QueueType {
        K::QUEUE
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &'d Device {
        self.device
    }

    #[inline]
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    /// Whether an allocator is currently assigned to the context.
    #[inline]
    #[must_use]
    pub fn has_allocator(&self) -> bool {
        self.allocator.is_some()
    }

    /// The batch produced by the last `finish()`.
    #[must_use]
    pub fn last_recording(&self) -> Option<&Arc<RecordedBatch>> {
        self.list.batch()
    }

    /// Resources with a deferred transition waiting for `finish()`.
    #[must_use]
    pub fn deferred_count(&self) -> usize {
        self.tracker.deferred_len()
    }

    fn queue(&self) -> &'d CommandQueue {
        self.device.queue(K::QUEUE)
    }

    /// Starts a recording.
    pub fn open(&mut self) -> Result<()> {
        if self.recording {
            return Err(GpuError::ContextRecording(K::QUEUE));
        }
        let discarded = self.tracker.rollback();
        if discarded > 0 {
            log::debug!(
                "{} context re-opened before execution; restored {discarded} state tags",
                K::QUEUE
            );
        }

        let allocator = match self.allocator.take() {
            Some(allocator) => allocator,
            None => self.queue().request_allocator(self.device.native())?,
        };
        if let Err(e) = self.list.reset(&allocator) {
            self.allocator = Some(allocator);
            log::error!("Failed to reset {} command list: {e}", K::QUEUE);
            return Err(e.into());
        }
        self.allocator = Some(allocator);
        self.recording = true;
        self.stats = ContextStats::default();
        Ok(())
    }

    /// Resolves deferred transitions, flushes barriers and closes the list.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_recording()?;
        let resolved = self.tracker.resolve_deferred();
        self.stats.barriers += resolved as u32;
        self.flush_barriers()?;

        self.recording = false;
        self.list.close().map_err(|e| {
            log::error!("Failed to close {} command list: {e}", K::QUEUE);
            GpuError::from(e)
        })
    }

    /// Submits the finished recording. Returns the fence value that marks its
    /// completion; with `wait_for_completion` the call blocks until then.
    pub fn execute(&mut self, wait_for_completion: bool) -> Result<u64> {
        if self.recording {
            return Err(GpuError::ContextRecording(K::QUEUE));
        }
        if self.list.batch().is_none() {
            return Err(GpuError::InvalidState(format!(
                "{} context has no finished recording to execute",
                K::QUEUE
            )));
        }
        let allocator = self.allocator.take().ok_or_else(|| {
            GpuError::InvalidState(format!("{} recording was already executed", K::QUEUE))
        })?;

        let value = match self.queue().execute_and_discard(&self.list, allocator) {
            Ok(value) => value,
            Err((e, allocator)) => {
                self.allocator = Some(allocator);
                return Err(e);
            }
        };
        self.tracker.commit();
        log::trace!("{} context executed (fence {value})", K::QUEUE);

        if wait_for_completion {
            self.device.wait_for_fence(K::QUEUE, value)?;
        }
        Ok(value)
    }

    /// `finish()` followed by `execute(wait_for_completion)`.
    pub fn finish_and_execute(&mut self, wait_for_completion: bool) -> Result<u64> {
        self.finish()?;
        self.execute(wait_for_completion)
    }

    /// Discards any unexecuted recording: closes the list, restores state
    /// tags, resets the allocator and leaves an empty closed list behind.
    pub fn clear_state(&mut self) -> Result<()> {
        if self.recording {
            self.recording = false;
            if let Err(e) = self.list.close() {
                log::debug!("Discarded {} recording did not close cleanly: {e}", K::QUEUE);
            }
        }
        self.tracker.rollback();

        if let Some(allocator) = &self.allocator {
            allocator.reset()?;
            self.list.reset(allocator)?;
            self.list.close()?;
        }
        Ok(())
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Moves `resource` to `target`. No barrier is emitted when the resource
    /// is already in the target state.
    pub fn transition_to(
        &mut self,
        resource: &impl GpuResource,
        target: impl Into<TransitionTarget>,
    ) -> Result<()> {
        self.ensure_recording()?;
        let core = resource.core();
        match target.into() {
            TransitionTarget::Immediate(state) => {
                if self.tracker.transition(core, state) {
                    self.stats.barriers += 1;
                }
            }
            TransitionTarget::Deferred(state) => self.tracker.defer(core, state),
        }
        Ok(())
    }

    /// Writes queued immediate barriers to the list as one batched call.
    pub fn flush_barriers(&mut self) -> Result<()> {
        self.ensure_recording()?;
        if let Some(batch) = self.tracker.take_pending() {
            self.stats.barrier_batches += 1;
            self.list.record(Command::ResourceBarrier(batch));
        }
        Ok(())
    }

    // ── Copies ───────────────────────────────────────────────────────────────

    /// Copies a whole resource. Both resources must already be in
    /// `COPY_DEST` / `COPY_SOURCE`.
    pub fn copy_resource(&mut self, dst: &impl GpuResource, src: &impl GpuResource) -> Result<()> {
        let (dst, src) = (dst.core(), src.core());
        check_distinct(dst, src)?;
        if dst.native().size() != src.native().size() {
            return Err(GpuError::InvalidState(format!(
                "copy from '{}' ({} bytes) to '{}' ({} bytes) needs equal sizes",
                src.name(),
                src.native().size(),
                dst.name(),
                dst.native().size()
            )));
        }
        self.record(Command::CopyResource {
            dst: Arc::clone(dst.native()),
            src: Arc::clone(src.native()),
        })?;
        self.stats.copies += 1;
        Ok(())
    }

    /// Copies `size` bytes between buffers. States as for [`copy_resource`](Self::copy_resource).
    pub fn copy_buffer_region(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        check_distinct(dst.core(), src.core())?;
        check_range(dst, dst_offset, size)?;
        check_range(src, src_offset, size)?;
        self.record(Command::CopyBufferRegion {
            dst: Arc::clone(dst.core().native()),
            dst_offset,
            src: Arc::clone(src.core().native()),
            src_offset,
            size,
        })?;
        self.stats.copies += 1;
        Ok(())
    }

    /// Copies one color target into another, transitioning both and
    /// deferring them back to their resting states.
    pub fn copy_render_target(&mut self, dst: &RenderTarget, src: &RenderTarget) -> Result<()> {
        dst.rtv()?;
        src.rtv()?;
        self.copy_target(dst, src)
    }

    /// Copies one depth target into another, like [`copy_render_target`](Self::copy_render_target).
    pub fn copy_depth_buffer(&mut self, dst: &RenderTarget, src: &RenderTarget) -> Result<()> {
        dst.dsv()?;
        src.dsv()?;
        self.copy_target(dst, src)
    }

    /// Copies every color target and the depth target of `src` into `dst`.
    pub fn copy_frame_buffer(&mut self, dst: &FrameBuffer, src: &FrameBuffer) -> Result<()> {
        if dst.colors().len() != src.colors().len()
            || dst.depth().is_some() != src.depth().is_some()
        {
            return Err(GpuError::InvalidState(
                "frame buffers have different attachment layouts".into(),
            ));
        }
        for (d, s) in dst.colors().iter().zip(src.colors()) {
            self.copy_render_target(d, s)?;
        }
        if let (Some(d), Some(s)) = (dst.depth(), src.depth()) {
            self.copy_depth_buffer(d, s)?;
        }
        Ok(())
    }

    fn copy_target(&mut self, dst: &RenderTarget, src: &RenderTarget) -> Result<()> {
        check_distinct(dst.core(), src.core())?;
        if (dst.width(), dst.height(), dst.format()) != (src.width(), src.height(), src.format()) {
            return Err(GpuError::InvalidState(
                "copied targets must match in size and format".into(),
            ));
        }
        self.transition_to(src, ResourceState::COPY_SOURCE)?;
        self.transition_to(dst, ResourceState::COPY_DEST)?;
        self.copy_resource(dst, src)?;
        self.transition_to(src, TransitionTarget::Deferred(src.core().resting_state()))?;
        self.transition_to(dst, TransitionTarget::Deferred(dst.core().resting_state()))
    }

    // ── Buffer updates ───────────────────────────────────────────────────────

    /// Overwrites part of a buffer through a staging upload. The buffer is
    /// moved to `COPY_DEST` for the copy and deferred back to the state it
    /// had before, unless a deferral for it is already queued, which is kept.
    pub fn update_buffer(&mut self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_recording()?;
        if data.is_empty() {
            return Ok(());
        }
        check_range(buffer, offset, data.len() as u64)?;

        let staging = self.device.create_staging_resource(data, "UpdateStaging")?;
        let previous = buffer.current_state();
        let queued = self.tracker.deferred_state(buffer.core().id());
        self.transition_to(buffer, ResourceState::COPY_DEST)?;
        self.record(Command::CopyBufferRegion {
            dst: Arc::clone(buffer.core().native()),
            dst_offset: offset,
            src: staging,
            src_offset: 0,
            size: data.len() as u64,
        })?;
        self.stats.copies += 1;
        if queued.is_some() {
            return Ok(());
        }
        self.transition_to(buffer, TransitionTarget::Deferred(previous))
    }

    /// Writes a `Pod` value at the start of a buffer.
    pub fn update_constants<T: Pod>(&mut self, buffer: &Buffer, value: &T) -> Result<()> {
        self.update_buffer(buffer, 0, bytemuck::bytes_of(value))
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn ensure_recording(&self) -> Result<()> {
        if self.recording {
            Ok(())
        } else {
            Err(GpuError::ContextNotRecording(K::QUEUE))
        }
    }

    /// Flushes pending barriers, then records `command`.
    fn record(&mut self, command: Command) -> Result<()> {
        self.flush_barriers()?;
        self.list.record(command);
        Ok(())
    }
}

/// A resource cannot be in `COPY_SOURCE` and `COPY_DEST` at once.
fn check_distinct(dst: &Arc<ResourceCore>, src: &Arc<ResourceCore>) -> Result<()> {
    if Arc::ptr_eq(dst.native(), src.native()) {
        return Err(GpuError::InvalidState(format!(
            "'{}' copied onto itself",
            dst.name()
        )));
    }
    Ok(())
}

fn check_range(buffer: &Buffer, offset: u64, size: u64) -> Result<()> {
    if offset.checked_add(size).is_none_or(|end| end > buffer.size()) {
        return Err(GpuError::InvalidState(format!(
            "range {offset}+{size} exceeds {} of {} bytes",
            buffer.usage().name(),
            buffer.size()
        )));
    }
    Ok(())
}

impl<K: ContextKind> Drop for CommandContext<'_, K> {
    fn drop(&mut self) {
        if self.recording {
            self.recording = false;
            if let Err(e) = self.list.close() {
                log::debug!("Dropped {} recording did not close cleanly: {e}", K::QUEUE);
            }
        }
        let restored = self.tracker.rollback();
        if restored > 0 {
            log::debug!(
                "{} context dropped with an unexecuted recording; restored {restored} state tags",
                K::QUEUE
            );
        }
        if let Some(allocator) = self.allocator.take() {
            self.queue().return_unused_allocator(allocator);
        }
    }
}

impl<K: ContextKind> std::fmt::Debug for CommandContext<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("queue", &K::QUEUE)
            .field("recording", &self.recording)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Compute-capable contexts (graphics, compute)
// ============================================================================

impl<K: ComputeCapable> CommandContext<'_, K> {
    pub fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline) -> Result<()> {
        self.record(Command::SetPipeline(Arc::clone(pipeline.native())))
    }

    /// Binds a constant buffer to a root slot.
    pub fn set_constant_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<()> {
        if buffer.usage() != BufferUsage::Constant {
            return Err(GpuError::InvalidState(format!(
                "{} bound as a constant buffer",
                buffer.usage().name()
            )));
        }
        self.record(Command::SetConstantBuffer {
            slot,
            buffer: Arc::clone(buffer.core().native()),
        })
    }

    /// Binds a shader-visible descriptor range starting at `base`.
    pub fn set_descriptor_table(&mut self, slot: u32, base: &DescriptorHandle) -> Result<()> {
        if !base.is_shader_visible() {
            return Err(GpuError::InvalidDescriptor(format!(
                "{:?} descriptors are not shader-visible",
                base.kind()
            )));
        }
        if base.is_released() {
            return Err(GpuError::InvalidDescriptor("descriptor was released".into()));
        }
        self.record(Command::SetDescriptorTable {
            slot,
            base: base.gpu(),
        })
    }

    /// Binds a texture's shader resource view.
    pub fn set_texture(&mut self, slot: u32, texture: &Texture2D) -> Result<()> {
        self.set_descriptor_table(slot, texture.srv())
    }

    /// Binds a target's shader resource view for sampling.
    pub fn set_target_texture(&mut self, slot: u32, target: &RenderTarget) -> Result<()> {
        self.set_descriptor_table(slot, target.srv())
    }

    /// Binds an unordered-access target.
    pub fn set_unordered_access(&mut self, slot: u32, target: &RenderTarget) -> Result<()> {
        let uav = target.uav()?;
        self.set_descriptor_table(slot, uav)
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.record(Command::Dispatch { x, y, z })?;
        self.stats.dispatches += 1;
        Ok(())
    }
}

// ============================================================================
// Graphics contexts
// ============================================================================

impl CommandContext<'_, GraphicsKind> {
    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.record(Command::SetViewport(viewport))
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) -> Result<()> {
        self.record(Command::SetScissor(scissor))
    }

    /// Full-target viewport and scissor.
    pub fn set_viewport_and_scissor(&mut self, width: u32, height: u32) -> Result<()> {
        self.set_viewport(Viewport::new(width, height))?;
        self.set_scissor(ScissorRect::new(width, height))
    }

    /// Binds one color target and an optional depth target.
    pub fn set_render_target(
        &mut self,
        target: &RenderTarget,
        depth: Option<&RenderTarget>,
    ) -> Result<()> {
        self.set_render_targets(&[target], depth)
    }

    /// Binds color targets and an optional depth target.
    ///
    /// Each target is transitioned to its write state now and deferred back to
    /// its resting state at `finish()`. Viewport and scissor are set to the
    /// size of the first bound target.
    pub fn set_render_targets(
        &mut self,
        colors: &[&RenderTarget],
        depth: Option<&RenderTarget>,
    ) -> Result<()> {
        self.ensure_recording()?;
        if colors.len() > FrameBuffer::MAX_COLOR_TARGETS {
            return Err(GpuError::InvalidState(format!(
                "{} color targets exceed the limit of {}",
                colors.len(),
                FrameBuffer::MAX_COLOR_TARGETS
            )));
        }
        let mut handles = SmallVec::new();
        for target in colors {
            handles.push(target.rtv()?.cpu());
        }
        let depth_handle = depth.map(|d| d.dsv().map(DescriptorHandle::cpu)).transpose()?;

        for target in colors.iter().copied().chain(depth) {
            self.bind_target(target)?;
        }
        if let Some(first) = colors.first().copied().or(depth) {
            self.set_viewport_and_scissor(first.width(), first.height())?;
        }
        self.record(Command::SetRenderTargets {
            colors: handles,
            depth: depth_handle,
        })
    }

    /// Binds only a depth target.
    pub fn set_depth_target(&mut self, depth: &RenderTarget) -> Result<()> {
        self.set_render_targets(&[], Some(depth))
    }

    /// Binds every attachment of a frame buffer.
    pub fn set_frame_buffer(&mut self, frame_buffer: &FrameBuffer) -> Result<()> {
        let colors: SmallVec<[&RenderTarget; 8]> = frame_buffer.colors().iter().collect();
        self.set_render_targets(&colors, frame_buffer.depth())
    }

    pub fn clear_render_target(&mut self, target: &RenderTarget, color: ClearColor) -> Result<()> {
        target.rtv()?;
        self.bind_target(target)?;
        self.record(Command::ClearRenderTarget {
            target: Arc::clone(target.core().native()),
            color,
        })?;
        self.stats.clears += 1;
        Ok(())
    }

    pub fn clear_depth_target(&mut self, target: &RenderTarget, depth: f32, stencil: u8) -> Result<()> {
        target.dsv()?;
        self.bind_target(target)?;
        self.record(Command::ClearDepthStencil {
            target: Arc::clone(target.core().native()),
            depth,
            stencil,
        })?;
        self.stats.clears += 1;
        Ok(())
    }

    /// Clears every attachment to the clear values chosen at creation.
    pub fn clear_frame_buffer(&mut self, frame_buffer: &FrameBuffer) -> Result<()> {
        for target in frame_buffer.colors() {
            let color = target.clear_color().unwrap_or(ClearColor::BLACK);
            self.clear_render_target(target, color)?;
        }
        if let Some(depth) = frame_buffer.depth() {
            let (d, s) = depth.clear_depth().unwrap_or((1.0, 0));
            self.clear_depth_target(depth, d, s)?;
        }
        Ok(())
    }

    pub fn set_pipeline(&mut self, pipeline: &GraphicsPipeline) -> Result<()> {
        self.record(Command::SetPipeline(Arc::clone(pipeline.native())))
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<()> {
        let BufferUsage::Vertex { stride } = buffer.usage() else {
            return Err(GpuError::InvalidState(format!(
                "{} bound as a vertex buffer",
                buffer.usage().name()
            )));
        };
        self.record(Command::SetVertexBuffer {
            slot,
            buffer: Arc::clone(buffer.core().native()),
            stride,
        })
    }

    pub fn set_index_buffer(&mut self, buffer: &Buffer) -> Result<()> {
        let BufferUsage::Index { format } = buffer.usage() else {
            return Err(GpuError::InvalidState(format!(
                "{} bound as an index buffer",
                buffer.usage().name()
            )));
        };
        self.record(Command::SetIndexBuffer {
            buffer: Arc::clone(buffer.core().native()),
            format,
        })
    }

    pub fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<()> {
        self.draw_instanced(vertex_count, 1, start_vertex, 0)
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) -> Result<()> {
        self.record(Command::Draw {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        })?;
        self.stats.draws += 1;
        Ok(())
    }

    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) -> Result<()> {
        self.draw_indexed_instanced(index_count, 1, start_index, base_vertex, 0)
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> Result<()> {
        self.record(Command::DrawIndexed {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        })?;
        self.stats.draws += 1;
        Ok(())
    }

    /// Transition in now, back out at `finish()`.
    fn bind_target(&mut self, target: &RenderTarget) -> Result<()> {
        let write_state = match target.view() {
            TargetView::Color { .. } | TargetView::DepthStencil { .. } => target.view().write_state(),
            TargetView::UnorderedAccess { .. } => {
                return Err(GpuError::TargetKindMismatch {
                    expected: "color or depth-stencil target",
                    found: target.view().kind_name(),
                });
            }
        };
        self.transition_to(target, write_state)?;
        self.transition_to(target, TransitionTarget::Deferred(target.core().resting_state()))
    }
}
