//! Command allocators, command lists and the recorded command stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use smallvec::SmallVec;

use super::descriptor::{CpuDescriptorHandle, GpuDescriptorHandle};
use super::pipeline::NativePipeline;
use super::resource::NativeResource;
use super::{NativeError, NativeResult};
use crate::resource::ResourceState;
use crate::types::{ClearColor, Format, QueueType, ScissorRect, Viewport};

// ─── Commands ────────────────────────────────────────────────────────────────

/// One state transition of one resource.
#[derive(Debug, Clone)]
pub struct ResourceBarrier {
    pub resource: Arc<NativeResource>,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// A recorded GPU command.
#[derive(Debug, Clone)]
pub enum Command {
    ResourceBarrier(SmallVec<[ResourceBarrier; 8]>),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetPipeline(Arc<NativePipeline>),
    SetRenderTargets {
        colors: SmallVec<[CpuDescriptorHandle; 8]>,
        depth: Option<CpuDescriptorHandle>,
    },
    ClearRenderTarget {
        target: Arc<NativeResource>,
        color: ClearColor,
    },
    ClearDepthStencil {
        target: Arc<NativeResource>,
        depth: f32,
        stencil: u8,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: Arc<NativeResource>,
        stride: u32,
    },
    SetIndexBuffer {
        buffer: Arc<NativeResource>,
        format: Format,
    },
    SetConstantBuffer {
        slot: u32,
        buffer: Arc<NativeResource>,
    },
    SetDescriptorTable {
        slot: u32,
        base: GpuDescriptorHandle,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyResource {
        dst: Arc<NativeResource>,
        src: Arc<NativeResource>,
    },
    CopyBufferRegion {
        dst: Arc<NativeResource>,
        dst_offset: u64,
        src: Arc<NativeResource>,
        src_offset: u64,
        size: u64,
    },
}

impl Command {
    /// Whether a list of the given queue type may record this command.
    #[must_use]
    pub fn allowed_on(&self, kind: QueueType) -> bool {
        match self {
            Command::ResourceBarrier(_)
            | Command::CopyResource { .. }
            | Command::CopyBufferRegion { .. } => true,
            Command::SetPipeline(_)
            | Command::SetConstantBuffer { .. }
            | Command::SetDescriptorTable { .. }
            | Command::Dispatch { .. } => kind != QueueType::Copy,
            _ => kind == QueueType::Graphics,
        }
    }
}

// ─── Allocators ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AllocatorShared {
    in_flight: AtomicU32,
    recording: AtomicBool,
    resets: AtomicU64,
}

/// Backing memory for recorded commands. Cloning yields another reference to
/// the same allocator.
#[derive(Debug, Clone)]
pub struct NativeCommandAllocator {
    id: u64,
    kind: QueueType,
    shared: Arc<AllocatorShared>,
}

impl NativeCommandAllocator {
    pub(super) fn new(id: u64, kind: QueueType) -> Self {
        Self {
            id,
            kind,
            shared: Arc::new(AllocatorShared::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> QueueType {
        self.kind
    }

    /// Number of submitted batches recorded from this allocator that have not executed yet.
    #[must_use]
    pub fn in_flight(&self) -> u32 {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn reset_count(&self) -> u64 {
        self.shared.resets.load(Ordering::Relaxed)
    }

    /// Reclaims the memory of every command recorded from this allocator.
    ///
    /// Fails if any of those commands may still execute, or if a list is
    /// currently recording into the allocator.
    pub fn reset(&self) -> NativeResult<()> {
        if self.in_flight() > 0 {
            return Err(NativeError::AllocatorInFlight(self.id));
        }
        if self.shared.recording.load(Ordering::Acquire) {
            return Err(NativeError::InvalidCall(
                "allocator reset while a command list is recording into it",
            ));
        }
        self.shared.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ─── Recorded batches ────────────────────────────────────────────────────────

/// The immutable command stream produced by closing a command list.
#[derive(Debug)]
pub struct RecordedBatch {
    list_id: u64,
    kind: QueueType,
    commands: Vec<Command>,
    allocator: Arc<AllocatorShared>,
}

impl RecordedBatch {
    #[inline]
    #[must_use]
    pub fn list_id(&self) -> u64 {
        self.list_id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> QueueType {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of individual resource barriers in the batch.
    #[must_use]
    pub fn barrier_count(&self) -> usize {
        self.commands
            .iter()
            .map(|c| match c {
                Command::ResourceBarrier(b) => b.len(),
                _ => 0,
            })
            .sum()
    }

    pub(super) fn mark_submitted(&self) {
        self.allocator.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(super) fn mark_retired(&self) {
        self.allocator.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

// ─── Command lists ───────────────────────────────────────────────────────────

/// A command list. Created closed; `reset` opens it against an allocator.
#[derive(Debug)]
pub struct NativeCommandList {
    id: u64,
    kind: QueueType,
    commands: Vec<Command>,
    allocator: Option<NativeCommandAllocator>,
    recording: bool,
    errors: u32,
    batch: Option<Arc<RecordedBatch>>,
}

impl NativeCommandList {
    pub(super) fn new(id: u64, kind: QueueType) -> Self {
        Self {
            id,
            kind,
            commands: Vec::new(),
            allocator: None,
            recording: false,
            errors: 0,
            batch: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> QueueType {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Commands recorded since the last reset.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        match &self.batch {
            Some(batch) => batch.commands(),
            None => &self.commands,
        }
    }

    /// The batch produced by the last successful `close`.
    #[inline]
    #[must_use]
    pub fn batch(&self) -> Option<&Arc<RecordedBatch>> {
        self.batch.as_ref()
    }

    /// Opens the list for recording, backed by `allocator`.
    pub fn reset(&mut self, allocator: &NativeCommandAllocator) -> NativeResult<()> {
        if self.recording {
            return Err(NativeError::InvalidCall("reset on a command list that is recording"));
        }
        if allocator.kind != self.kind {
            return Err(NativeError::InvalidCall("allocator type does not match command list type"));
        }
        if allocator.shared.recording.swap(true, Ordering::AcqRel) {
            return Err(NativeError::InvalidCall(
                "allocator already backs another recording command list",
            ));
        }
        self.commands.clear();
        self.errors = 0;
        self.batch = None;
        self.recording = true;
        self.allocator = Some(allocator.clone());
        Ok(())
    }

    /// Appends a command. Recording errors are reported by `close`.
    pub fn record(&mut self, command: Command) {
        if !self.recording {
            log::error!("Command recorded into closed command list {}", self.id);
            self.errors += 1;
            return;
        }
        if !command.allowed_on(self.kind) {
            log::error!(
                "Command {command:?} is not allowed on a {} command list",
                self.kind
            );
            self.errors += 1;
            return;
        }
        self.commands.push(command);
    }

    /// Closes the list. The recorded commands become an executable batch.
    pub fn close(&mut self) -> NativeResult<()> {
        if !self.recording {
            return Err(NativeError::InvalidCall("close on a command list that is not recording"));
        }
        self.recording = false;
        let allocator = self
            .allocator
            .take()
            .ok_or(NativeError::InvalidCall("recording command list without allocator"))?;
        allocator.shared.recording.store(false, Ordering::Release);

        if self.errors > 0 {
            self.commands.clear();
            return Err(NativeError::InvalidCall("command list recorded invalid commands"));
        }

        self.batch = Some(Arc::new(RecordedBatch {
            list_id: self.id,
            kind: self.kind,
            commands: std::mem::take(&mut self.commands),
            allocator: Arc::clone(&allocator.shared),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_lists_reject_draws() {
        let draw = Command::Draw {
            vertex_count: 3,
            instance_count: 1,
            start_vertex: 0,
            start_instance: 0,
        };
        assert!(draw.allowed_on(QueueType::Graphics));
        assert!(!draw.allowed_on(QueueType::Compute));
        assert!(!draw.allowed_on(QueueType::Copy));

        let dispatch = Command::Dispatch { x: 1, y: 1, z: 1 };
        assert!(dispatch.allowed_on(QueueType::Compute));
        assert!(!dispatch.allowed_on(QueueType::Copy));
    }

    #[test]
    fn allocator_cannot_back_two_recording_lists() {
        let allocator = NativeCommandAllocator::new(1, QueueType::Graphics);
        let mut a = NativeCommandList::new(2, QueueType::Graphics);
        let mut b = NativeCommandList::new(3, QueueType::Graphics);

        a.reset(&allocator).unwrap();
        assert!(b.reset(&allocator).is_err());
        a.close().unwrap();
        b.reset(&allocator).unwrap();
    }

    #[test]
    fn close_fails_after_invalid_recording() {
        let allocator = NativeCommandAllocator::new(1, QueueType::Copy);
        let mut list = NativeCommandList::new(2, QueueType::Copy);
        list.reset(&allocator).unwrap();
        list.record(Command::Dispatch { x: 1, y: 1, z: 1 });
        assert!(list.close().is_err());
        assert!(list.batch().is_none());
    }

    #[test]
    fn reset_of_allocator_in_flight_is_rejected() {
        let allocator = NativeCommandAllocator::new(1, QueueType::Graphics);
        let mut list = NativeCommandList::new(2, QueueType::Graphics);
        list.reset(&allocator).unwrap();
        list.close().unwrap();

        let batch = Arc::clone(list.batch().unwrap());
        batch.mark_submitted();
        assert_eq!(allocator.reset(), Err(NativeError::AllocatorInFlight(1)));
        batch.mark_retired();
        assert!(allocator.reset().is_ok());
    }
}
