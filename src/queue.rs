//! Command Queues
//!
//! [`CommandQueue`] bundles one hardware queue with its [`Fence`] and its
//! [`CommandAllocatorPool`]. Submission, fence signal and allocator discard
//! happen under one lock, so fence values, submission order and the order of
//! the pool's ready queue always agree.

use parking_lot::Mutex;

use crate::command::CommandAllocatorPool;
use crate::errors::{GpuError, Result};
use crate::fence::Fence;
use crate::native::{
    ExecutionMode, NativeCommandAllocator, NativeCommandList, NativeDevice, NativeQueue,
    QueueStatsSnapshot,
};
use crate::types::QueueType;

/// A hardware queue with its fence and allocator pool.
#[derive(Debug)]
pub struct CommandQueue {
    kind: QueueType,
    native: NativeQueue,
    fence: Fence,
    allocators: CommandAllocatorPool,
    submit_lock: Mutex<()>,
}

impl CommandQueue {
    pub fn new(device: &NativeDevice, kind: QueueType, mode: ExecutionMode) -> Result<Self> {
        let native = device.create_command_queue(kind, mode).map_err(|e| {
            log::error!("Failed to create {kind} queue: {e}");
            GpuError::from(e)
        })?;
        Ok(Self {
            kind,
            native,
            fence: Fence::new(device, kind)?,
            allocators: CommandAllocatorPool::new(kind),
            submit_lock: Mutex::new(()),
        })
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> QueueType {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn native(&self) -> &NativeQueue {
        &self.native
    }

    #[inline]
    #[must_use]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    #[inline]
    #[must_use]
    pub fn allocator_pool(&self) -> &CommandAllocatorPool {
        &self.allocators
    }

    #[must_use]
    pub fn stats(&self) -> QueueStatsSnapshot {
        self.native.stats()
    }

    /// Submits closed lists and signals the fence. Returns the signaled value.
    pub fn execute(&self, lists: &[&NativeCommandList]) -> Result<u64> {
        let _guard = self.submit_lock.lock();
        self.submit_locked(lists)
    }

    /// Submits one list recorded from `allocator`, signals the fence and hands
    /// the allocator back to the pool tagged with the signaled value.
    ///
    /// On failure the allocator is returned to the caller with the error.
    pub fn execute_and_discard(
        &self,
        list: &NativeCommandList,
        allocator: NativeCommandAllocator,
    ) -> std::result::Result<u64, (GpuError, NativeCommandAllocator)> {
        let _guard = self.submit_lock.lock();
        match self.submit_locked(&[list]) {
            Ok(value) => {
                self.allocators.discard_allocator(value, allocator);
                Ok(value)
            }
            Err(e) => Err((e, allocator)),
        }
    }

    fn submit_locked(&self, lists: &[&NativeCommandList]) -> Result<u64> {
        self.native.execute_command_lists(lists).map_err(|e| {
            log::error!("{} queue submission failed: {e}", self.kind);
            GpuError::from(e)
        })?;
        self.fence.signal(&self.native)
    }

    /// Signals the fence without submitting work.
    pub fn signal(&self) -> Result<u64> {
        let _guard = self.submit_lock.lock();
        self.fence.signal(&self.native)
    }

    /// Signals a caller-owned fence in submission order with this queue's work.
    pub fn signal_fence(&self, fence: &Fence) -> Result<u64> {
        let _guard = self.submit_lock.lock();
        fence.signal(&self.native)
    }

    /// Makes later work on this queue wait on the GPU for `fence` to reach `value`.
    pub fn gpu_wait(&self, fence: &Fence, value: u64) -> Result<()> {
        let _guard = self.submit_lock.lock();
        self.native.wait(fence.native(), value).map_err(GpuError::from)
    }

    /// Pulls an allocator from the pool, judged against the fence's completed value.
    pub fn request_allocator(&self, device: &NativeDevice) -> Result<NativeCommandAllocator> {
        self.allocators
            .request_allocator(device, self.fence.poll_completed())
    }

    /// Returns an allocator that has no submitted work outstanding.
    pub fn return_unused_allocator(&self, allocator: NativeCommandAllocator) {
        let _guard = self.submit_lock.lock();
        self.allocators
            .discard_allocator(self.fence.last_signaled(), allocator);
    }
}
