//! Command Allocator Pool
//!
//! Recycles command allocators once the GPU has consumed everything recorded
//! from them, bounding the live allocator count to roughly the number of
//! submissions in flight.
//!
//! # Design
//!
//! ```text
//!            request_allocator(completed)                 discard_allocator(v, a)
//!   ready: [ (3, A) ─ (5, B) ─ (6, C) ]  ◄──────────────────────── push_back
//!             │
//!             └─ front tag <= completed ? pop, reset, reuse : create new
//! ```
//!
//! Tags are pushed in submission order, so checking the front is enough:
//! reuse is strictly FIFO in fence order, and an allocator whose tag has not
//! retired is never handed out.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::errors::{GpuError, Result};
use crate::native::{NativeCommandAllocator, NativeDevice};
use crate::types::QueueType;

#[derive(Debug, Default)]
struct PoolState {
    all: Vec<NativeCommandAllocator>,
    ready: VecDeque<(u64, NativeCommandAllocator)>,
}

/// Per-queue-type pool of command allocators.
#[derive(Debug)]
pub struct CommandAllocatorPool {
    kind: QueueType,
    state: Mutex<PoolState>,
}

impl CommandAllocatorPool {
    #[must_use]
    pub fn new(kind: QueueType) -> Self {
        Self {
            kind,
            state: Mutex::new(PoolState::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> QueueType {
        self.kind
    }

    /// Returns the oldest ready allocator if its tag is `<= completed_fence_value`,
    /// reset and ready for recording; otherwise creates and registers a new one.
    ///
    /// Never blocks on a fence.
    pub fn request_allocator(
        &self,
        device: &NativeDevice,
        completed_fence_value: u64,
    ) -> Result<NativeCommandAllocator> {
        let mut state = self.state.lock();

        if state
            .ready
            .front()
            .is_some_and(|(tag, _)| *tag <= completed_fence_value)
            && let Some((tag, allocator)) = state.ready.pop_front()
        {
            allocator.reset().map_err(|e| {
                log::error!("Failed to reset {} command allocator: {e}", self.kind);
                GpuError::from(e)
            })?;
            log::trace!(
                "Reusing {} command allocator {} (tag {tag})",
                self.kind,
                allocator.id()
            );
            return Ok(allocator);
        }

        let allocator = device.create_command_allocator(self.kind).map_err(|e| {
            log::error!("Failed to create {} command allocator: {e}", self.kind);
            GpuError::from(e)
        })?;
        state.all.push(allocator.clone());
        log::debug!(
            "Created {} command allocator {} ({} total)",
            self.kind,
            allocator.id(),
            state.all.len()
        );
        Ok(allocator)
    }

    /// Returns an allocator to the pool. It becomes eligible for reuse once
    /// the queue fence reaches `fence_value`. The caller must not touch the
    /// allocator afterwards.
    pub fn discard_allocator(&self, fence_value: u64, allocator: NativeCommandAllocator) {
        debug_assert_eq!(allocator.kind(), self.kind, "allocator returned to a foreign pool");
        let mut state = self.state.lock();
        debug_assert!(
            state.ready.back().is_none_or(|(tag, _)| *tag <= fence_value),
            "allocators must be discarded in fence order"
        );
        state.ready.push_back((fence_value, allocator));
    }

    /// Number of allocators ever created by this pool.
    #[must_use]
    pub fn allocator_count(&self) -> usize {
        self.state.lock().all.len()
    }

    /// Number of allocators waiting in the ready queue.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Fence tags of the ready queue, oldest first.
    #[must_use]
    pub fn ready_tags(&self) -> Vec<u64> {
        self.state.lock().ready.iter().map(|(tag, _)| *tag).collect()
    }
}
