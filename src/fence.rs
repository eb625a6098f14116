//! Queue Fences
//!
//! A [`Fence`] lets the CPU learn when previously submitted GPU work has
//! retired without busy-waiting.
//!
//! # Design
//!
//! ```text
//!   CPU submit thread                 queue worker
//!   ─────────────────                 ────────────
//!   signal(queue) ── next_value++ ──► Signal(native fence, v)
//!        │                                   │
//!        └─ last_signaled = v                └─ native.completed = v ─► wake events
//!
//!   is_complete(v): v <= last_completed (cached)  ──miss──► re-read native value
//!   cpu_wait(v):    is_complete(v) ──no──► register OS event under wait_lock, block
//! ```
//!
//! All three counters only ever grow. `last_completed` is a cache of the
//! native completed value, refreshed only when a query cannot be answered
//! from it, which keeps [`Fence::is_complete`] monotonic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::errors::{GpuError, Result};
use crate::native::{NativeDevice, NativeEvent, NativeFence, NativeQueue};
use crate::types::QueueType;

/// Completion counter of one hardware queue.
pub struct Fence {
    queue: QueueType,
    native: Arc<NativeFence>,
    event: Arc<NativeEvent>,
    next_value: AtomicU64,
    last_signaled: AtomicU64,
    last_completed: AtomicU64,
    wait_lock: Mutex<()>,
}

impl Fence {
    /// Creates a fence at value 0; the first signal uses value 1.
    pub fn new(device: &NativeDevice, queue: QueueType) -> Result<Self> {
        let native = device.create_fence(0).map_err(|e| {
            log::error!("Failed to create {queue} fence: {e}");
            GpuError::from(e)
        })?;
        Ok(Self {
            queue,
            native,
            event: NativeEvent::new(),
            next_value: AtomicU64::new(1),
            last_signaled: AtomicU64::new(0),
            last_completed: AtomicU64::new(0),
            wait_lock: Mutex::new(()),
        })
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    #[inline]
    #[must_use]
    pub fn native(&self) -> &Arc<NativeFence> {
        &self.native
    }

    /// Advances the counter and enqueues a GPU-side signal of the new value.
    ///
    /// Callers must serialize signals with their submissions on `queue`
    /// (see [`CommandQueue`](crate::queue::CommandQueue)). Failure means the
    /// queue or device is gone and is never retried.
    pub fn signal(&self, queue: &NativeQueue) -> Result<u64> {
        debug_assert_eq!(queue.kind(), self.queue, "fence signaled on a foreign queue");
        let value = self.next_value.fetch_add(1, Ordering::AcqRel);
        queue.signal(&self.native, value).map_err(|e| {
            log::error!("Failed to signal {} fence to {value}: {e}", self.queue);
            GpuError::from(e)
        })?;
        self.last_signaled.fetch_max(value, Ordering::AcqRel);
        Ok(value)
    }

    /// The highest value handed out by [`Fence::signal`].
    #[inline]
    #[must_use]
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled.load(Ordering::Acquire)
    }

    /// The cached completed value. May lag behind the hardware.
    #[inline]
    #[must_use]
    pub fn last_completed(&self) -> u64 {
        self.last_completed.load(Ordering::Acquire)
    }

    /// Re-reads the completed value from the hardware and refreshes the cache.
    pub fn poll_completed(&self) -> u64 {
        let completed = self.native.completed_value();
        self.last_completed.fetch_max(completed, Ordering::AcqRel).max(completed)
    }

    /// Returns `true` once the GPU has passed `value`.
    ///
    /// Answered from the cache when possible. Once `true` for a value, it stays
    /// `true` for that value and every smaller one.
    #[must_use]
    pub fn is_complete(&self, value: u64) -> bool {
        value <= self.last_completed() || value <= self.poll_completed()
    }

    /// Blocks the calling thread until the GPU has passed `value`.
    ///
    /// No timeout. Returns [`GpuError::DeviceLost`] if the device is removed
    /// while waiting, and [`GpuError::InvalidState`] for a value that was never
    /// signaled (the wait could not end).
    pub fn cpu_wait(&self, value: u64) -> Result<()> {
        if self.is_complete(value) {
            return Ok(());
        }
        if value > self.last_signaled() {
            return Err(GpuError::InvalidState(format!(
                "waiting for {} fence value {value}, last signaled {}",
                self.queue,
                self.last_signaled()
            )));
        }

        let _guard = self.wait_lock.lock();
        if self.is_complete(value) {
            return Ok(());
        }
        self.native.status().check()?;

        self.event.reset();
        self.native.set_event_on_completion(value, &self.event);
        self.event.wait();

        if self.is_complete(value) {
            return Ok(());
        }
        let reason = self.native.status().removal_reason().unwrap_or_default();
        log::error!("{} fence wait for {value} aborted: device lost", self.queue);
        Err(GpuError::DeviceLost(reason))
    }

    /// Blocks until everything signaled so far has retired.
    pub fn wait_for_idle(&self) -> Result<()> {
        self.cpu_wait(self.last_signaled())
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("queue", &self.queue)
            .field("last_signaled", &self.last_signaled())
            .field("last_completed", &self.last_completed())
            .finish_non_exhaustive()
    }
}
