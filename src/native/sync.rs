//! Fences and OS events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use super::device::DeviceStatus;

/// Manual-reset OS wait object.
#[derive(Debug, Default)]
pub struct NativeEvent {
    signaled: Mutex<bool>,
    cvar: Condvar,
}

impl NativeEvent {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cvar.notify_all();
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the event is set. No timeout.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cvar.wait(&mut signaled);
        }
    }
}

/// GPU fence: a monotonically increasing completed value written by queues.
pub struct NativeFence {
    id: u64,
    completed: AtomicU64,
    waiters: Mutex<Vec<(u64, Arc<NativeEvent>)>>,
    status: Arc<DeviceStatus>,
}

impl NativeFence {
    pub(super) fn new(id: u64, initial: u64, status: Arc<DeviceStatus>) -> Self {
        Self {
            id,
            completed: AtomicU64::new(initial),
            waiters: Mutex::new(Vec::new()),
            status,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The highest value signaled so far.
    #[inline]
    #[must_use]
    pub fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Sets the completed value (never lowers it) and wakes satisfied waiters.
    ///
    /// Called by queue workers when a `Signal` op retires, or directly from the CPU.
    pub fn signal(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::AcqRel);
        let completed = self.completed_value();
        let mut waiters = self.waiters.lock();
        waiters.retain(|(target, event)| {
            if *target <= completed {
                event.set();
                false
            } else {
                true
            }
        });
    }

    /// Arranges for `event` to be set once the fence reaches `value`.
    ///
    /// Sets the event immediately if the value has already been reached or the
    /// device has been removed.
    pub fn set_event_on_completion(&self, value: u64, event: &Arc<NativeEvent>) {
        let mut waiters = self.waiters.lock();
        if self.completed_value() >= value || self.status.is_removed() {
            event.set();
            return;
        }
        waiters.push((value, Arc::clone(event)));
    }

    /// Releases every registered waiter regardless of value. Used on device removal.
    pub(super) fn release_waiters(&self) {
        for (_, event) in self.waiters.lock().drain(..) {
            event.set();
        }
    }

    /// Blocks the calling thread until the fence reaches `value` or the device is lost.
    pub(super) fn block_until(&self, value: u64) {
        if self.completed_value() >= value {
            return;
        }
        let event = NativeEvent::new();
        self.set_event_on_completion(value, &event);
        event.wait();
    }

    /// Removal state of the device that created the fence.
    #[inline]
    #[must_use]
    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }
}

impl std::fmt::Debug for NativeFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFence")
            .field("id", &self.id)
            .field("completed", &self.completed_value())
            .finish_non_exhaustive()
    }
}
