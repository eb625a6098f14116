//! Barrier bookkeeping for one command context.
//!
//! - **pending**: immediate barriers not yet written to the command list.
//!   They are flushed as one batch before the next recorded command.
//! - **deferred**: resources bucketed by the state they should end the
//!   recording in. Resolved once, at `finish()`. A resource lives in at most
//!   one bucket; the latest deferral wins.
//! - **journal**: the state each touched resource had before the recording
//!   first changed it, so a recording that never reaches the GPU can put the
//!   tags back.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::native::ResourceBarrier;
use crate::resource::{ResourceCore, ResourceId, ResourceState};

pub(crate) type BarrierBatch = SmallVec<[ResourceBarrier; 8]>;

#[derive(Default)]
pub(crate) struct BarrierTracker {
    pending: BarrierBatch,
    deferred: FxHashMap<ResourceState, Vec<Arc<ResourceCore>>>,
    deferred_index: FxHashMap<ResourceId, ResourceState>,
    journal: FxHashMap<ResourceId, (Arc<ResourceCore>, ResourceState)>,
}

impl BarrierTracker {
    /// Queues a barrier moving `resource` to `state` and updates its tag.
    /// Returns `false` (and queues nothing) when the tag already matches.
    pub fn transition(&mut self, resource: &Arc<ResourceCore>, state: ResourceState) -> bool {
        let before = resource.current_state();
        if before == state {
            return false;
        }
        self.journal
            .entry(resource.id())
            .or_insert_with(|| (Arc::clone(resource), before));
        self.pending.push(ResourceBarrier {
            resource: Arc::clone(resource.native()),
            before,
            after: state,
        });
        resource.set_current_state(state);
        true
    }

    /// Puts `resource` in the bucket for `state`, leaving any earlier bucket.
    pub fn defer(&mut self, resource: &Arc<ResourceCore>, state: ResourceState) {
        let id = resource.id();
        if let Some(previous) = self.deferred_index.insert(id, state) {
            if previous == state {
                return;
            }
            if let Some(bucket) = self.deferred.get_mut(&previous) {
                bucket.retain(|r| r.id() != id);
            }
        }
        self.deferred.entry(state).or_default().push(Arc::clone(resource));
    }

    /// Moves every deferred resource whose tag differs from its bucket's state
    /// into the pending batch. Returns the number of barriers queued.
    pub fn resolve_deferred(&mut self) -> usize {
        let mut buckets: Vec<_> = self.deferred.drain().collect();
        buckets.sort_unstable_by_key(|(state, _)| state.bits());
        self.deferred_index.clear();

        let mut queued = 0;
        for (state, resources) in buckets {
            for resource in &resources {
                if self.transition(resource, state) {
                    queued += 1;
                }
            }
        }
        queued
    }

    /// Takes the pending batch, if any.
    pub fn take_pending(&mut self) -> Option<BarrierBatch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred_index.len()
    }

    /// The state `id` is deferred to, if it sits in a bucket.
    pub fn deferred_state(&self, id: ResourceId) -> Option<ResourceState> {
        self.deferred_index.get(&id).copied()
    }

    /// The recording reached the GPU: the current tags are now the truth.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    /// The recording was discarded: restore every tag it changed and drop
    /// all queued work. Returns the number of restored resources.
    pub fn rollback(&mut self) -> usize {
        self.pending.clear();
        self.deferred.clear();
        self.deferred_index.clear();
        let restored = self.journal.len();
        for (_, (resource, state)) in self.journal.drain() {
            resource.set_current_state(state);
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{HeapType, NativeDevice, ResourceDesc};

    fn tracked(device: &NativeDevice, name: &str) -> Arc<ResourceCore> {
        let native = device
            .create_committed_resource(
                &ResourceDesc::buffer(64),
                HeapType::Default,
                ResourceState::COMMON,
                name,
            )
            .unwrap();
        ResourceCore::new(native, ResourceState::COMMON, ResourceState::COMMON)
    }

    #[test]
    fn matching_state_queues_nothing() {
        let device = NativeDevice::new(false);
        let r = tracked(&device, "r");
        let mut tracker = BarrierTracker::default();

        assert!(tracker.transition(&r, ResourceState::COPY_DEST));
        assert!(!tracker.transition(&r, ResourceState::COPY_DEST));
        assert_eq!(tracker.pending_len(), 1);
    }

    #[test]
    fn latest_deferral_wins() {
        let device = NativeDevice::new(false);
        let r = tracked(&device, "r");
        let mut tracker = BarrierTracker::default();

        tracker.defer(&r, ResourceState::COPY_SOURCE);
        tracker.defer(&r, ResourceState::PIXEL_SHADER_RESOURCE);
        assert_eq!(tracker.deferred_len(), 1);

        assert_eq!(tracker.deferred_state(r.id()), Some(ResourceState::PIXEL_SHADER_RESOURCE));

        assert_eq!(tracker.resolve_deferred(), 1);
        assert_eq!(r.current_state(), ResourceState::PIXEL_SHADER_RESOURCE);
        assert_eq!(tracker.deferred_len(), 0);
        assert_eq!(tracker.deferred_state(r.id()), None);
    }

    #[test]
    fn deferral_to_current_state_resolves_to_nothing() {
        let device = NativeDevice::new(false);
        let r = tracked(&device, "r");
        let mut tracker = BarrierTracker::default();

        tracker.defer(&r, ResourceState::COMMON);
        assert_eq!(tracker.resolve_deferred(), 0);
        assert!(tracker.take_pending().is_none());
    }

    #[test]
    fn rollback_restores_first_prior_state() {
        let device = NativeDevice::new(false);
        let r = tracked(&device, "r");
        let mut tracker = BarrierTracker::default();

        tracker.transition(&r, ResourceState::COPY_DEST);
        tracker.transition(&r, ResourceState::COPY_SOURCE);
        assert_eq!(tracker.rollback(), 1);
        assert_eq!(r.current_state(), ResourceState::COMMON);
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn commit_keeps_tags() {
        let device = NativeDevice::new(false);
        let r = tracked(&device, "r");
        let mut tracker = BarrierTracker::default();

        tracker.transition(&r, ResourceState::COPY_DEST);
        tracker.commit();
        assert_eq!(tracker.rollback(), 0);
        assert_eq!(r.current_state(), ResourceState::COPY_DEST);
    }
}
