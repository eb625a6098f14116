use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::state::ResourceState;
use crate::native::NativeResource;

/// Stable identity of a tracked resource.
pub type ResourceId = u64;

/// A native resource plus the state tag mirroring its GPU-side state.
///
/// The tag is written only by the command context recording against the
/// resource. It is atomic so sharing is memory-safe, but two contexts
/// recording against the same resource concurrently still need external
/// synchronization to keep the tag meaningful.
pub struct ResourceCore {
    native: Arc<NativeResource>,
    state: AtomicU32,
    resting: ResourceState,
}

impl ResourceCore {
    /// Wraps a native resource created in `initial`. `resting` is the state
    /// helpers return the resource to once they are done with it.
    #[must_use]
    pub fn new(
        native: Arc<NativeResource>,
        initial: ResourceState,
        resting: ResourceState,
    ) -> Arc<Self> {
        Arc::new(Self {
            native,
            state: AtomicU32::new(initial.bits()),
            resting,
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.native.id()
    }

    #[inline]
    #[must_use]
    pub fn native(&self) -> &Arc<NativeResource> {
        &self.native
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.native.name()
    }

    #[inline]
    #[must_use]
    pub fn current_state(&self) -> ResourceState {
        ResourceState::from_bits_retain(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_current_state(&self, state: ResourceState) {
        self.state.store(state.bits(), Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn resting_state(&self) -> ResourceState {
        self.resting
    }
}

impl std::fmt::Debug for ResourceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCore")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.current_state())
            .finish()
    }
}

/// Anything backed by a tracked GPU resource.
pub trait GpuResource {
    fn core(&self) -> &Arc<ResourceCore>;

    #[inline]
    fn current_state(&self) -> ResourceState {
        ResourceCore::current_state(self.core())
    }
}

impl GpuResource for Arc<ResourceCore> {
    #[inline]
    fn core(&self) -> &Arc<ResourceCore> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{HeapType, NativeDevice, ResourceDesc};
    use crate::resource::{Buffer, BufferUsage};

    fn core(device: &NativeDevice, state: ResourceState) -> Arc<ResourceCore> {
        let native = device
            .create_committed_resource(&ResourceDesc::buffer(256), HeapType::Default, state, "core")
            .unwrap();
        ResourceCore::new(native, state, ResourceState::VERTEX_AND_CONSTANT_BUFFER)
    }

    #[test]
    fn trait_state_on_a_shared_core_reads_the_tag() {
        let device = NativeDevice::new(false);
        let core = core(&device, ResourceState::COPY_DEST);

        assert_eq!(GpuResource::current_state(&core), ResourceState::COPY_DEST);
        core.set_current_state(ResourceState::COPY_SOURCE);
        assert_eq!(GpuResource::current_state(&core), ResourceState::COPY_SOURCE);
        assert_eq!(ResourceCore::current_state(&core), ResourceState::COPY_SOURCE);
    }

    #[test]
    fn trait_state_on_a_buffer_reads_the_tag() {
        let device = NativeDevice::new(false);
        let core = core(&device, ResourceState::VERTEX_AND_CONSTANT_BUFFER);
        let buffer = Buffer::new(Arc::clone(&core), BufferUsage::Constant, 256, None);

        assert_eq!(buffer.current_state(), ResourceState::VERTEX_AND_CONSTANT_BUFFER);
        core.set_current_state(ResourceState::COPY_DEST);
        assert_eq!(buffer.current_state(), ResourceState::COPY_DEST);
    }
}
