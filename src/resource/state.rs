//! Resource Usage States
//!
//! [`ResourceState`] mirrors the usage intent a resource currently has on the
//! GPU. Barriers move a resource between states; the command context emits a
//! barrier only when the recorded state actually differs from the target.
//!
//! [`TransitionTarget`] separates *what* state is wanted from *when* the
//! barrier is emitted. The deferred tag is its own variant, so a resource that
//! legitimately returns to [`ResourceState::COMMON`] is never confused with one
//! whose transition is postponed to `finish()`.

use bitflags::bitflags;

bitflags! {
    /// GPU usage states. Read-only states may be combined; write states are exclusive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        /// Neutral state; required for cross-queue hand-off and presentation.
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const DEPTH_READ = 1 << 5;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        const COPY_DEST = 1 << 10;
        const COPY_SOURCE = 1 << 11;

        const ALL_SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits();
        /// Required state for upload-heap resources.
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::COPY_SOURCE.bits();
        /// Alias of `COMMON` used for swap chain back buffers.
        const PRESENT = 0;
    }
}

impl ResourceState {
    const WRITE_STATES: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::COPY_DEST);
    const COPY_QUEUE_STATES: Self = Self::COPY_SOURCE.union(Self::COPY_DEST);

    /// Returns `true` if the state allows the GPU to write the resource.
    #[inline]
    #[must_use]
    pub const fn is_write(self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// Returns `true` if a copy queue accepts the state (`COMMON` included).
    #[inline]
    #[must_use]
    pub const fn is_copy_queue_state(self) -> bool {
        Self::COPY_QUEUE_STATES.contains(self)
    }

    /// Returns `true` for a state that is neither empty nor a write state.
    #[inline]
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        !self.is_empty() && !self.is_write()
    }
}

/// Target of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionTarget {
    /// Emitted before the next recorded command (or at `finish()`).
    Immediate(ResourceState),
    /// Collected in a per-state bucket and emitted once at `finish()`.
    Deferred(ResourceState),
}

impl TransitionTarget {
    /// The state the resource ends up in.
    #[inline]
    #[must_use]
    pub const fn state(self) -> ResourceState {
        match self {
            TransitionTarget::Immediate(s) | TransitionTarget::Deferred(s) => s,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_deferred(self) -> bool {
        matches!(self, TransitionTarget::Deferred(_))
    }
}

impl From<ResourceState> for TransitionTarget {
    #[inline]
    fn from(state: ResourceState) -> Self {
        TransitionTarget::Immediate(state)
    }
}
