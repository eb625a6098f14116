//! Command Recording
//!
//! - [`CommandAllocatorPool`]: per-queue recycling of command allocators
//! - [`CommandContext`]: recording, state transitions and submission
//! - [`ContextKind`]: the queue family a context records for

mod allocator_pool;
mod context;
mod kinds;
mod tracker;

pub use allocator_pool::CommandAllocatorPool;
pub(crate) use context::ListSlot;
pub use context::{CommandContext, ComputeContext, ContextStats, CopyContext, GraphicsContext};
pub use kinds::{ComputeCapable, ComputeKind, ContextKind, CopyKind, GraphicsKind};
