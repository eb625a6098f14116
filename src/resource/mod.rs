//! GPU Resources
//!
//! Device-created resources and the state tag that mirrors their GPU-side
//! usage state.
//!
//! # Design
//!
//! ```text
//! Buffer / Texture2D / RenderTarget
//!        │ owns
//!        ├── Arc<ResourceCore> ── Arc<NativeResource>
//!        │        └── current state (atomic tag), resting state
//!        └── DescriptorHandle(s) ──Weak──► DescriptorHeap
//! ```
//!
//! Resources hold no reference to the device that created them. Command
//! contexts keep `Arc<ResourceCore>` clones for the resources they have
//! pending transitions on, and recorded command batches keep the native
//! resources alive until the GPU has executed them.

mod buffer;
mod tracked;
mod state;
mod target;
mod texture;

pub use buffer::{Buffer, BufferUsage, CONSTANT_BUFFER_ALIGNMENT};
pub use tracked::{GpuResource, ResourceCore, ResourceId};
pub use state::{ResourceState, TransitionTarget};
pub use target::{FrameBuffer, RenderTarget, TargetView};
pub use texture::Texture2D;
