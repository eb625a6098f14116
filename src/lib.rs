//! # Myth GPU
//!
//! The explicit-API layer beneath the Myth renderer: device and queue
//! ownership, command recording, CPU/GPU synchronization and resource state
//! tracking.
//!
//! - [`Device`]: owns the graphics, compute and copy queues, the descriptor
//!   heaps and the caches, and constructs every GPU resource.
//! - [`CommandContext`]: records work for one queue family and issues all
//!   resource state transitions.
//! - [`Fence`]: per-queue completion counter the CPU can wait on.
//! - [`DescriptorHeapManager`] and [`CommandAllocatorPool`]: fixed-capacity
//!   slot allocation and fence-gated allocator recycling.
//!
//! ```rust,ignore
//! use myth_gpu::{ClearColor, Device, DeviceSettings, Format};
//!
//! let device = Device::new(DeviceSettings::default())?;
//! let target = device.create_render_target(640, 480, Format::Rgba8Unorm, ClearColor::BLACK)?;
//!
//! let mut ctx = device.create_graphics_context()?;
//! ctx.open()?;
//! ctx.clear_render_target(&target, ClearColor::WHITE)?;
//! ctx.finish_and_execute(true)?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod command;
pub mod descriptor;
pub mod device;
pub mod errors;
pub mod fence;
pub mod native;
pub mod pipeline;
pub mod queue;
pub mod resource;
pub mod settings;
pub mod shader;
pub mod swapchain;
pub mod types;

pub use command::{
    CommandAllocatorPool, CommandContext, ComputeCapable, ComputeContext, ComputeKind,
    ContextKind, ContextStats, CopyContext, CopyKind, GraphicsContext, GraphicsKind,
};
pub use descriptor::{DescriptorHandle, DescriptorHeap, DescriptorHeapManager, DescriptorUsage};
pub use device::{Device, DeviceStats};
pub use errors::{GpuError, Result};
pub use fence::Fence;
pub use native::ExecutionMode;
pub use pipeline::{
    BlendMode, ComputePipeline, ComputePipelineDesc, CullMode, GraphicsPipeline,
    GraphicsPipelineDesc, PipelineCache, PrimitiveTopology,
};
pub use queue::CommandQueue;
pub use resource::{
    Buffer, BufferUsage, FrameBuffer, GpuResource, RenderTarget, ResourceState, TargetView,
    Texture2D, TransitionTarget,
};
pub use settings::{DescriptorCapacities, DeviceSettings};
pub use shader::{CompiledShader, ShaderCache, ShaderCompiler, ShaderKey, ShaderStage};
pub use swapchain::{SwapChain, WindowDesc};
pub use types::{ClearColor, DescriptorType, Format, QueueType, ScissorRect, Viewport};
