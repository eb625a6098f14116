//! Native Driver
//!
//! The explicit graphics API the device layer is written against. This is an
//! in-process reference driver: it has the shape of a modern explicit API
//! (independent queues, fences with OS events, command allocators and lists,
//! descriptor heaps, committed resources, manual barriers) and executes
//! submitted work asynchronously on per-queue workers.
//!
//! ```text
//! NativeDevice ──creates──► NativeQueue ◄── execute / signal / wait
//!      │                        │
//!      │                        └── worker thread (Threaded) or process() (Manual)
//!      ├──► NativeFence + NativeEvent
//!      ├──► NativeCommandAllocator ──backs──► NativeCommandList ──close──► RecordedBatch
//!      ├──► NativeResource (emulated VRAM + GPU-side state)
//!      ├──► NativeDescriptorHeap
//!      ├──► NativePipeline
//!      └──► NativeSwapChain
//! ```
//!
//! # Validation
//!
//! Every executed barrier's `before` state is checked against the state the
//! GPU actually holds. Mismatches are logged and counted in
//! [`QueueStats::validation_errors`]; permissive hardware would accept them
//! silently, which is exactly what the counter exists to expose.

mod command;
mod descriptor;
mod device;
mod pipeline;
mod queue;
mod resource;
mod swapchain;
mod sync;

pub use command::{
    Command, NativeCommandAllocator, NativeCommandList, RecordedBatch, ResourceBarrier,
};
pub use descriptor::{
    CpuDescriptorHandle, GpuDescriptorHandle, NativeDescriptorHeap, SamplerFilter, ViewDesc,
};
pub use device::{DeviceStatus, NativeDevice};
pub use pipeline::{NativePipeline, PipelineKind};
pub use queue::{ExecutionMode, NativeQueue, QueueStats, QueueStatsSnapshot};
pub use resource::{HeapType, NativeResource, ResourceDesc, ResourceDimension, ResourceFlags};
pub use swapchain::NativeSwapChain;
pub use sync::{NativeEvent, NativeFence};

use thiserror::Error;

/// Errors reported by the native driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    /// The device was removed; every subsequent call fails.
    #[error("device removed: {0}")]
    DeviceRemoved(String),

    /// Resource creation exceeded the emulated memory budget.
    #[error("out of device memory (requested {requested} bytes)")]
    OutOfMemory { requested: u64 },

    /// A command allocator was reset while work recorded from it was still executing.
    #[error("command allocator {0} reset while its commands are still in flight")]
    AllocatorInFlight(u64),

    /// The call violates the API's usage rules.
    #[error("invalid call: {0}")]
    InvalidCall(&'static str),

    /// A queue's execution thread could not be spawned.
    #[error("queue worker could not be started: {0}")]
    WorkerStart(String),
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;
