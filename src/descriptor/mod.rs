//! Descriptor Management
//!
//! Typed, fixed-capacity slot allocation for resource views.
//!
//! # Design
//!
//! ```text
//! DescriptorHeapManager
//!   ├── RenderTarget  heap  (CPU-only)      ┐
//!   ├── DepthStencil  heap  (CPU-only)      │  each: Mutex<{ watermark, BTreeSet<free> }>
//!   ├── CbvSrvUav     heap  (shader-visible)│
//!   └── Sampler       heap  (shader-visible)┘
//!
//! allocate(kind) ──► smallest free index │ else watermark++ │ else None
//! DescriptorHandle ──Weak──► DescriptorHeap      (released on drop, idempotent)
//! ```
//!
//! Heaps never grow. Outstanding handles address their slot by index, so a
//! full heap reports `None` and the caller decides what to do.
//!
//! Shader-visible handles carry a CPU address (for writing views) and a GPU
//! address (for descriptor tables), both derived from the slot index and the
//! fixed descriptor stride. CPU-only handles carry
//! [`GpuDescriptorHandle::NULL`](crate::native::GpuDescriptorHandle::NULL).

mod handle;
mod heap;
mod manager;

pub use handle::DescriptorHandle;
pub use heap::DescriptorHeap;
pub use manager::{DescriptorHeapManager, DescriptorUsage};
