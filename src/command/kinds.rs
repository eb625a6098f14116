//! Queue-kind markers for [`CommandContext`](super::CommandContext).
//!
//! The set of context kinds is fixed by the hardware, so it is sealed and
//! dispatched statically: draw calls exist only on graphics contexts,
//! dispatches on graphics and compute contexts.

use crate::types::QueueType;

mod sealed {
    pub trait Sealed {}
}

/// A queue family a context records for.
pub trait ContextKind: sealed::Sealed + 'static {
    const QUEUE: QueueType;
}

/// Kinds whose lists may bind compute pipelines, descriptor tables and dispatch.
pub trait ComputeCapable: ContextKind {}

#[derive(Debug)]
pub enum GraphicsKind {}

#[derive(Debug)]
pub enum ComputeKind {}

#[derive(Debug)]
pub enum CopyKind {}

impl sealed::Sealed for GraphicsKind {}
impl sealed::Sealed for ComputeKind {}
impl sealed::Sealed for CopyKind {}

impl ContextKind for GraphicsKind {
    const QUEUE: QueueType = QueueType::Graphics;
}

impl ContextKind for ComputeKind {
    const QUEUE: QueueType = QueueType::Compute;
}

impl ContextKind for CopyKind {
    const QUEUE: QueueType = QueueType::Copy;
}

impl ComputeCapable for GraphicsKind {}
impl ComputeCapable for ComputeKind {}
