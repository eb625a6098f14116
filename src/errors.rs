//! Error Types
//!
//! This module defines the error types returned by the device layer.
//!
//! # Overview
//!
//! [`GpuError`] follows the failure taxonomy of the layer:
//! - **Device / API errors**: device removal, failed object creation. These
//!   are unrecoverable for the session and are never retried.
//! - **Capacity errors**: descriptor heap exhaustion. Heaps themselves report
//!   exhaustion as `None`; factories convert it into
//!   [`GpuError::DescriptorHeapExhausted`].
//! - **Usage errors**: guarded misuse such as opening a context that is
//!   already recording.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, GpuError>`.
//!
//! ```no_run
//! use myth_gpu::Device;
//! use myth_gpu::errors::Result;
//!
//! fn upload(device: &Device) -> Result<()> {
//!     let _buffer = device.create_vertex_buffer(&[[0.0f32; 4]; 16])?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::native::NativeError;
use crate::types::{DescriptorType, QueueType};

/// The error type of the device layer.
#[derive(Error, Debug)]
pub enum GpuError {
    // ========================================================================
    // Device & API Errors
    // ========================================================================
    /// The device was removed (driver reset, hang, unplug).
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Device construction failed.
    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// Any other failure reported by the native API.
    #[error("Native API error: {0}")]
    Native(NativeError),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// The shader compiler rejected a shader, or none is installed.
    #[error("Shader compilation failed for {source_id}:{entry_point}: {message}")]
    ShaderCompilation {
        source_id: String,
        entry_point: String,
        message: String,
    },

    // ========================================================================
    // Capacity Errors
    // ========================================================================
    /// A descriptor heap has no free slot left.
    #[error("Descriptor heap exhausted: {kind:?} (capacity {capacity})")]
    DescriptorHeapExhausted {
        /// Heap family that ran out
        kind: DescriptorType,
        /// Fixed capacity of the heap
        capacity: u32,
    },

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// An operation was issued in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// `open` was called on a context that is already recording.
    #[error("{0} context is already recording")]
    ContextRecording(QueueType),

    /// A recording operation was issued on a closed context.
    #[error("{0} context is not recording")]
    ContextNotRecording(QueueType),

    /// A target view of one kind was used where another kind is required.
    #[error("Target kind mismatch: expected {expected}, found {found}")]
    TargetKindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A descriptor handle whose heap no longer exists, or whose slot was released.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Presentation requested on a device created without a window.
    #[error("Device has no swap chain")]
    SwapChainMissing,
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<NativeError> for GpuError {
    fn from(err: NativeError) -> Self {
        match err {
            NativeError::DeviceRemoved(reason) => GpuError::DeviceLost(reason),
            other => GpuError::Native(other),
        }
    }
}

impl GpuError {
    /// Returns `true` if the error means the device can no longer be used.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, GpuError::DeviceLost(_) | GpuError::DeviceCreation(_))
    }
}

/// Alias for `Result<T, GpuError>`.
pub type Result<T> = std::result::Result<T, GpuError>;
