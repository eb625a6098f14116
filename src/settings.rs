//! Device Settings
//!
//! Configuration consumed once by [`Device::new`](crate::Device::new).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_gpu::{Device, DeviceSettings, ExecutionMode};
//!
//! // Defaults: threaded queues, validation in debug builds, vsync on.
//! let device = Device::new(DeviceSettings::default())?;
//!
//! // Deterministic stepping for tests.
//! let settings = DeviceSettings::default()
//!     .with_execution(ExecutionMode::Manual)
//!     .with_label("test-device");
//! ```

use crate::native::ExecutionMode;
use crate::types::{DescriptorType, Format};

// ---------------------------------------------------------------------------
// DescriptorCapacities
// ---------------------------------------------------------------------------

/// Fixed slot counts of the four descriptor heaps.
///
/// Heaps never grow: outstanding handles address their slot by index, so
/// these values are the hard limit for the lifetime of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorCapacities {
    pub render_target: u32,
    pub depth_stencil: u32,
    pub cbv_srv_uav: u32,
    pub sampler: u32,
}

impl Default for DescriptorCapacities {
    fn default() -> Self {
        Self {
            render_target: 256,
            depth_stencil: 64,
            cbv_srv_uav: 4096,
            sampler: 256,
        }
    }
}

impl DescriptorCapacities {
    /// Same capacity for every heap. Handy for exhaustion tests.
    #[must_use]
    pub const fn uniform(capacity: u32) -> Self {
        Self {
            render_target: capacity,
            depth_stencil: capacity,
            cbv_srv_uav: capacity,
            sampler: capacity,
        }
    }

    /// Overrides the capacity of one heap.
    #[must_use]
    pub const fn with(mut self, kind: DescriptorType, capacity: u32) -> Self {
        match kind {
            DescriptorType::RenderTarget => self.render_target = capacity,
            DescriptorType::DepthStencil => self.depth_stencil = capacity,
            DescriptorType::CbvSrvUav => self.cbv_srv_uav = capacity,
            DescriptorType::Sampler => self.sampler = capacity,
        }
        self
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, kind: DescriptorType) -> u32 {
        match kind {
            DescriptorType::RenderTarget => self.render_target,
            DescriptorType::DepthStencil => self.depth_stencil,
            DescriptorType::CbvSrvUav => self.cbv_srv_uav,
            DescriptorType::Sampler => self.sampler,
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceSettings
// ---------------------------------------------------------------------------

/// Global configuration for device creation.
///
/// # Fields
///
/// | Field                   | Description                                 | Default           |
/// |-------------------------|---------------------------------------------|-------------------|
/// | `descriptor_capacities` | Slot count per descriptor heap              | 256/64/4096/256   |
/// | `execution`             | How queues retire submitted work            | `Threaded`        |
/// | `validation`            | Barrier validation in the native driver     | debug builds only |
/// | `vsync`                 | Present on vertical blank                   | `true`            |
/// | `back_buffer_count`     | Swap chain buffer count                     | 2                 |
/// | `back_buffer_format`    | Swap chain buffer format                    | `Bgra8Unorm`      |
/// | `label`                 | Name used in log lines                      | `None`            |
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    // === Descriptors ===
    pub descriptor_capacities: DescriptorCapacities,

    // === Queues ===
    /// [`ExecutionMode::Manual`] retires nothing until the queues are
    /// processed; blocking device waits process them first.
    pub execution: ExecutionMode,

    /// Check every executed barrier against the state the GPU holds.
    pub validation: bool,

    // === Presentation ===
    pub vsync: bool,
    pub back_buffer_count: u32,
    pub back_buffer_format: Format,

    /// Device name used in log lines.
    pub label: Option<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            descriptor_capacities: DescriptorCapacities::default(),
            execution: ExecutionMode::Threaded,
            validation: cfg!(debug_assertions),
            vsync: true,
            back_buffer_count: 2,
            back_buffer_format: Format::Bgra8Unorm,
            label: None,
        }
    }
}

impl DeviceSettings {
    #[must_use]
    pub fn with_descriptor_capacities(mut self, capacities: DescriptorCapacities) -> Self {
        self.descriptor_capacities = capacities;
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub fn with_back_buffers(mut self, count: u32, format: Format) -> Self {
        self.back_buffer_count = count;
        self.back_buffer_format = format;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The label, or `"device"` when unset.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("device")
    }
}
