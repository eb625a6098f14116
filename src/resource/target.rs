//! Render Targets
//!
//! Color, depth-stencil and unordered-access targets share one struct,
//! [`RenderTarget`]; what they can be bound as is the closed sum
//! [`TargetView`]. Every target also owns a shader resource view so it can be
//! sampled after it has been written.

use std::sync::Arc;

use smallvec::SmallVec;

use super::tracked::{GpuResource, ResourceCore};
use super::state::ResourceState;
use crate::descriptor::DescriptorHandle;
use crate::errors::{GpuError, Result};
use crate::types::{ClearColor, Format};

/// The write view of a target.
#[derive(Debug)]
pub enum TargetView {
    Color {
        rtv: DescriptorHandle,
        clear: ClearColor,
    },
    DepthStencil {
        dsv: DescriptorHandle,
        depth: f32,
        stencil: u8,
    },
    UnorderedAccess {
        uav: DescriptorHandle,
    },
}

impl TargetView {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            TargetView::Color { .. } => "color target",
            TargetView::DepthStencil { .. } => "depth-stencil target",
            TargetView::UnorderedAccess { .. } => "unordered-access target",
        }
    }

    /// The state the target must be in to be written through this view.
    #[must_use]
    pub const fn write_state(&self) -> ResourceState {
        match self {
            TargetView::Color { .. } => ResourceState::RENDER_TARGET,
            TargetView::DepthStencil { .. } => ResourceState::DEPTH_WRITE,
            TargetView::UnorderedAccess { .. } => ResourceState::UNORDERED_ACCESS,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &DescriptorHandle {
        match self {
            TargetView::Color { rtv, .. } => rtv,
            TargetView::DepthStencil { dsv, .. } => dsv,
            TargetView::UnorderedAccess { uav } => uav,
        }
    }
}

/// A 2D texture that can be written by the GPU.
#[derive(Debug)]
pub struct RenderTarget {
    core: Arc<ResourceCore>,
    width: u32,
    height: u32,
    format: Format,
    view: TargetView,
    srv: DescriptorHandle,
}

impl RenderTarget {
    pub(crate) fn new(
        core: Arc<ResourceCore>,
        width: u32,
        height: u32,
        format: Format,
        view: TargetView,
        srv: DescriptorHandle,
    ) -> Self {
        Self {
            core,
            width,
            height,
            format,
            view,
            srv,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> &TargetView {
        &self.view
    }

    #[inline]
    #[must_use]
    pub fn srv(&self) -> &DescriptorHandle {
        &self.srv
    }

    /// The render target view. Fails for depth and UAV targets.
    pub fn rtv(&self) -> Result<&DescriptorHandle> {
        match &self.view {
            TargetView::Color { rtv, .. } => Ok(rtv),
            other => Err(mismatch("color target", other)),
        }
    }

    /// The depth-stencil view. Fails for color and UAV targets.
    pub fn dsv(&self) -> Result<&DescriptorHandle> {
        match &self.view {
            TargetView::DepthStencil { dsv, .. } => Ok(dsv),
            other => Err(mismatch("depth-stencil target", other)),
        }
    }

    /// The unordered access view. Fails for color and depth targets.
    pub fn uav(&self) -> Result<&DescriptorHandle> {
        match &self.view {
            TargetView::UnorderedAccess { uav } => Ok(uav),
            other => Err(mismatch("unordered-access target", other)),
        }
    }

    /// Clear value chosen at creation (color targets).
    #[must_use]
    pub fn clear_color(&self) -> Option<ClearColor> {
        match self.view {
            TargetView::Color { clear, .. } => Some(clear),
            _ => None,
        }
    }

    /// Clear values chosen at creation (depth targets).
    #[must_use]
    pub fn clear_depth(&self) -> Option<(f32, u8)> {
        match self.view {
            TargetView::DepthStencil { depth, stencil, .. } => Some((depth, stencil)),
            _ => None,
        }
    }
}

fn mismatch(expected: &'static str, found: &TargetView) -> GpuError {
    GpuError::TargetKindMismatch {
        expected,
        found: found.kind_name(),
    }
}

impl GpuResource for RenderTarget {
    #[inline]
    fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }
}

// ─── Frame Buffer ────────────────────────────────────────────────────────────

/// Up to eight color targets plus an optional depth target, all the same size.
#[derive(Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    colors: SmallVec<[RenderTarget; 8]>,
    depth: Option<RenderTarget>,
}

impl FrameBuffer {
    /// Maximum number of simultaneously bound color targets.
    pub const MAX_COLOR_TARGETS: usize = 8;

    pub(crate) fn new(
        width: u32,
        height: u32,
        colors: SmallVec<[RenderTarget; 8]>,
        depth: Option<RenderTarget>,
    ) -> Self {
        Self {
            width,
            height,
            colors,
            depth,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn colors(&self) -> &[RenderTarget] {
        &self.colors
    }

    #[must_use]
    pub fn color(&self, index: usize) -> Option<&RenderTarget> {
        self.colors.get(index)
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> Option<&RenderTarget> {
        self.depth.as_ref()
    }
}
