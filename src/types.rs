//! Shared Value Types
//!
//! Small, copyable vocabulary types used by both the native driver and the
//! device layer: queue families, texel formats, viewports and clear values.

use std::fmt;

use smallvec::SmallVec;

// ============================================================================
// Queues
// ============================================================================

/// The three independent hardware queue families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Draws, dispatches and copies.
    Graphics,
    /// Dispatches and copies.
    Compute,
    /// Copies only.
    Copy,
}

impl QueueType {
    /// All queue types, in slot order.
    pub const ALL: [QueueType; 3] = [QueueType::Graphics, QueueType::Compute, QueueType::Copy];

    /// Stable slot index used for per-queue arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Copy => 2,
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            QueueType::Graphics => "graphics",
            QueueType::Compute => "compute",
            QueueType::Copy => "copy",
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// The four descriptor heap families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// Render target views (CPU-only).
    RenderTarget,
    /// Depth-stencil views (CPU-only).
    DepthStencil,
    /// Constant buffer, shader resource and unordered access views (shader-visible).
    CbvSrvUav,
    /// Samplers (shader-visible).
    Sampler,
}

impl DescriptorType {
    pub const ALL: [DescriptorType; 4] = [
        DescriptorType::RenderTarget,
        DescriptorType::DepthStencil,
        DescriptorType::CbvSrvUav,
        DescriptorType::Sampler,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            DescriptorType::RenderTarget => 0,
            DescriptorType::DepthStencil => 1,
            DescriptorType::CbvSrvUav => 2,
            DescriptorType::Sampler => 3,
        }
    }

    /// Shader-visible heaps expose GPU pointers; the others are CPU-only staging heaps.
    #[inline]
    #[must_use]
    pub const fn is_shader_visible(self) -> bool {
        matches!(self, DescriptorType::CbvSrvUav | DescriptorType::Sampler)
    }
}

// ============================================================================
// Formats
// ============================================================================

/// Texel and index element formats understood by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Untyped memory (buffers).
    #[default]
    Unknown,
    R8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    R16Uint,
    R32Uint,
    D32Float,
    D24UnormS8Uint,
}

impl Format {
    /// Size of one texel (or index) in bytes. `Unknown` is byte-addressed.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::Unknown | Format::R8Unorm => 1,
            Format::R16Uint => 2,
            Format::Rgba8Unorm
            | Format::Bgra8Unorm
            | Format::R32Float
            | Format::R32Uint
            | Format::D32Float
            | Format::D24UnormS8Uint => 4,
            Format::Rgba16Float => 8,
            Format::Rgba32Float => 16,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Format::D32Float | Format::D24UnormS8Uint)
    }

    #[inline]
    #[must_use]
    pub const fn is_index(self) -> bool {
        matches!(self, Format::R16Uint | Format::R32Uint)
    }

    /// Encodes a clear color as one texel of this format.
    ///
    /// Depth and index formats have no color representation and encode to zeros.
    #[must_use]
    pub fn encode_color(self, color: ClearColor) -> SmallVec<[u8; 16]> {
        let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut out = SmallVec::new();
        match self {
            Format::R8Unorm => out.push(unorm(color.r)),
            Format::Rgba8Unorm => {
                out.extend([unorm(color.r), unorm(color.g), unorm(color.b), unorm(color.a)]);
            }
            Format::Bgra8Unorm => {
                out.extend([unorm(color.b), unorm(color.g), unorm(color.r), unorm(color.a)]);
            }
            Format::Rgba16Float => {
                for c in color.to_array() {
                    out.extend_from_slice(&half::f16::from_f32(c).to_le_bytes());
                }
            }
            Format::Rgba32Float => {
                for c in color.to_array() {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
            Format::R32Float => out.extend_from_slice(&color.r.to_le_bytes()),
            _ => out.extend(std::iter::repeat_n(0u8, self.bytes_per_pixel() as usize)),
        }
        out
    }

    /// Encodes a depth/stencil clear value as one texel of this format.
    #[must_use]
    pub fn encode_depth(self, depth: f32, stencil: u8) -> SmallVec<[u8; 16]> {
        let mut out = SmallVec::new();
        match self {
            Format::D32Float => out.extend_from_slice(&depth.to_le_bytes()),
            Format::D24UnormS8Uint => {
                let d = (f64::from(depth.clamp(0.0, 1.0)) * f64::from(0x00FF_FFFFu32)).round() as u32;
                out.extend_from_slice(&(d | (u32::from(stencil) << 24)).to_le_bytes());
            }
            _ => out.extend(std::iter::repeat_n(0u8, self.bytes_per_pixel() as usize)),
        }
        out
    }
}

// ============================================================================
// Fixed-function values
// ============================================================================

/// RGBA clear color in linear space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ClearColor {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Rasterizer viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-target viewport with the standard `[0, 1]` depth range.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle in pixels (right/bottom exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}
