//! Swap Chain
//!
//! Wraps the native swap chain and gives each back buffer a tracked
//! [`ResourceCore`] so presentation goes through the same state tags as every
//! other resource. Back buffers rest in `PRESENT`.

use std::sync::Arc;

use raw_window_handle::RawWindowHandle;

use crate::errors::{GpuError, Result};
use crate::native::{NativeDevice, NativeSwapChain};
use crate::resource::{ResourceCore, ResourceState};
use crate::types::Format;

/// A native window handle that can cross threads.
///
/// The handle is only stored and handed back; this layer never dereferences it.
#[derive(Debug, Clone, Copy)]
pub struct SendableWindowHandle(pub RawWindowHandle);

// SAFETY: the handle is an opaque token owned by the windowing system and is
// never dereferenced by this crate.
unsafe impl Send for SendableWindowHandle {}
// SAFETY: see above.
unsafe impl Sync for SendableWindowHandle {}

/// The window a device presents to.
#[derive(Debug, Clone, Copy)]
pub struct WindowDesc {
    pub handle: Option<SendableWindowHandle>,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl WindowDesc {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            handle: None,
            width,
            height,
            fullscreen: false,
        }
    }

    #[must_use]
    pub fn with_handle(mut self, handle: RawWindowHandle) -> Self {
        self.handle = Some(SendableWindowHandle(handle));
        self
    }

    #[must_use]
    pub fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }
}

/// Back buffers plus the presentation state of one window.
#[derive(Debug)]
pub struct SwapChain {
    native: NativeSwapChain,
    buffers: Vec<Arc<ResourceCore>>,
    window: WindowDesc,
    vsync: bool,
}

impl SwapChain {
    pub(crate) fn new(
        device: &NativeDevice,
        window: WindowDesc,
        buffer_count: u32,
        format: Format,
        vsync: bool,
    ) -> Result<Self> {
        if window.width == 0 || window.height == 0 {
            return Err(GpuError::InvalidState(format!(
                "swap chain of {}x{} pixels",
                window.width, window.height
            )));
        }
        let mut native = device
            .create_swap_chain(window.width, window.height, format, buffer_count)
            .map_err(|e| {
                log::error!("Failed to create swap chain: {e}");
                GpuError::from(e)
            })?;
        native.set_fullscreen(window.fullscreen);
        let buffers = wrap_buffers(&native);
        Ok(Self {
            native,
            buffers,
            window,
            vsync,
        })
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.window.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.window.height
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> Format {
        self.native.format()
    }

    #[inline]
    #[must_use]
    pub fn window(&self) -> &WindowDesc {
        &self.window
    }

    #[inline]
    #[must_use]
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    #[inline]
    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.native.is_fullscreen()
    }

    #[inline]
    #[must_use]
    pub fn presented_frames(&self) -> u64 {
        self.native.presented_frames()
    }

    #[inline]
    #[must_use]
    pub fn buffer_count(&self) -> u32 {
        self.native.buffer_count()
    }

    #[must_use]
    pub fn current_back_buffer_index(&self) -> usize {
        self.native.current_back_buffer_index()
    }

    /// The back buffer the next present will show.
    pub fn current_back_buffer(&self) -> Result<&Arc<ResourceCore>> {
        self.buffers
            .get(self.native.current_back_buffer_index())
            .ok_or_else(|| GpuError::InvalidState("swap chain has no back buffers".into()))
    }

    pub(crate) fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    pub(crate) fn set_fullscreen(&mut self, fullscreen: bool) {
        self.window.fullscreen = fullscreen;
        self.native.set_fullscreen(fullscreen);
    }

    /// Flips the current back buffer, which must already be in `PRESENT`.
    pub(crate) fn present(&mut self) -> Result<()> {
        let interval = u32::from(self.vsync);
        self.native.present(interval).map_err(|e| {
            log::error!("Present failed: {e}");
            GpuError::from(e)
        })
    }

    /// Recreates the back buffers. The GPU must be idle.
    pub(crate) fn resize(&mut self, device: &NativeDevice, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidState(format!(
                "swap chain resize to {width}x{height}"
            )));
        }
        device
            .resize_swap_chain(&mut self.native, width, height)
            .map_err(GpuError::from)?;
        self.buffers = wrap_buffers(&self.native);
        self.window.width = width;
        self.window.height = height;
        Ok(())
    }
}

fn wrap_buffers(native: &NativeSwapChain) -> Vec<Arc<ResourceCore>> {
    (0..native.buffer_count() as usize)
        .filter_map(|i| native.buffer(i))
        .map(|buffer| {
            ResourceCore::new(
                Arc::clone(buffer),
                ResourceState::PRESENT,
                ResourceState::PRESENT,
            )
        })
        .collect()
}
