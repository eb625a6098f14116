//! Flip-model swap chain.

use std::sync::Arc;

use super::resource::NativeResource;
use super::{NativeError, NativeResult};
use crate::resource::ResourceState;
use crate::types::Format;

/// A swap chain owning its back buffers.
#[derive(Debug)]
pub struct NativeSwapChain {
    buffers: Vec<Arc<NativeResource>>,
    format: Format,
    current: usize,
    presented: u64,
    fullscreen: bool,
}

impl NativeSwapChain {
    pub(super) fn new(buffers: Vec<Arc<NativeResource>>, format: Format) -> Self {
        Self {
            buffers,
            format,
            current: 0,
            presented: 0,
            fullscreen: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn current_back_buffer_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn buffer(&self, index: usize) -> Option<&Arc<NativeResource>> {
        self.buffers.get(index)
    }

    #[inline]
    #[must_use]
    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    #[inline]
    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    /// Flips the current back buffer. It must have been transitioned to `PRESENT`.
    ///
    /// `sync_interval` of 0 presents immediately, 1 waits for vertical blank.
    pub fn present(&mut self, sync_interval: u32) -> NativeResult<()> {
        if sync_interval > 4 {
            return Err(NativeError::InvalidCall("sync interval must be in 0..=4"));
        }
        let buffer = &self.buffers[self.current];
        if buffer.gpu_state() != ResourceState::PRESENT {
            return Err(NativeError::InvalidCall("back buffer is not in the PRESENT state"));
        }
        self.presented += 1;
        self.current = (self.current + 1) % self.buffers.len();
        Ok(())
    }

    pub(super) fn replace_buffers(&mut self, buffers: Vec<Arc<NativeResource>>) {
        self.buffers = buffers;
        self.current = 0;
    }
}
