use std::sync::Arc;

use super::tracked::{GpuResource, ResourceCore};
use crate::descriptor::DescriptorHandle;
use crate::types::Format;

/// A sampled 2D texture with its shader resource view.
#[derive(Debug)]
pub struct Texture2D {
    core: Arc<ResourceCore>,
    width: u32,
    height: u32,
    format: Format,
    srv: DescriptorHandle,
}

impl Texture2D {
    pub(crate) fn new(
        core: Arc<ResourceCore>,
        width: u32,
        height: u32,
        format: Format,
        srv: DescriptorHandle,
    ) -> Self {
        Self {
            core,
            width,
            height,
            format,
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
    pub fn srv(&self) -> &DescriptorHandle {
        &self.srv
    }
}

impl GpuResource for Texture2D {
    #[inline]
    fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }
}
