use crate::coords::Extent;
use crate::driver::{Driver, TextureDesc, TextureHandle};

use super::InternalFormat;

/// Initial content of a texture.
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// Tightly packed RGBA8 pixels, row-major, top row first.
    Pixels { extent: Extent, data: Vec<u8> },
    /// Storage for rendering into. Without an extent the texture is allocated
    /// when it joins a sized render target.
    RenderTarget {
        format: InternalFormat,
        extent: Option<Extent>,
    },
}

/// A context-owned texture.
#[derive(Debug)]
pub struct Texture {
    format: InternalFormat,
    extent: Option<Extent>,
    handle: Option<TextureHandle>,
}

impl Texture {
    pub(crate) fn create<D: Driver>(label: &str, source: TextureSource, driver: &mut D) -> Self {
        match source {
            TextureSource::Pixels { extent, data } => {
                let desc = TextureDesc {
                    label,
                    extent,
                    format: InternalFormat::Rgba8,
                };
                let handle = driver.create_texture(&desc, Some(&data));
                Self {
                    format: InternalFormat::Rgba8,
                    extent: Some(extent),
                    handle: Some(handle),
                }
            }
            TextureSource::RenderTarget { format, extent } => {
                let mut tex = Self {
                    format,
                    extent: None,
                    handle: None,
                };
                if let Some(extent) = extent {
                    tex.allocate(label, extent, driver);
                }
                tex
            }
        }
    }

    #[inline]
    pub fn format(&self) -> InternalFormat {
        self.format
    }

    /// Current size, `None` while unallocated.
    #[inline]
    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    pub(crate) fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    /// (Re)creates storage at `extent`. Previous contents are discarded.
    pub(crate) fn allocate<D: Driver>(&mut self, label: &str, extent: Extent, driver: &mut D) {
        if self.extent == Some(extent) && self.handle.is_some() {
            return;
        }
        self.release(driver);
        let desc = TextureDesc {
            label,
            extent,
            format: self.format,
        };
        self.handle = Some(driver.create_texture(&desc, None));
        self.extent = Some(extent);
    }

    pub(crate) fn release<D: Driver>(&mut self, driver: &mut D) {
        if let Some(h) = self.handle.take() {
            driver.release_texture(h);
        }
    }
}
