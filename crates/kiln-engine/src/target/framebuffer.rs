use crate::coords::Extent;
use crate::driver::{Driver, TextureDesc, TextureHandle};
use crate::error::{Error, Result};
use crate::resource::{Id, Registry};

use super::{InternalFormat, Texture};

/// How a target's size is decided.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TargetSizing {
    /// Sized by `resize` or by the first sized texture attached.
    Explicit,
    /// Follows the context window size multiplied by `scale`.
    Window { scale: f32 },
}

/// One attachment slot of a render target.
#[derive(Debug)]
pub enum Attachment {
    /// A context texture, sampleable by later passes.
    Texture(Id<Texture>),
    /// Storage owned by the target itself.
    Buffer {
        format: InternalFormat,
        handle: Option<TextureHandle>,
    },
}

/// A set of attachments rendered into together.
#[derive(Debug)]
pub struct RenderTarget {
    colors: Vec<Attachment>,
    depth: Option<Attachment>,
    extent: Option<Extent>,
    sizing: TargetSizing,
}

impl RenderTarget {
    pub(crate) fn new(sizing: TargetSizing) -> Self {
        Self {
            colors: Vec::new(),
            depth: None,
            extent: None,
            sizing,
        }
    }

    #[inline]
    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    #[inline]
    pub fn sizing(&self) -> TargetSizing {
        self.sizing
    }

    #[inline]
    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    #[inline]
    pub fn colors(&self) -> &[Attachment] {
        &self.colors
    }

    #[inline]
    pub fn depth(&self) -> Option<&Attachment> {
        self.depth.as_ref()
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.colors.iter().chain(self.depth.iter())
    }

    /// Whether `texture` is attached to this target.
    pub fn uses_texture(&self, texture: Id<Texture>) -> bool {
        self.attachments()
            .any(|a| matches!(a, Attachment::Texture(id) if *id == texture))
    }

    /// `Ok` when the target can be rendered into; otherwise the reason.
    pub fn check_complete(&self) -> std::result::Result<Extent, &'static str> {
        let Some(extent) = self.extent else {
            return Err("target has no size");
        };
        if self.colors.is_empty() && self.depth.is_none() {
            return Err("missing attachment");
        }
        Ok(extent)
    }

    fn slot_for(&mut self, target: &str, format: InternalFormat, attachment: Attachment) -> Result<()> {
        if format.is_depth() {
            if self.depth.is_some() {
                return Err(Error::InvalidAttachment {
                    target: target.to_string(),
                    reason: format!("already has a depth attachment, cannot add {}", format),
                });
            }
            self.depth = Some(attachment);
        } else {
            self.colors.push(attachment);
        }
        Ok(())
    }

    /// Attaches an existing texture as colour or depth, by its format.
    pub(crate) fn add_texture<D: Driver>(
        &mut self,
        target: &str,
        id: Id<Texture>,
        textures: &mut Registry<Texture>,
        driver: &mut D,
    ) -> Result<()> {
        let tex_name = textures.name(id).unwrap_or_default().to_string();
        let Some(tex) = textures.get(id) else {
            return Err(Error::not_found(crate::error::ResourceKind::Texture, tex_name));
        };
        if self.uses_texture(id) {
            return Err(Error::InvalidAttachment {
                target: target.to_string(),
                reason: format!("texture `{}` is already attached", tex_name),
            });
        }
        let format = tex.format();
        if format.is_depth() && self.depth.is_some() {
            return Err(Error::InvalidAttachment {
                target: target.to_string(),
                reason: format!("already has a depth attachment, cannot add `{}`", tex_name),
            });
        }

        match (self.extent, tex.extent()) {
            (Some(target_size), Some(texture_size)) if target_size != texture_size => {
                return Err(Error::IncompatibleSize {
                    target: target.to_string(),
                    texture: tex_name,
                    target_size,
                    texture_size,
                });
            }
            (Some(target_size), None) => {
                if let Some(tex) = textures.get_mut(id) {
                    tex.allocate(&tex_name, target_size, driver);
                }
            }
            (None, Some(texture_size)) => {
                log::debug!("render target `{}` adopts {} from `{}`", target, texture_size, tex_name);
                self.extent = Some(texture_size);
                self.allocate_all(target, texture_size, textures, driver);
            }
            _ => {}
        }

        self.slot_for(target, format, Attachment::Texture(id))
    }

    /// Creates target-owned storage of `format` and attaches it.
    pub(crate) fn add_buffer<D: Driver>(
        &mut self,
        target: &str,
        format: InternalFormat,
        driver: &mut D,
    ) -> Result<()> {
        let handle = self.extent.map(|extent| {
            driver.create_texture(
                &TextureDesc {
                    label: target,
                    extent,
                    format,
                },
                None,
            )
        });
        let result = self.slot_for(target, format, Attachment::Buffer { format, handle });
        if result.is_err() {
            if let Some(h) = handle {
                driver.release_texture(h);
            }
        }
        result
    }

    /// Reallocates every attachment at `extent`. Same size is a no-op.
    pub(crate) fn resize<D: Driver>(
        &mut self,
        target: &str,
        extent: Extent,
        textures: &mut Registry<Texture>,
        driver: &mut D,
    ) -> Result<()> {
        if extent.is_empty() {
            return Err(Error::InvalidSize {
                width: extent.width,
                height: extent.height,
            });
        }
        let max = driver.max_texture_dimension();
        if extent.width > max || extent.height > max {
            return Err(Error::InvalidSize {
                width: extent.width,
                height: extent.height,
            });
        }
        if self.extent == Some(extent) {
            return Ok(());
        }
        log::debug!("render target `{}` resized to {}", target, extent);
        self.extent = Some(extent);
        self.allocate_all(target, extent, textures, driver);
        Ok(())
    }

    fn allocate_all<D: Driver>(
        &mut self,
        target: &str,
        extent: Extent,
        textures: &mut Registry<Texture>,
        driver: &mut D,
    ) {
        for attachment in self.colors.iter_mut().chain(self.depth.iter_mut()) {
            match attachment {
                Attachment::Texture(id) => {
                    let label = textures.name(*id).unwrap_or(target).to_string();
                    if let Some(tex) = textures.get_mut(*id) {
                        tex.allocate(&label, extent, driver);
                    }
                }
                Attachment::Buffer { format, handle } => {
                    if let Some(h) = handle.take() {
                        driver.release_texture(h);
                    }
                    *handle = Some(driver.create_texture(
                        &TextureDesc {
                            label: target,
                            extent,
                            format: *format,
                        },
                        None,
                    ));
                }
            }
        }
    }

    /// Releases target-owned buffers. Attached textures stay with the context.
    pub(crate) fn release<D: Driver>(&mut self, driver: &mut D) {
        for attachment in self.colors.iter_mut().chain(self.depth.iter_mut()) {
            if let Attachment::Buffer { handle, .. } = attachment {
                if let Some(h) = handle.take() {
                    driver.release_texture(h);
                }
            }
        }
    }
}
