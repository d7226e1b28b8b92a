//! Textures and render targets (framebuffers).
//!
//! Textures are context-owned and referenced by id from targets. A target's
//! attachments always share the target's extent once it has one; resizing a
//! target reallocates every attachment, dropping previous contents.

mod format;
mod framebuffer;
mod texture;

pub use format::InternalFormat;
pub use framebuffer::{Attachment, RenderTarget, TargetSizing};
pub use texture::{Texture, TextureSource};
