use std::fmt;

/// Storage format of a texture or attachment buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InternalFormat {
    Rgba8,
    Rgba8Srgb,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Depth16,
    Depth24,
    Depth32Float,
    Depth24Stencil8,
}

impl InternalFormat {
    #[inline]
    pub fn is_color(self) -> bool {
        !self.is_depth()
    }

    /// Depth or depth-stencil.
    #[inline]
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            InternalFormat::Depth16
                | InternalFormat::Depth24
                | InternalFormat::Depth32Float
                | InternalFormat::Depth24Stencil8
        )
    }

    #[inline]
    pub fn has_stencil(self) -> bool {
        self == InternalFormat::Depth24Stencil8
    }

    pub(crate) fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            InternalFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            InternalFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            InternalFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            InternalFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            InternalFormat::R32Float => wgpu::TextureFormat::R32Float,
            InternalFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
            InternalFormat::Depth24 => wgpu::TextureFormat::Depth24Plus,
            InternalFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            InternalFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }

    /// Whether the format can be sampled with a filtering sampler.
    pub fn is_filterable(self) -> bool {
        matches!(
            self,
            InternalFormat::Rgba8 | InternalFormat::Rgba8Srgb | InternalFormat::Rgba16Float
        )
    }

    /// Whether blending into an attachment of this format is supported.
    pub(crate) fn is_blendable(self) -> bool {
        self.is_filterable()
    }

    pub(crate) fn bytes_per_pixel(self) -> u32 {
        match self {
            InternalFormat::Rgba8 | InternalFormat::Rgba8Srgb => 4,
            InternalFormat::Rgba16Float => 8,
            InternalFormat::Rgba32Float => 16,
            InternalFormat::R32Float => 4,
            InternalFormat::Depth16 => 2,
            InternalFormat::Depth24 | InternalFormat::Depth32Float | InternalFormat::Depth24Stencil8 => 4,
        }
    }
}

impl fmt::Display for InternalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(InternalFormat::Rgba8.is_color());
        assert!(!InternalFormat::Rgba8.is_depth());
        assert!(InternalFormat::Depth24.is_depth());
        assert!(!InternalFormat::Depth24.has_stencil());
        assert!(InternalFormat::Depth24Stencil8.is_depth());
        assert!(InternalFormat::Depth24Stencil8.has_stencil());
        assert!(InternalFormat::R32Float.is_color());
    }
}
