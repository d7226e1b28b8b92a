use std::fmt;

/// Shader stage a source text is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ShaderStage {
    Vertex,
    /// Fragment stage.
    Pixel,
}

impl ShaderStage {
    /// Stages a program must have before it can link.
    pub const REQUIRED: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Pixel];

    pub(crate) fn naga_stage(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Pixel => naga::ShaderStage::Fragment,
        }
    }

    /// WGSL attribute that marks this stage's entry point.
    pub fn wgsl_attribute(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "@vertex",
            ShaderStage::Pixel => "@fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Pixel => "pixel",
        })
    }
}

/// Meaning of a vertex stream; attributes are bound to one of these.
///
/// Every semantic is a stream of `f32` components.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum VertexSemantic {
    Position,
    TexCoord,
    Normal,
    Color,
    Tangent,
}

impl VertexSemantic {
    #[inline]
    pub const fn components(self) -> u32 {
        match self {
            VertexSemantic::Position => 3,
            VertexSemantic::TexCoord => 2,
            VertexSemantic::Normal => 3,
            VertexSemantic::Color => 4,
            VertexSemantic::Tangent => 4,
        }
    }

    pub(crate) fn vertex_format(self) -> wgpu::VertexFormat {
        match self.components() {
            2 => wgpu::VertexFormat::Float32x2,
            3 => wgpu::VertexFormat::Float32x3,
            _ => wgpu::VertexFormat::Float32x4,
        }
    }

    /// Byte stride of one vertex in this stream.
    #[inline]
    pub const fn stride(self) -> u64 {
        self.components() as u64 * 4
    }
}

impl fmt::Display for VertexSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VertexSemantic::Position => "position",
            VertexSemantic::TexCoord => "texcoord",
            VertexSemantic::Normal => "normal",
            VertexSemantic::Color => "color",
            VertexSemantic::Tangent => "tangent",
        })
    }
}
