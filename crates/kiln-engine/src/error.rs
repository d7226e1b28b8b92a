use std::fmt;

use crate::shader::ShaderStage;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Resource category a name or id belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Program,
    Texture,
    Target,
    Mesh,
    Generator,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Program => "program",
            ResourceKind::Texture => "texture",
            ResourceKind::Target => "render target",
            ResourceKind::Mesh => "mesh",
            ResourceKind::Generator => "generator",
        };
        f.write_str(s)
    }
}

/// Engine error taxonomy.
///
/// Compile and link failures are recoverable: `Program::complete` folds them
/// into a `false` result and keeps the diagnostic text in the program log.
/// Pass-level errors are reported per pass in a `FrameReport`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{stage} stage of program `{program}` failed to compile:\n{log}")]
    Compile {
        program: String,
        stage: ShaderStage,
        log: String,
    },

    #[error("program `{program}` failed to link:\n{log}")]
    Link { program: String, log: String },

    #[error("{kind} `{name}` already exists")]
    DuplicateName { kind: ResourceKind, name: String },

    #[error("attribute `{name}` is already bound to {existing}, cannot rebind to {requested}")]
    DuplicateAttribute {
        name: String,
        existing: crate::shader::VertexSemantic,
        requested: crate::shader::VertexSemantic,
    },

    #[error("pass {pass}: unresolved {kind} `{name}`")]
    UnresolvedReference {
        pass: usize,
        kind: ResourceKind,
        name: String,
    },

    #[error("texture `{texture}` is {texture_size}, render target `{target}` is {target_size}")]
    IncompatibleSize {
        target: String,
        texture: String,
        target_size: crate::coords::Extent,
        texture_size: crate::coords::Extent,
    },

    #[error("render target `{target}`: {reason}")]
    InvalidAttachment { target: String, reason: String },

    #[error("invalid size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("render target `{target}` is incomplete: {reason}")]
    IncompleteTarget { target: String, reason: &'static str },

    #[error("pass {pass}: program `{program}` is not linked")]
    IncompleteProgram { pass: usize, program: String },

    #[error("pass {pass}: {reason}")]
    InvalidPass { pass: usize, reason: String },

    #[error("texture `{texture}`: {reason}")]
    InvalidTexture { texture: String, reason: String },

    #[error("mesh `{mesh}`: {reason}")]
    InvalidMesh { mesh: String, reason: String },

    #[error("{kind} `{name}` does not exist")]
    NotFound { kind: ResourceKind, name: String },

    #[error("failed to load image {path:?}: {source}")]
    Image {
        path: std::path::PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl Error {
    pub(crate) fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Error::NotFound { kind, name: name.into() }
    }

    pub(crate) fn unresolved(pass: usize, kind: ResourceKind, name: impl Into<String>) -> Self {
        Error::UnresolvedReference { pass, kind, name: name.into() }
    }

    /// Returns `true` for errors that only skip a single pass.
    pub fn is_pass_local(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedReference { .. }
                | Error::IncompleteTarget { .. }
                | Error::IncompleteProgram { .. }
                | Error::InvalidPass { .. }
        )
    }
}
