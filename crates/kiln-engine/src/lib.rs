//! Kiln engine crate.
//!
//! Named shader programs, textures, render targets and meshes owned by a
//! [`RenderContext`], executed as an ordered [`RenderPipeline`] of passes
//! against a [`Driver`](driver::Driver) backend.

pub mod context;
pub mod coords;
pub mod device;
pub mod driver;
pub mod error;
pub mod logging;
pub mod mesh;
pub mod pipeline;
pub mod resource;
pub mod scene;
pub mod shader;
pub mod target;
pub mod time;

pub use context::{ContextConfig, RenderContext, DEFAULT_TARGET, FULLSCREEN_PROGRAM};
pub use error::{Error, ResourceKind, Result};
pub use pipeline::{FrameReport, PassOutcome, RenderPass, RenderPipeline};
