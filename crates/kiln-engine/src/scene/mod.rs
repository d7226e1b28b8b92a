//! Scene instances and the draw-call generators passes invoke.

mod generator;
mod key;
mod list;

pub use generator::{FullscreenGenerator, GenerateCx, Generator, SceneGenerator};
pub use key::{Layer, SortKey};
pub use list::{Instance, Scene};

/// Name of the built-in generator drawing the scene.
pub const SCENE_GENERATOR: &str = "scene";

/// Name of the built-in generator drawing one full-screen quad.
pub const FULLSCREEN_GENERATOR: &str = "fullscreen";
