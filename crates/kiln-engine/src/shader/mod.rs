//! Shader programs.
//!
//! A [`Program`] collects per-stage WGSL sources and attribute bindings, then
//! goes through two explicit phases against a [`Driver`](crate::driver::Driver):
//! - `stage()` compiles every stage that has no compiled handle yet
//! - `link()` combines the compiled stages into an executable program
//!
//! `complete()` runs both and reports success as a boolean. Failures are kept
//! in the program's info log; they never panic.
//!
//! Compilation and interface reflection are shared by all drivers and live in
//! [`reflect`].

mod program;
pub mod reflect;
mod stage;

pub use program::{AttributeBindings, Program, ProgramState, ShaderUnit};
pub use reflect::{ProgramInterface, VertexInput};
pub use stage::{ShaderStage, VertexSemantic};
