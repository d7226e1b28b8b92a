use crate::mesh::Mesh;
use crate::resource::Id;
use crate::time::FrameTime;

use super::Scene;

/// What a generator sees while a pass executes.
#[derive(Debug)]
pub struct GenerateCx<'a> {
    /// Pipeline index of the pass.
    pub pass: usize,
    pub scene: &'a Scene,
    /// The context's built-in clip-space quad.
    pub fullscreen_quad: Id<Mesh>,
    pub time: &'a FrameTime,
}

/// Named source of draw calls for a pass.
///
/// A generator pushes the meshes to draw, in order, with the pass program
/// already bound. Meshes that were destroyed or lack a vertex stream the
/// program reads are dropped by the executor.
pub trait Generator {
    fn generate(&mut self, cx: &GenerateCx<'_>, out: &mut Vec<Id<Mesh>>);
}

impl<F> Generator for F
where
    F: FnMut(&GenerateCx<'_>, &mut Vec<Id<Mesh>>),
{
    fn generate(&mut self, cx: &GenerateCx<'_>, out: &mut Vec<Id<Mesh>>) {
        self(cx, out)
    }
}

/// Draws every visible scene instance.
#[derive(Debug, Default)]
pub struct SceneGenerator;

impl Generator for SceneGenerator {
    fn generate(&mut self, cx: &GenerateCx<'_>, out: &mut Vec<Id<Mesh>>) {
        out.extend(cx.scene.draw_order().map(|inst| inst.mesh));
    }
}

/// Draws the full-screen quad once.
#[derive(Debug, Default)]
pub struct FullscreenGenerator;

impl Generator for FullscreenGenerator {
    fn generate(&mut self, cx: &GenerateCx<'_>, out: &mut Vec<Id<Mesh>>) {
        out.push(cx.fullscreen_quad);
    }
}
