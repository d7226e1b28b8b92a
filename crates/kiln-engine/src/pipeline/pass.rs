use crate::coords::{ColorRgba, Viewport};
use crate::driver::RasterState;

/// Declarative description of one render pass.
///
/// Every flag defaults to `false`. A pass is copied into a pipeline on
/// append; editing it afterwards does not affect the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    /// Render target name.
    pub target: String,
    /// Program name or mode alias to draw with.
    pub mode: String,
    /// Generator name.
    pub generator: String,
    /// `None` covers the whole target.
    pub viewport: Option<Viewport>,
    pub clear: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_back_face: bool,
    pub blend: bool,
    pub clear_color: ColorRgba,
    /// Texture names bound to the program's texture slots, in slot order.
    pub inputs: Vec<String>,
    /// Debug label; the generator name when unset.
    pub label: Option<String>,
}

impl RenderPass {
    pub fn new(
        target: impl Into<String>,
        mode: impl Into<String>,
        generator: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            mode: mode.into(),
            generator: generator.into(),
            viewport: None,
            clear: false,
            depth_test: false,
            depth_write: false,
            cull_back_face: false,
            blend: false,
            clear_color: ColorRgba::black(),
            inputs: Vec::new(),
            label: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Enables clearing to `color`.
    pub fn with_clear(mut self, color: ColorRgba) -> Self {
        self.clear = true;
        self.clear_color = color;
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    pub fn with_cull_back_face(mut self, cull: bool) -> Self {
        self.cull_back_face = cull;
        self
    }

    pub fn with_blend(mut self, blend: bool) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[inline]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.generator)
    }

    #[inline]
    pub fn raster_state(&self) -> RasterState {
        RasterState {
            depth_test: self.depth_test,
            depth_write: self.depth_write,
            cull_back_face: self.cull_back_face,
            blend: self.blend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_to_false() {
        let p = RenderPass::new("fbo", "normal", "scene");
        assert_eq!(p.raster_state(), RasterState::default());
        assert!(!p.clear);
        assert!(p.viewport.is_none());
        assert_eq!(p.label(), "scene");
    }

    #[test]
    fn builders_set_fields() {
        let p = RenderPass::new("default", "fullscreen", "fullscreen")
            .with_clear(ColorRgba::new(0.1, 0.2, 0.3, 1.0))
            .with_depth(true, false)
            .with_inputs(["color"])
            .with_label("blit");
        assert!(p.clear);
        assert!(p.depth_test && !p.depth_write);
        assert_eq!(p.inputs, ["color"]);
        assert_eq!(p.label(), "blit");
    }
}
