//! Resources every context starts with.

/// Target created from `ContextConfig`, sized with the window.
pub const DEFAULT_TARGET: &str = "default";

/// Reserved program name: copies pass input 0 onto the target.
pub const FULLSCREEN_PROGRAM: &str = "fullscreen";

/// Mesh registry name of the clip-space quad.
pub(crate) const FULLSCREEN_QUAD: &str = "fullscreen_quad";

pub(crate) const BLIT_VS: &str = r#"
struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.clip = vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}
"#;

pub(crate) const BLIT_FS: &str = r#"
@group(1) @binding(0) var src_tex: texture_2d<f32>;
@group(1) @binding(1) var src_smp: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(src_tex, src_smp, uv);
}
"#;
