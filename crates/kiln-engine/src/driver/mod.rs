//! Graphics driver seam.
//!
//! The engine never talks to a graphics API directly. Everything that needs
//! one (compiling, linking, allocating storage, executing a pass) goes through
//! [`Driver`]. Two implementations ship:
//! - [`WgpuDriver`]: executes on a headless wgpu device
//! - [`RecordingDriver`]: records the commands a pass would issue
//!
//! Driver objects are referred to by opaque handles. Handles are never reused
//! by a driver instance.

mod recording;
mod shaders;
mod gpu;

pub use recording::{Command, DriverStats, FRAME_HISTORY, RecordedFrame, RecordingDriver};
pub use gpu::WgpuDriver;

pub(crate) use shaders::ShaderStore;

use bytemuck::{Pod, Zeroable};

use crate::coords::{ColorRgba, Extent, Viewport};
use crate::mesh::MeshData;
use crate::shader::{AttributeBindings, ProgramInterface, ShaderStage};
use crate::target::InternalFormat;
use crate::time::FrameTime;

macro_rules! driver_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

driver_handle!(
    /// A compiled shader stage.
    ShaderHandle
);
driver_handle!(
    /// A linked program.
    ProgramHandle
);
driver_handle!(
    /// Texture storage: a context texture or a target-owned buffer.
    TextureHandle
);
driver_handle!(
    /// Uploaded vertex and index buffers.
    MeshHandle
);

/// Monotonic handle source.
#[derive(Debug, Default)]
pub(crate) struct HandleAlloc {
    next: u64,
}

impl HandleAlloc {
    pub(crate) fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

/// Successful link result.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub handle: ProgramHandle,
    pub interface: ProgramInterface,
}

/// Texture storage request.
#[derive(Debug, Copy, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub extent: Extent,
    pub format: InternalFormat,
}

/// An attachment resolved for one pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AttachmentView {
    pub texture: TextureHandle,
    pub format: InternalFormat,
}

/// Fixed-function state of a pass.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct RasterState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_back_face: bool,
    /// Straight alpha blending over the existing contents.
    pub blend: bool,
}

/// One draw issued by a generator.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawCall {
    pub mesh: MeshHandle,
    /// Indices to draw for indexed meshes, vertices otherwise.
    pub count: u32,
    pub indexed: bool,
}

/// Uniform block bound at `@group(0) @binding(0)`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct FrameUniforms {
    /// Pass viewport as x, y, width, height.
    pub viewport: [f32; 4],
    /// Seconds since the context started.
    pub time: f32,
    pub frame: u32,
    pub _pad: [u32; 2],
}

impl FrameUniforms {
    pub fn new(viewport: Viewport, time: &FrameTime) -> Self {
        Self {
            viewport: viewport.to_array(),
            time: time.elapsed,
            frame: time.frame_index as u32,
            _pad: [0; 2],
        }
    }
}

/// Everything a driver needs to execute one resolved pass.
#[derive(Debug)]
pub struct PassSubmission<'a> {
    /// Position in the pipeline.
    pub index: usize,
    pub label: &'a str,
    pub target: &'a str,
    pub extent: Extent,
    pub colors: &'a [AttachmentView],
    pub depth: Option<AttachmentView>,
    /// Already clamped to `extent`.
    pub viewport: Viewport,
    pub clear: Option<ColorRgba>,
    pub raster: RasterState,
    pub program: ProgramHandle,
    pub interface: &'a ProgramInterface,
    /// Sampled textures, one per program texture slot.
    pub inputs: &'a [TextureHandle],
    pub uniforms: FrameUniforms,
    pub draws: &'a [DrawCall],
}

/// A graphics backend.
///
/// Compile and link report failures as diagnostic text; the engine wraps
/// them into its own error types. Storage creation is infallible once the
/// engine has validated sizes against [`Driver::max_texture_dimension`].
pub trait Driver {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Largest width or height a texture may have.
    fn max_texture_dimension(&self) -> u32;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String>;

    fn release_shader(&mut self, shader: ShaderHandle);

    fn link_program(
        &mut self,
        label: &str,
        vertex: ShaderHandle,
        pixel: ShaderHandle,
        attributes: &AttributeBindings,
    ) -> Result<LinkedProgram, String>;

    fn release_program(&mut self, program: ProgramHandle);

    /// Allocates storage. `pixels` are tightly packed rows in `desc.format`.
    fn create_texture(&mut self, desc: &TextureDesc<'_>, pixels: Option<&[u8]>) -> TextureHandle;

    fn release_texture(&mut self, texture: TextureHandle);

    /// Uploads validated mesh data.
    fn upload_mesh(&mut self, label: &str, data: &MeshData) -> MeshHandle;

    fn release_mesh(&mut self, mesh: MeshHandle);

    fn begin_frame(&mut self, _time: &FrameTime) {}

    /// Issues one pass. An `Err` means nothing was drawn for it.
    fn execute_pass(&mut self, pass: &PassSubmission<'_>) -> Result<(), String>;

    fn end_frame(&mut self) {}
}
