use std::collections::HashMap;

use crate::coords::{ColorRgba, Extent, Viewport};
use crate::mesh::MeshData;
use crate::shader::{AttributeBindings, ShaderStage};
use crate::target::InternalFormat;
use crate::time::FrameTime;

use super::{
    DrawCall, Driver, FrameUniforms, HandleAlloc, LinkedProgram, MeshHandle, PassSubmission,
    ProgramHandle, RasterState, ShaderHandle, ShaderStore, TextureDesc, TextureHandle,
};

/// A command a pass would issue, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BindTarget {
        pass: usize,
        target: String,
        extent: Extent,
        colors: Vec<TextureHandle>,
        depth: Option<TextureHandle>,
    },
    Viewport(Viewport),
    Clear(ColorRgba),
    State(RasterState),
    Program {
        program: ProgramHandle,
        inputs: Vec<TextureHandle>,
        uniforms: FrameUniforms,
    },
    Draw(DrawCall),
}

/// Commands of one `begin_frame`/`end_frame` bracket.
#[derive(Debug, Clone, Default)]
pub struct RecordedFrame {
    pub frame_index: u64,
    pub commands: Vec<Command>,
}

impl RecordedFrame {
    /// Targets bound by the frame's passes, in execution order.
    pub fn bound_targets(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BindTarget { target, .. } => Some(target.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Pipeline indices of the executed passes.
    pub fn executed_passes(&self) -> Vec<usize> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BindTarget { pass, .. } => Some(*pass),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw(_)))
            .count()
    }
}

/// Counters over the driver's lifetime.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DriverStats {
    pub shaders_compiled: u64,
    pub programs_linked: u64,
    pub textures_created: u64,
    pub meshes_uploaded: u64,
    pub passes_executed: u64,
    pub live_shaders: usize,
    pub live_programs: usize,
    pub live_textures: usize,
    pub live_meshes: usize,
}

/// Completed frames kept by [`RecordingDriver`]; older ones are dropped.
pub const FRAME_HISTORY: usize = 16;

#[derive(Debug)]
struct TextureRecord {
    label: String,
    extent: Extent,
    format: InternalFormat,
}

/// CPU-only driver.
///
/// Compiles and links through the same `naga` front end as the GPU driver,
/// then records each pass as a list of [`Command`]s.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    shaders: ShaderStore,
    alloc: HandleAlloc,
    textures: HashMap<TextureHandle, TextureRecord>,
    meshes: HashMap<MeshHandle, String>,
    frames: Vec<RecordedFrame>,
    current: Option<RecordedFrame>,
    stats: DriverStats,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            live_shaders: self.shaders.live_shaders(),
            live_programs: self.shaders.live_programs(),
            live_textures: self.textures.len(),
            live_meshes: self.meshes.len(),
            ..self.stats
        }
    }

    /// The last [`FRAME_HISTORY`] completed frames, oldest first.
    #[inline]
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    #[inline]
    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.frames.last()
    }

    /// Extent of live texture storage.
    pub fn texture_extent(&self, texture: TextureHandle) -> Option<Extent> {
        self.textures.get(&texture).map(|t| t.extent)
    }

    fn record(&mut self, commands: impl IntoIterator<Item = Command>) {
        // Passes executed outside a frame bracket get a frame of their own.
        let frame = self.current.get_or_insert_with(RecordedFrame::default);
        frame.commands.extend(commands);
    }

    fn push_frame(&mut self, frame: RecordedFrame) {
        if self.frames.len() == FRAME_HISTORY {
            self.frames.remove(0);
        }
        self.frames.push(frame);
    }
}

impl Driver for RecordingDriver {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn max_texture_dimension(&self) -> u32 {
        wgpu::Limits::default().max_texture_dimension_2d
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        self.stats.shaders_compiled += 1;
        self.shaders.compile(stage, source)
    }

    fn release_shader(&mut self, shader: ShaderHandle) {
        if !self.shaders.release_shader(shader) {
            log::warn!("recording: release of unknown shader {}", shader.raw());
        }
    }

    fn link_program(
        &mut self,
        label: &str,
        vertex: ShaderHandle,
        pixel: ShaderHandle,
        attributes: &AttributeBindings,
    ) -> Result<LinkedProgram, String> {
        let linked = self.shaders.link(label, vertex, pixel, attributes)?;
        self.stats.programs_linked += 1;
        Ok(linked)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.shaders.release_program(program).is_none() {
            log::warn!("recording: release of unknown program {}", program.raw());
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>, _pixels: Option<&[u8]>) -> TextureHandle {
        let handle = TextureHandle::from_raw(self.alloc.next());
        self.textures.insert(
            handle,
            TextureRecord {
                label: desc.label.to_string(),
                extent: desc.extent,
                format: desc.format,
            },
        );
        self.stats.textures_created += 1;
        handle
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture) {
            Some(t) => log::trace!("recording: released {:?} texture `{}`", t.format, t.label),
            None => log::warn!("recording: release of unknown texture {}", texture.raw()),
        }
    }

    fn upload_mesh(&mut self, label: &str, _data: &MeshData) -> MeshHandle {
        let handle = MeshHandle::from_raw(self.alloc.next());
        self.meshes.insert(handle, label.to_string());
        self.stats.meshes_uploaded += 1;
        handle
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.remove(&mesh).is_none() {
            log::warn!("recording: release of unknown mesh {}", mesh.raw());
        }
    }

    fn begin_frame(&mut self, time: &FrameTime) {
        if let Some(open) = self.current.take() {
            self.push_frame(open);
        }
        self.current = Some(RecordedFrame {
            frame_index: time.frame_index,
            commands: Vec::new(),
        });
    }

    fn execute_pass(&mut self, pass: &PassSubmission<'_>) -> Result<(), String> {
        if self.shaders.program(pass.program).is_none() {
            return Err(format!("unknown program handle {}", pass.program.raw()));
        }
        let mut textures = pass
            .colors
            .iter()
            .chain(pass.depth.iter())
            .map(|a| a.texture)
            .chain(pass.inputs.iter().copied());
        if let Some(missing) = textures.find(|t| !self.textures.contains_key(t)) {
            return Err(format!("texture storage {} missing", missing.raw()));
        }
        self.stats.passes_executed += 1;

        let mut commands = vec![
            Command::BindTarget {
                pass: pass.index,
                target: pass.target.to_string(),
                extent: pass.extent,
                colors: pass.colors.iter().map(|a| a.texture).collect(),
                depth: pass.depth.map(|a| a.texture),
            },
            Command::Viewport(pass.viewport),
        ];
        if let Some(color) = pass.clear {
            commands.push(Command::Clear(color));
        }
        commands.push(Command::State(pass.raster));
        commands.push(Command::Program {
            program: pass.program,
            inputs: pass.inputs.to_vec(),
            uniforms: pass.uniforms,
        });
        commands.extend(pass.draws.iter().copied().map(Command::Draw));

        self.record(commands);
        Ok(())
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.current.take() {
            self.push_frame(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::AttachmentView;
    use crate::shader::reflect::tests::{FS, VS};
    use crate::shader::{ProgramInterface, VertexSemantic};
    use crate::time::FrameClock;

    fn linked_program(d: &mut RecordingDriver) -> ProgramHandle {
        let vs = d.compile_shader(ShaderStage::Vertex, VS).unwrap();
        let fs = d.compile_shader(ShaderStage::Pixel, FS).unwrap();
        let mut attrs = AttributeBindings::new();
        attrs.insert("position".into(), VertexSemantic::Position);
        attrs.insert("uv".into(), VertexSemantic::TexCoord);
        d.link_program("p", vs, fs, &attrs).unwrap().handle
    }

    #[test]
    fn compile_failure_is_counted_and_reported() {
        let mut d = RecordingDriver::new();
        assert!(d.compile_shader(ShaderStage::Vertex, VS).is_ok());
        let err = d.compile_shader(ShaderStage::Pixel, "fn (").unwrap_err();
        assert!(!err.is_empty());
        let s = d.stats();
        assert_eq!(s.shaders_compiled, 2);
        assert_eq!(s.live_shaders, 1);
    }

    #[test]
    fn program_survives_shader_release() {
        let mut d = RecordingDriver::new();
        let vs = d.compile_shader(ShaderStage::Vertex, VS).unwrap();
        let fs = d.compile_shader(ShaderStage::Pixel, FS).unwrap();
        let mut attrs = AttributeBindings::new();
        attrs.insert("position".into(), VertexSemantic::Position);
        attrs.insert("uv".into(), VertexSemantic::TexCoord);
        let linked = d.link_program("p", vs, fs, &attrs).unwrap();
        d.release_shader(vs);
        d.release_shader(fs);
        assert_eq!(d.stats().live_programs, 1);
        assert!(d.shaders.program(linked.handle).is_some());
    }

    #[test]
    fn pass_commands_in_issue_order() {
        let mut d = RecordingDriver::new();
        let mut clock = FrameClock::new();
        let extent = Extent::new(4, 4);
        let color = d.create_texture(
            &TextureDesc {
                label: "c",
                extent,
                format: InternalFormat::Rgba8,
            },
            None,
        );
        let mesh = d.upload_mesh("quad", &MeshData::fullscreen_quad());
        let program = linked_program(&mut d);
        let interface = ProgramInterface::default();
        let colors = [AttachmentView {
            texture: color,
            format: InternalFormat::Rgba8,
        }];
        let draws = [DrawCall {
            mesh,
            count: 6,
            indexed: true,
        }];
        let time = clock.tick();
        let viewport = Viewport::full(extent);

        d.begin_frame(&time);
        d.execute_pass(&PassSubmission {
            index: 0,
            label: "scene",
            target: "fbo",
            extent,
            colors: &colors,
            depth: None,
            viewport,
            clear: Some(ColorRgba::black()),
            raster: RasterState::default(),
            program,
            interface: &interface,
            inputs: &[],
            uniforms: FrameUniforms::new(viewport, &time),
            draws: &draws,
        })
        .unwrap();
        d.end_frame();

        let frame = d.last_frame().unwrap();
        let kinds: Vec<&str> = frame
            .commands
            .iter()
            .map(|c| match c {
                Command::BindTarget { .. } => "bind",
                Command::Viewport(_) => "viewport",
                Command::Clear(_) => "clear",
                Command::State(_) => "state",
                Command::Program { .. } => "program",
                Command::Draw(_) => "draw",
            })
            .collect();
        assert_eq!(kinds, ["bind", "viewport", "clear", "state", "program", "draw"]);
        assert_eq!(frame.bound_targets(), ["fbo"]);
        assert_eq!(d.stats().passes_executed, 1);
    }

    #[test]
    fn pass_with_missing_storage_records_nothing() {
        let mut d = RecordingDriver::new();
        let mut clock = FrameClock::new();
        let extent = Extent::new(4, 4);
        let program = linked_program(&mut d);
        let interface = ProgramInterface::default();
        let colors = [AttachmentView {
            texture: TextureHandle::from_raw(77),
            format: InternalFormat::Rgba8,
        }];
        let time = clock.tick();
        let viewport = Viewport::full(extent);
        let mut submission = PassSubmission {
            index: 0,
            label: "scene",
            target: "fbo",
            extent,
            colors: &colors,
            depth: None,
            viewport,
            clear: None,
            raster: RasterState::default(),
            program,
            interface: &interface,
            inputs: &[],
            uniforms: FrameUniforms::new(viewport, &time),
            draws: &[],
        };

        d.begin_frame(&time);
        let err = d.execute_pass(&submission).unwrap_err();
        assert!(err.contains("77"));
        submission.colors = &[];
        submission.program = ProgramHandle::from_raw(99);
        assert!(d.execute_pass(&submission).unwrap_err().contains("program"));
        d.end_frame();

        assert!(d.last_frame().unwrap().commands.is_empty());
        assert_eq!(d.stats().passes_executed, 0);
    }

    #[test]
    fn frame_history_keeps_the_newest_frames() {
        let mut d = RecordingDriver::new();
        let mut clock = FrameClock::new();
        for _ in 0..FRAME_HISTORY + 5 {
            let time = clock.tick();
            d.begin_frame(&time);
            d.end_frame();
        }
        assert_eq!(d.frames().len(), FRAME_HISTORY);
        assert_eq!(d.frames()[0].frame_index, 5);
        assert_eq!(d.last_frame().unwrap().frame_index, (FRAME_HISTORY + 4) as u64);
    }
}
