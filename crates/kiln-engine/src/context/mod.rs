//! The render context: owner of every named resource and the entry point
//! for frame execution.
//!
//! All mutation goes through `&mut RenderContext`, so there is exactly one
//! writer. Passes refer to resources by name, which keeps destroy-then-render
//! a reported skip rather than a dangling reference.

mod builtin;
mod config;
mod execute;

pub use builtin::{DEFAULT_TARGET, FULLSCREEN_PROGRAM};
pub use config::ContextConfig;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::coords::Extent;
use crate::driver::{Driver, TextureHandle};
use crate::error::{Error, ResourceKind, Result};
use crate::mesh::{Mesh, MeshData};
use crate::resource::{Id, Registry};
use crate::scene::{
    FULLSCREEN_GENERATOR, FullscreenGenerator, Generator, SCENE_GENERATOR, Scene, SceneGenerator,
};
use crate::shader::{Program, ShaderStage, VertexSemantic};
use crate::target::{Attachment, InternalFormat, RenderTarget, TargetSizing, Texture, TextureSource};
use crate::time::FrameClock;

/// Owns programs, textures, targets, meshes and generators for one driver.
pub struct RenderContext<D: Driver> {
    driver: D,
    window_size: Extent,

    programs: Registry<Program>,
    textures: Registry<Texture>,
    targets: Registry<RenderTarget>,
    meshes: Registry<Mesh>,
    generators: Registry<Box<dyn Generator>>,

    /// Mode alias → program name.
    modes: HashMap<String, String>,
    /// Bumped whenever mode resolution may change.
    mode_epoch: u64,

    scene: Scene,
    clock: FrameClock,
    fullscreen_quad: Id<Mesh>,

    /// (mesh, program) pairs already reported as incompatible.
    warned_streams: HashSet<(Id<Mesh>, Id<Program>)>,
    draw_scratch: Vec<Id<Mesh>>,
}

impl<D: Driver> RenderContext<D> {
    /// Creates a context with its built-in generators, blit program,
    /// full-screen quad and (if configured) the default target.
    pub fn new(driver: D, config: ContextConfig) -> Result<Self> {
        if config.window_size.is_empty() {
            return Err(Error::InvalidSize {
                width: config.window_size.width,
                height: config.window_size.height,
            });
        }

        let mut driver = driver;
        let mut meshes = Registry::new(ResourceKind::Mesh);
        let quad = Mesh::upload(builtin::FULLSCREEN_QUAD, &MeshData::fullscreen_quad(), &mut driver)?;
        let fullscreen_quad = meshes.insert(builtin::FULLSCREEN_QUAD, quad)?;

        let mut ctx = Self {
            driver,
            window_size: config.window_size,
            programs: Registry::new(ResourceKind::Program),
            textures: Registry::new(ResourceKind::Texture),
            targets: Registry::new(ResourceKind::Target),
            meshes,
            generators: Registry::new(ResourceKind::Generator),
            modes: HashMap::new(),
            mode_epoch: 0,
            scene: Scene::new(),
            clock: FrameClock::new(),
            fullscreen_quad,
            warned_streams: HashSet::new(),
            draw_scratch: Vec::new(),
        };

        ctx.register_generator(SCENE_GENERATOR, Box::new(SceneGenerator))?;
        ctx.register_generator(FULLSCREEN_GENERATOR, Box::new(FullscreenGenerator))?;

        ctx.create_program(FULLSCREEN_PROGRAM)?;
        {
            let blit = ctx.program_mut(FULLSCREEN_PROGRAM)?;
            blit.set_attribute("position", VertexSemantic::Position)?;
            blit.set_attribute("uv", VertexSemantic::TexCoord)?;
            blit.set_shader_source(ShaderStage::Vertex, builtin::BLIT_VS);
            blit.set_shader_source(ShaderStage::Pixel, builtin::BLIT_FS);
        }
        ctx.stage_program(FULLSCREEN_PROGRAM)?;
        ctx.link_program(FULLSCREEN_PROGRAM)?;

        if config.create_default_target {
            ctx.create_window_framebuffer(DEFAULT_TARGET, 1.0)?;
            ctx.add_target(DEFAULT_TARGET, config.default_color_format)?;
            if let Some(depth) = config.default_depth_format {
                ctx.add_target(DEFAULT_TARGET, depth)?;
            }
        }

        log::debug!(
            "render context ready on `{}` driver, window {}",
            ctx.driver.name(),
            ctx.window_size
        );
        Ok(ctx)
    }

    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[inline]
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    #[inline]
    pub fn window_size(&self) -> Extent {
        self.window_size
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[inline]
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    // ── programs ──────────────────────────────────────────────────────────

    pub fn create_program(&mut self, name: &str) -> Result<Id<Program>> {
        let id = self.programs.insert(name, Program::new(name))?;
        self.mode_epoch += 1;
        log::debug!("program `{}` created", name);
        Ok(id)
    }

    #[inline]
    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.lookup(name).and_then(|id| self.programs.get(id))
    }

    /// Mutable access for `set_attribute` / `set_shader_source`.
    pub fn program_mut(&mut self, name: &str) -> Result<&mut Program> {
        let id = self.programs.require(name)?;
        self.programs
            .get_mut(id)
            .ok_or_else(|| Error::not_found(ResourceKind::Program, name))
    }

    /// Compiles every stage of `name`.
    pub fn stage_program(&mut self, name: &str) -> Result<()> {
        let id = self.programs.require(name)?;
        match self.programs.get_mut(id) {
            Some(p) => p.stage(&mut self.driver),
            None => Err(Error::not_found(ResourceKind::Program, name)),
        }
    }

    /// Links the compiled stages of `name`.
    pub fn link_program(&mut self, name: &str) -> Result<()> {
        let id = self.programs.require(name)?;
        match self.programs.get_mut(id) {
            Some(p) => p.link(&mut self.driver),
            None => Err(Error::not_found(ResourceKind::Program, name)),
        }
    }

    /// Compiles and links `name`; `Ok(true)` iff it is linked afterwards.
    ///
    /// Compile and link failures are `Ok(false)`; see [`Program::info_log`].
    pub fn complete_program(&mut self, name: &str) -> Result<bool> {
        let id = self.programs.require(name)?;
        match self.programs.get_mut(id) {
            Some(p) => Ok(p.complete(&mut self.driver)),
            None => Err(Error::not_found(ResourceKind::Program, name)),
        }
    }

    pub fn destroy_program(&mut self, name: &str) -> Result<()> {
        let (_, mut program) = self
            .programs
            .remove_by_name(name)
            .ok_or_else(|| Error::not_found(ResourceKind::Program, name))?;
        program.release(&mut self.driver);
        self.mode_epoch += 1;
        log::debug!("program `{}` destroyed", name);
        Ok(())
    }

    /// Makes passes with mode `mode` draw with program `program`.
    ///
    /// A program registered under `mode` itself still takes precedence.
    pub fn set_mode(&mut self, mode: impl Into<String>, program: impl Into<String>) {
        self.modes.insert(mode.into(), program.into());
        self.mode_epoch += 1;
    }

    pub fn clear_mode(&mut self, mode: &str) {
        if self.modes.remove(mode).is_some() {
            self.mode_epoch += 1;
        }
    }

    /// Program a mode resolves to: the program named `mode`, else the alias target.
    pub fn resolve_mode(&self, mode: &str) -> Option<Id<Program>> {
        self.programs.lookup(mode).or_else(|| {
            self.modes
                .get(mode)
                .and_then(|program| self.programs.lookup(program))
        })
    }

    // ── textures ──────────────────────────────────────────────────────────

    pub fn create_texture(&mut self, name: &str, source: TextureSource) -> Result<Id<Texture>> {
        if self.textures.lookup(name).is_some() {
            return Err(Error::DuplicateName {
                kind: ResourceKind::Texture,
                name: name.to_string(),
            });
        }
        match &source {
            TextureSource::Pixels { extent, data } => {
                self.check_extent(*extent)?;
                let expected = extent.width as usize * extent.height as usize * 4;
                if data.len() != expected {
                    return Err(Error::InvalidTexture {
                        texture: name.to_string(),
                        reason: format!(
                            "{} RGBA8 pixels need {} bytes, got {}",
                            extent,
                            expected,
                            data.len()
                        ),
                    });
                }
            }
            TextureSource::RenderTarget {
                extent: Some(extent),
                ..
            } => self.check_extent(*extent)?,
            TextureSource::RenderTarget { extent: None, .. } => {}
        }

        let texture = Texture::create(name, source, &mut self.driver);
        log::debug!("texture `{}` created ({})", name, texture.format());
        self.textures.insert(name, texture)
    }

    /// Decodes an image file into an RGBA8 texture.
    pub fn create_texture_from_path(&mut self, name: &str, path: impl AsRef<Path>) -> Result<Id<Texture>> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|source| Error::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let extent = Extent::new(image.width(), image.height());
        self.create_texture(
            name,
            TextureSource::Pixels {
                extent,
                data: image.into_raw(),
            },
        )
    }

    #[inline]
    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.textures.lookup(name).and_then(|id| self.textures.get(id))
    }

    /// Releases a texture. Targets it was attached to become incomplete.
    pub fn destroy_texture(&mut self, name: &str) -> Result<()> {
        let (_, mut texture) = self
            .textures
            .remove_by_name(name)
            .ok_or_else(|| Error::not_found(ResourceKind::Texture, name))?;
        texture.release(&mut self.driver);
        log::debug!("texture `{}` destroyed", name);
        Ok(())
    }

    // ── render targets ────────────────────────────────────────────────────

    /// Creates an empty, explicitly sized target.
    pub fn create_framebuffer(&mut self, name: &str) -> Result<Id<RenderTarget>> {
        let id = self.targets.insert(name, RenderTarget::new(TargetSizing::Explicit))?;
        log::debug!("render target `{}` created", name);
        Ok(id)
    }

    /// Creates a target that tracks the window size times `scale`.
    pub fn create_window_framebuffer(&mut self, name: &str, scale: f32) -> Result<Id<RenderTarget>> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidAttachment {
                target: name.to_string(),
                reason: format!("window scale must be positive, got {}", scale),
            });
        }
        let extent = self.window_size.scaled(scale);
        self.check_extent(extent)?;

        let id = self
            .targets
            .insert(name, RenderTarget::new(TargetSizing::Window { scale }))?;
        if let Some(target) = self.targets.get_mut(id) {
            target.resize(name, extent, &mut self.textures, &mut self.driver)?;
        }
        log::debug!("render target `{}` created (window x{})", name, scale);
        Ok(id)
    }

    #[inline]
    pub fn framebuffer(&self, name: &str) -> Option<&RenderTarget> {
        self.targets.lookup(name).and_then(|id| self.targets.get(id))
    }

    /// Attaches texture `texture` to target `target`.
    pub fn add_target_texture(&mut self, target: &str, texture: &str) -> Result<()> {
        let tid = self.targets.require(target)?;
        let xid = self.textures.require(texture)?;
        let owner = self
            .targets
            .iter()
            .find(|(id, _, t)| *id != tid && t.uses_texture(xid))
            .map(|(_, name, _)| name.to_string());
        if let Some(owner) = owner {
            return Err(Error::InvalidAttachment {
                target: target.to_string(),
                reason: format!("texture `{}` is already attached to `{}`", texture, owner),
            });
        }
        match self.targets.get_mut(tid) {
            Some(t) => t.add_texture(target, xid, &mut self.textures, &mut self.driver),
            None => Err(Error::not_found(ResourceKind::Target, target)),
        }
    }

    /// Attaches a target-owned buffer of `format`.
    pub fn add_target(&mut self, target: &str, format: InternalFormat) -> Result<()> {
        let tid = self.targets.require(target)?;
        match self.targets.get_mut(tid) {
            Some(t) => t.add_buffer(target, format, &mut self.driver),
            None => Err(Error::not_found(ResourceKind::Target, target)),
        }
    }

    /// Reallocates every attachment of `target` at `width` x `height`.
    pub fn resize_framebuffer(&mut self, target: &str, width: u32, height: u32) -> Result<()> {
        let tid = self.targets.require(target)?;
        match self.targets.get_mut(tid) {
            Some(t) => t.resize(
                target,
                Extent::new(width, height),
                &mut self.textures,
                &mut self.driver,
            ),
            None => Err(Error::not_found(ResourceKind::Target, target)),
        }
    }

    /// Releases a target and its owned buffers. Attached textures survive.
    pub fn destroy_framebuffer(&mut self, name: &str) -> Result<()> {
        let (_, mut target) = self
            .targets
            .remove_by_name(name)
            .ok_or_else(|| Error::not_found(ResourceKind::Target, name))?;
        target.release(&mut self.driver);
        log::debug!("render target `{}` destroyed", name);
        Ok(())
    }

    /// Current size of each attachment of `target`, colours first.
    ///
    /// `None` marks an attachment without storage.
    pub fn attachment_extents(&self, target: &str) -> Result<Vec<Option<Extent>>> {
        let t = self
            .framebuffer(target)
            .ok_or_else(|| Error::not_found(ResourceKind::Target, target))?;
        Ok(t.attachments()
            .map(|a| match a {
                Attachment::Texture(id) => self.textures.get(*id).and_then(Texture::extent),
                Attachment::Buffer { handle, .. } => handle.and(t.extent()),
            })
            .collect())
    }

    /// Driver storage of colour attachment `index` of `target`.
    pub fn color_attachment_handle(&self, target: &str, index: usize) -> Option<TextureHandle> {
        match self.framebuffer(target)?.colors().get(index)? {
            Attachment::Texture(id) => self.textures.get(*id)?.handle(),
            Attachment::Buffer { handle, .. } => *handle,
        }
    }

    /// Resizes every window-sized target to `width * scale` x `height * scale`.
    pub fn resize_window(&mut self, width: u32, height: u32) -> Result<()> {
        let size = Extent::new(width, height);
        self.check_extent(size)?;
        if size == self.window_size {
            return Ok(());
        }

        let window_targets: Vec<(Id<RenderTarget>, String, Extent)> = self
            .targets
            .iter()
            .filter_map(|(id, name, t)| match t.sizing() {
                TargetSizing::Window { scale } => Some((id, name.to_string(), size.scaled(scale))),
                TargetSizing::Explicit => None,
            })
            .collect();
        // Nothing is resized unless every window target fits.
        for (_, _, scaled) in &window_targets {
            self.check_extent(*scaled)?;
        }
        self.window_size = size;

        for (id, name, scaled) in window_targets {
            if let Some(t) = self.targets.get_mut(id) {
                t.resize(&name, scaled, &mut self.textures, &mut self.driver)?;
            }
        }
        log::debug!("window resized to {}", size);
        Ok(())
    }

    // ── meshes and generators ─────────────────────────────────────────────

    pub fn create_mesh(&mut self, name: &str, data: &MeshData) -> Result<Id<Mesh>> {
        if self.meshes.lookup(name).is_some() {
            return Err(Error::DuplicateName {
                kind: ResourceKind::Mesh,
                name: name.to_string(),
            });
        }
        let mesh = Mesh::upload(name, data, &mut self.driver)?;
        self.meshes.insert(name, mesh)
    }

    #[inline]
    pub fn mesh(&self, name: &str) -> Option<&Mesh> {
        self.meshes.lookup(name).and_then(|id| self.meshes.get(id))
    }

    #[inline]
    pub fn mesh_id(&self, name: &str) -> Option<Id<Mesh>> {
        self.meshes.lookup(name)
    }

    /// Releases a mesh and removes its scene instances.
    pub fn destroy_mesh(&mut self, name: &str) -> Result<()> {
        let id = self.meshes.require(name)?;
        if id == self.fullscreen_quad {
            return Err(Error::InvalidMesh {
                mesh: name.to_string(),
                reason: "the built-in quad cannot be destroyed".to_string(),
            });
        }
        if let Some((_, mut mesh)) = self.meshes.remove(id) {
            mesh.release(&mut self.driver);
        }
        self.scene.remove_mesh(id);
        self.warned_streams.retain(|(m, _)| *m != id);
        log::debug!("mesh `{}` destroyed", name);
        Ok(())
    }

    pub fn register_generator(
        &mut self,
        name: &str,
        generator: Box<dyn Generator>,
    ) -> Result<Id<Box<dyn Generator>>> {
        self.generators.insert(name, generator)
    }

    fn check_extent(&self, extent: Extent) -> Result<()> {
        let max = self.driver.max_texture_dimension();
        if extent.is_empty() || extent.width > max || extent.height > max {
            return Err(Error::InvalidSize {
                width: extent.width,
                height: extent.height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
