use crate::coords::{Extent, Viewport};
use crate::driver::{AttachmentView, DrawCall, Driver, FrameUniforms, PassSubmission};
use crate::error::{Error, ResourceKind, Result};
use crate::pipeline::{FrameReport, PassOutcome, RenderPass, RenderPipeline, ResolvedIds};
use crate::scene::GenerateCx;
use crate::target::{Attachment, RenderTarget};
use crate::time::FrameTime;

use super::RenderContext;

impl<D: Driver> RenderContext<D> {
    /// Advances one frame: runs every pass of `pipeline` once, in append order.
    ///
    /// A pass that cannot be resolved or executed is skipped and reported;
    /// the remaining passes still run.
    pub fn render_frame(&mut self, pipeline: &mut RenderPipeline) -> FrameReport {
        let time = self.clock.tick();
        self.scene.prepare();
        self.driver.begin_frame(&time);

        let mut outcomes = Vec::with_capacity(pipeline.len());
        for (index, slot) in pipeline.slots_mut().iter_mut().enumerate() {
            let result = self
                .resolve(index, &slot.pass, slot.cache.as_ref())
                .and_then(|ids| {
                    let draws = self.execute(index, &slot.pass, &ids, &time);
                    slot.cache = Some(ids);
                    draws
                });

            match result {
                Ok(draws) => {
                    if slot.last_error.take().is_some() {
                        log::info!("pass {} (`{}`) recovered", index, slot.pass.label());
                    }
                    outcomes.push(PassOutcome::Executed { draws });
                }
                Err(err) => {
                    let msg = err.to_string();
                    if slot.last_error.as_deref() == Some(msg.as_str()) {
                        log::debug!("skipping pass {} (`{}`): {}", index, slot.pass.label(), msg);
                    } else {
                        log::warn!("skipping pass {} (`{}`): {}", index, slot.pass.label(), msg);
                        slot.last_error = Some(msg);
                    }
                    outcomes.push(PassOutcome::Skipped(err));
                }
            }
        }

        self.driver.end_frame();
        FrameReport { time, outcomes }
    }

    fn cache_is_valid(&self, ids: &ResolvedIds) -> bool {
        ids.epoch == self.mode_epoch
            && self.targets.contains(ids.target)
            && self.programs.contains(ids.program)
            && self.generators.contains(ids.generator)
            && ids.inputs.iter().all(|&t| self.textures.contains(t))
    }

    /// Name lookup for every reference of `pass`, reusing `cached` while its
    /// ids are still live.
    fn resolve(&self, index: usize, pass: &RenderPass, cached: Option<&ResolvedIds>) -> Result<ResolvedIds> {
        if let Some(ids) = cached {
            if self.cache_is_valid(ids) {
                return Ok(ids.clone());
            }
            log::trace!("pass {}: cached resolution is stale", index);
        }

        let target = self
            .targets
            .lookup(&pass.target)
            .ok_or_else(|| Error::unresolved(index, ResourceKind::Target, &pass.target))?;
        let program = self
            .resolve_mode(&pass.mode)
            .ok_or_else(|| Error::unresolved(index, ResourceKind::Program, &pass.mode))?;
        let generator = self
            .generators
            .lookup(&pass.generator)
            .ok_or_else(|| Error::unresolved(index, ResourceKind::Generator, &pass.generator))?;
        let inputs = pass
            .inputs
            .iter()
            .map(|name| {
                self.textures
                    .lookup(name)
                    .ok_or_else(|| Error::unresolved(index, ResourceKind::Texture, name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedIds {
            target,
            program,
            generator,
            inputs,
            epoch: self.mode_epoch,
        })
    }

    fn attachment_view(&self, target_name: &str, extent: Extent, attachment: &Attachment) -> Result<AttachmentView> {
        let incomplete = |reason| Error::IncompleteTarget {
            target: target_name.to_string(),
            reason,
        };
        match attachment {
            Attachment::Texture(id) => {
                let tex = self
                    .textures
                    .get(*id)
                    .ok_or_else(|| incomplete("attached texture was destroyed"))?;
                if tex.extent() != Some(extent) {
                    return Err(incomplete("attached texture size differs from the target"));
                }
                let texture = tex
                    .handle()
                    .ok_or_else(|| incomplete("attached texture has no storage"))?;
                Ok(AttachmentView {
                    texture,
                    format: tex.format(),
                })
            }
            Attachment::Buffer { format, handle } => Ok(AttachmentView {
                texture: handle.ok_or_else(|| incomplete("attachment buffer has no storage"))?,
                format: *format,
            }),
        }
    }

    fn execute(&mut self, index: usize, pass: &RenderPass, ids: &ResolvedIds, time: &FrameTime) -> Result<usize> {
        let target: &RenderTarget = self
            .targets
            .get(ids.target)
            .ok_or_else(|| Error::unresolved(index, ResourceKind::Target, &pass.target))?;
        let extent = target.check_complete().map_err(|reason| Error::IncompleteTarget {
            target: pass.target.clone(),
            reason,
        })?;
        let colors = target
            .colors()
            .iter()
            .map(|a| self.attachment_view(&pass.target, extent, a))
            .collect::<Result<Vec<_>>>()?;
        let depth = target
            .depth()
            .map(|a| self.attachment_view(&pass.target, extent, a))
            .transpose()?;

        let program = self
            .programs
            .get(ids.program)
            .ok_or_else(|| Error::unresolved(index, ResourceKind::Program, &pass.mode))?;
        let (Some(program_handle), Some(interface)) = (program.handle(), program.interface()) else {
            return Err(Error::IncompleteProgram {
                pass: index,
                program: program.name().to_string(),
            });
        };

        let invalid = |reason: String| Error::InvalidPass { pass: index, reason };
        let slots = interface.texture_slots as usize;
        if ids.inputs.len() < slots {
            return Err(invalid(format!(
                "program `{}` samples {} texture(s), pass provides {}",
                program.name(),
                slots,
                ids.inputs.len()
            )));
        }
        if ids.inputs.len() > slots {
            log::trace!("pass {}: {} unused input(s)", index, ids.inputs.len() - slots);
        }
        let mut inputs = Vec::with_capacity(slots);
        for (name, &id) in pass.inputs.iter().zip(&ids.inputs).take(slots) {
            if target.uses_texture(id) {
                return Err(invalid(format!(
                    "input `{}` is also an attachment of `{}`",
                    name, pass.target
                )));
            }
            let tex = self
                .textures
                .get(id)
                .ok_or_else(|| Error::unresolved(index, ResourceKind::Texture, name))?;
            if !tex.format().is_filterable() {
                return Err(invalid(format!(
                    "input `{}` ({}) cannot be sampled with filtering",
                    name,
                    tex.format()
                )));
            }
            let handle = tex
                .handle()
                .ok_or_else(|| invalid(format!("input `{}` has no storage", name)))?;
            inputs.push(handle);
        }

        if interface.color_outputs as usize > colors.len() {
            return Err(invalid(format!(
                "program `{}` writes {} colour output(s), `{}` has {} colour attachment(s)",
                program.name(),
                interface.color_outputs,
                pass.target,
                colors.len()
            )));
        }

        let viewport = pass
            .viewport
            .unwrap_or_else(|| Viewport::full(extent))
            .clamped_to(extent);

        let mut meshes = std::mem::take(&mut self.draw_scratch);
        meshes.clear();
        if !viewport.is_empty() {
            if let Some(generator) = self.generators.get_mut(ids.generator) {
                let cx = GenerateCx {
                    pass: index,
                    scene: &self.scene,
                    fullscreen_quad: self.fullscreen_quad,
                    time,
                };
                generator.generate(&cx, &mut meshes);
            }
        }

        let mut draws = Vec::with_capacity(meshes.len());
        for &mesh_id in &meshes {
            let Some(mesh) = self.meshes.get(mesh_id) else {
                log::trace!("pass {}: skipping destroyed mesh {:?}", index, mesh_id);
                continue;
            };
            let Some(handle) = mesh.handle() else { continue };
            if let Some(missing) = interface.semantics().find(|&s| !mesh.has_semantic(s)) {
                if self.warned_streams.insert((mesh_id, ids.program)) {
                    log::warn!(
                        "mesh `{}` has no {} stream required by program `{}`; not drawn",
                        self.meshes.name(mesh_id).unwrap_or("?"),
                        missing,
                        program.name()
                    );
                }
                continue;
            }
            draws.push(DrawCall {
                mesh: handle,
                count: mesh.element_count(),
                indexed: mesh.is_indexed(),
            });
        }
        self.draw_scratch = meshes;

        let submission = PassSubmission {
            index,
            label: pass.label(),
            target: &pass.target,
            extent,
            colors: &colors,
            depth,
            viewport,
            clear: pass.clear.then_some(pass.clear_color),
            raster: pass.raster_state(),
            program: program_handle,
            interface,
            inputs: &inputs,
            uniforms: FrameUniforms::new(viewport, time),
            draws: &draws,
        };
        self.driver
            .execute_pass(&submission)
            .map_err(|reason| Error::InvalidPass { pass: index, reason })?;

        Ok(draws.len())
    }
}
