use std::collections::BTreeMap;

use crate::driver::{Driver, LinkedProgram, ProgramHandle, ShaderHandle};
use crate::error::{Error, Result};

use super::{ProgramInterface, ShaderStage, VertexSemantic};

/// Attribute name → vertex semantic. Names are unique.
pub type AttributeBindings = BTreeMap<String, VertexSemantic>;

/// Program lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProgramState {
    /// No source set yet.
    Empty,
    /// At least one source set; not linked.
    SourcesSet,
    Linked,
    /// The last `stage()`/`link()` attempt failed; see `info_log()`.
    Failed,
}

/// One stage's source text and compile result.
#[derive(Debug)]
pub struct ShaderUnit {
    stage: ShaderStage,
    source: String,
    compiled: Option<ShaderHandle>,
    log: String,
}

impl ShaderUnit {
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Driver diagnostic from the last compile attempt; empty on success.
    #[inline]
    pub fn compile_log(&self) -> &str {
        &self.log
    }
}

/// Shader program: per-stage sources, attribute bindings and link state.
///
/// Driver objects are released lazily: editing a compiled program queues the
/// stale handles, which are handed back to the driver on the next
/// `stage()`/`link()` call or when the program is destroyed.
#[derive(Debug)]
pub struct Program {
    name: String,
    attributes: AttributeBindings,
    units: BTreeMap<ShaderStage, ShaderUnit>,
    linked: Option<LinkedProgram>,
    state: ProgramState,
    link_log: String,
    /// Inputs changed since the last failed attempt.
    dirty: bool,
    stale_shaders: Vec<ShaderHandle>,
    stale_programs: Vec<ProgramHandle>,
}

impl Program {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: AttributeBindings::new(),
            units: BTreeMap::new(),
            linked: None,
            state: ProgramState::Empty,
            link_log: String::new(),
            dirty: true,
            stale_shaders: Vec::new(),
            stale_programs: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// `true` iff the program is linked.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state == ProgramState::Linked
    }

    #[inline]
    pub fn attributes(&self) -> &AttributeBindings {
        &self.attributes
    }

    #[inline]
    pub fn unit(&self, stage: ShaderStage) -> Option<&ShaderUnit> {
        self.units.get(&stage)
    }

    /// Reflected interface of the linked program.
    #[inline]
    pub fn interface(&self) -> Option<&ProgramInterface> {
        self.linked.as_ref().map(|l| &l.interface)
    }

    #[inline]
    pub(crate) fn handle(&self) -> Option<ProgramHandle> {
        self.linked.as_ref().map(|l| l.handle)
    }

    /// Compile logs of every stage followed by the link log.
    pub fn info_log(&self) -> String {
        let mut out = String::new();
        for unit in self.units.values() {
            if !unit.log.is_empty() {
                out.push_str(&format!("[{}] {}\n", unit.stage, unit.log.trim_end()));
            }
        }
        if !self.link_log.is_empty() {
            out.push_str(&format!("[link] {}\n", self.link_log.trim_end()));
        }
        out
    }

    /// Binds vertex input `name` to `semantic`.
    ///
    /// Rebinding a name to the same semantic is a no-op; rebinding it to a
    /// different one is rejected.
    pub fn set_attribute(&mut self, name: impl Into<String>, semantic: VertexSemantic) -> Result<()> {
        let name = name.into();
        match self.attributes.get(&name) {
            Some(&existing) if existing == semantic => Ok(()),
            Some(&existing) => Err(Error::DuplicateAttribute {
                name,
                existing,
                requested: semantic,
            }),
            None => {
                self.attributes.insert(name, semantic);
                self.invalidate_link();
                Ok(())
            }
        }
    }

    /// Stores `source` for `stage`. Nothing is compiled until `stage()`.
    pub fn set_shader_source(&mut self, stage: ShaderStage, source: impl Into<String>) {
        let source = source.into();
        if let Some(unit) = self.units.get(&stage) {
            if unit.source == source {
                return;
            }
        }

        if let Some(old) = self.units.insert(
            stage,
            ShaderUnit {
                stage,
                source,
                compiled: None,
                log: String::new(),
            },
        ) {
            self.stale_shaders.extend(old.compiled);
        }
        self.invalidate_link();
    }

    fn invalidate_link(&mut self) {
        if let Some(linked) = self.linked.take() {
            self.stale_programs.push(linked.handle);
        }
        self.link_log.clear();
        self.dirty = true;
        self.state = if self.units.is_empty() {
            ProgramState::Empty
        } else {
            ProgramState::SourcesSet
        };
    }

    fn release_stale<D: Driver>(&mut self, driver: &mut D) {
        for h in self.stale_programs.drain(..) {
            driver.release_program(h);
        }
        for h in self.stale_shaders.drain(..) {
            driver.release_shader(h);
        }
    }

    fn fail(&mut self, err: Error) -> Result<()> {
        log::warn!("{}", err);
        self.state = ProgramState::Failed;
        Err(err)
    }

    /// Compiles every stage that is not compiled yet.
    ///
    /// A required stage without source fails with a `Compile` error naming it.
    pub fn stage<D: Driver>(&mut self, driver: &mut D) -> Result<()> {
        self.release_stale(driver);
        if self.state == ProgramState::Linked {
            return Ok(());
        }

        let mut first_err = None;
        let mut missing = Vec::new();
        for stage in ShaderStage::REQUIRED {
            if !self.units.contains_key(&stage) {
                let log = format!("no {} shader source set", stage);
                missing.push(log.clone());
                first_err.get_or_insert(Error::Compile {
                    program: self.name.clone(),
                    stage,
                    log,
                });
            }
        }
        self.link_log = missing.join("\n");

        for unit in self.units.values_mut() {
            if unit.compiled.is_some() {
                continue;
            }
            match driver.compile_shader(unit.stage, &unit.source) {
                Ok(handle) => {
                    unit.compiled = Some(handle);
                    unit.log.clear();
                }
                Err(log) => {
                    unit.log = if log.trim().is_empty() {
                        format!("{} shader failed to compile", unit.stage)
                    } else {
                        log
                    };
                    first_err.get_or_insert(Error::Compile {
                        program: self.name.clone(),
                        stage: unit.stage,
                        log: unit.log.clone(),
                    });
                }
            }
        }

        match first_err {
            Some(err) => self.fail(err),
            None => Ok(()),
        }
    }

    /// Links the compiled stages with the current attribute bindings.
    pub fn link<D: Driver>(&mut self, driver: &mut D) -> Result<()> {
        self.release_stale(driver);
        if self.state == ProgramState::Linked {
            return Ok(());
        }

        let compiled = |stage| self.units.get(&stage).and_then(|u| u.compiled);
        let (Some(vertex), Some(pixel)) = (compiled(ShaderStage::Vertex), compiled(ShaderStage::Pixel))
        else {
            self.link_log = "vertex and pixel stages must be compiled before linking".to_string();
            let err = Error::Link {
                program: self.name.clone(),
                log: self.link_log.clone(),
            };
            return self.fail(err);
        };

        match driver.link_program(&self.name, vertex, pixel, &self.attributes) {
            Ok(linked) => {
                log::debug!(
                    "program `{}` linked ({} inputs, {} outputs)",
                    self.name,
                    linked.interface.vertex_inputs.len(),
                    linked.interface.color_outputs
                );
                self.linked = Some(linked);
                self.link_log.clear();
                self.state = ProgramState::Linked;
                Ok(())
            }
            Err(log) => {
                self.link_log = if log.trim().is_empty() {
                    "link failed".to_string()
                } else {
                    log
                };
                let err = Error::Link {
                    program: self.name.clone(),
                    log: self.link_log.clone(),
                };
                self.fail(err)
            }
        }
    }

    /// Compiles and links; `true` iff the program ends up linked.
    ///
    /// After a failure, calling again without changing sources or bindings
    /// returns `false` without touching the driver.
    pub fn complete<D: Driver>(&mut self, driver: &mut D) -> bool {
        match self.state {
            ProgramState::Linked => return true,
            ProgramState::Failed if !self.dirty => return false,
            _ => {}
        }
        self.dirty = false;
        self.stage(driver).and_then(|()| self.link(driver)).is_ok()
    }

    /// Hands every driver object back. The program returns to `SourcesSet`.
    pub(crate) fn release<D: Driver>(&mut self, driver: &mut D) {
        if let Some(linked) = self.linked.take() {
            self.stale_programs.push(linked.handle);
        }
        for unit in self.units.values_mut() {
            if let Some(h) = unit.compiled.take() {
                self.stale_shaders.push(h);
            }
        }
        self.release_stale(driver);
        self.invalidate_link();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;
    use crate::shader::reflect::tests::{FS, VS};

    fn program() -> Program {
        let mut p = Program::new("p1");
        p.set_attribute("position", VertexSemantic::Position).unwrap();
        p.set_attribute("uv", VertexSemantic::TexCoord).unwrap();
        p
    }

    #[test]
    fn complete_with_valid_sources() {
        let mut d = RecordingDriver::new();
        let mut p = program();
        assert_eq!(p.state(), ProgramState::Empty);
        p.set_shader_source(ShaderStage::Vertex, VS);
        p.set_shader_source(ShaderStage::Pixel, FS);
        assert_eq!(p.state(), ProgramState::SourcesSet);
        assert!(p.complete(&mut d));
        assert!(p.is_complete());
        assert!(p.info_log().is_empty());
        assert!(p.interface().is_some());
    }

    #[test]
    fn invalid_pixel_source_fails_with_log() {
        let mut d = RecordingDriver::new();
        let mut p = program();
        p.set_shader_source(ShaderStage::Vertex, VS);
        p.set_shader_source(ShaderStage::Pixel, FS);
        assert!(p.complete(&mut d));

        p.set_shader_source(ShaderStage::Pixel, "@fragment fn fs_main( -> {");
        assert!(!p.complete(&mut d));
        assert_eq!(p.state(), ProgramState::Failed);
        assert!(!p.info_log().is_empty());
        assert!(!p.unit(ShaderStage::Pixel).unwrap().compile_log().is_empty());
        assert!(p.handle().is_none());
    }

    #[test]
    fn complete_is_idempotent() {
        let mut d = RecordingDriver::new();
        let mut p = program();
        p.set_shader_source(ShaderStage::Vertex, VS);
        p.set_shader_source(ShaderStage::Pixel, FS);
        assert!(p.complete(&mut d));
        let compiles = d.stats().shaders_compiled;
        assert!(p.complete(&mut d));
        assert_eq!(d.stats().shaders_compiled, compiles);

        let mut bad = program();
        bad.set_shader_source(ShaderStage::Vertex, VS);
        bad.set_shader_source(ShaderStage::Pixel, "nope");
        assert!(!bad.complete(&mut d));
        let compiles = d.stats().shaders_compiled;
        assert!(!bad.complete(&mut d));
        assert_eq!(d.stats().shaders_compiled, compiles);
    }

    #[test]
    fn retry_after_fixing_source() {
        let mut d = RecordingDriver::new();
        let mut p = program();
        p.set_shader_source(ShaderStage::Vertex, VS);
        p.set_shader_source(ShaderStage::Pixel, "nope");
        assert!(!p.complete(&mut d));
        p.set_shader_source(ShaderStage::Pixel, FS);
        assert_eq!(p.state(), ProgramState::SourcesSet);
        assert!(p.complete(&mut d));
    }

    #[test]
    fn missing_stage_fails_descriptively() {
        let mut d = RecordingDriver::new();
        let mut p = program();
        p.set_shader_source(ShaderStage::Vertex, VS);
        assert!(!p.complete(&mut d));
        assert_eq!(p.state(), ProgramState::Failed);
        assert!(p.info_log().contains("no pixel shader source set"), "{}", p.info_log());
    }

    #[test]
    fn link_failure_is_recoverable() {
        let mut d = RecordingDriver::new();
        let mut p = Program::new("p2");
        p.set_attribute("position", VertexSemantic::Position).unwrap();
        p.set_shader_source(ShaderStage::Vertex, VS);
        p.set_shader_source(ShaderStage::Pixel, FS);

        assert!(p.stage(&mut d).is_ok());
        let err = p.link(&mut d).unwrap_err();
        assert!(matches!(err, Error::Link { .. }));
        assert!(p.info_log().contains("`uv`"));

        p.set_attribute("uv", VertexSemantic::TexCoord).unwrap();
        assert!(p.complete(&mut d));
    }

    #[test]
    fn link_before_stage_fails() {
        let mut d = RecordingDriver::new();
        let mut p = program();
        p.set_shader_source(ShaderStage::Vertex, VS);
        p.set_shader_source(ShaderStage::Pixel, FS);
        assert!(p.link(&mut d).is_err());
        assert_eq!(p.state(), ProgramState::Failed);
    }

    #[test]
    fn duplicate_attribute_rejected() {
        let mut p = program();
        assert!(p.set_attribute("uv", VertexSemantic::TexCoord).is_ok());
        let err = p.set_attribute("uv", VertexSemantic::Normal).unwrap_err();
        assert!(matches!(err, Error::DuplicateAttribute { .. }));
        assert_eq!(p.attributes()["uv"], VertexSemantic::TexCoord);
    }

    #[test]
    fn editing_linked_program_releases_driver_objects() {
        let mut d = RecordingDriver::new();
        let mut p = program();
        p.set_shader_source(ShaderStage::Vertex, VS);
        p.set_shader_source(ShaderStage::Pixel, FS);
        assert!(p.complete(&mut d));
        assert_eq!(d.stats().live_programs, 1);

        p.set_shader_source(ShaderStage::Vertex, VS.replace("1.0)", "1.00)"));
        assert_eq!(p.state(), ProgramState::SourcesSet);
        assert!(p.complete(&mut d));
        assert_eq!(d.stats().live_programs, 1);
        assert_eq!(d.stats().live_shaders, 2);
    }
}
