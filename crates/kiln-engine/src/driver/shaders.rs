use std::collections::HashMap;

use crate::shader::reflect::{self, CompiledStage};
use crate::shader::{AttributeBindings, ProgramInterface, ShaderStage};

use super::{HandleAlloc, LinkedProgram, ProgramHandle, ShaderHandle};

/// A validated stage kept alive until released.
#[derive(Debug)]
pub(crate) struct StageRecord {
    pub compiled: CompiledStage,
    pub source: String,
}

/// A linked program: the sources and entry points of both stages.
///
/// Programs copy what they need, so releasing a shader after linking leaves
/// the program usable.
#[derive(Debug)]
pub(crate) struct ProgramRecord {
    pub label: String,
    pub vertex_source: String,
    pub vertex_entry: String,
    pub pixel_source: String,
    pub pixel_entry: String,
    pub interface: ProgramInterface,
}

/// Compile/link bookkeeping shared by every driver.
#[derive(Debug, Default)]
pub(crate) struct ShaderStore {
    alloc: HandleAlloc,
    stages: HashMap<ShaderHandle, StageRecord>,
    programs: HashMap<ProgramHandle, ProgramRecord>,
}

impl ShaderStore {
    pub(crate) fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        let compiled = reflect::compile(stage, source)?;
        let handle = ShaderHandle::from_raw(self.alloc.next());
        self.stages.insert(
            handle,
            StageRecord {
                compiled,
                source: source.to_string(),
            },
        );
        Ok(handle)
    }

    pub(crate) fn release_shader(&mut self, handle: ShaderHandle) -> bool {
        self.stages.remove(&handle).is_some()
    }

    pub(crate) fn link(
        &mut self,
        label: &str,
        vertex: ShaderHandle,
        pixel: ShaderHandle,
        attributes: &AttributeBindings,
    ) -> Result<LinkedProgram, String> {
        let vs = self
            .stages
            .get(&vertex)
            .ok_or_else(|| format!("unknown vertex shader handle {}", vertex.raw()))?;
        let fs = self
            .stages
            .get(&pixel)
            .ok_or_else(|| format!("unknown pixel shader handle {}", pixel.raw()))?;

        let interface = reflect::link(&vs.compiled, &fs.compiled, attributes)?;
        let record = ProgramRecord {
            label: label.to_string(),
            vertex_source: vs.source.clone(),
            vertex_entry: vs.compiled.entry_point().to_string(),
            pixel_source: fs.source.clone(),
            pixel_entry: fs.compiled.entry_point().to_string(),
            interface: interface.clone(),
        };

        let handle = ProgramHandle::from_raw(self.alloc.next());
        self.programs.insert(handle, record);
        Ok(LinkedProgram { handle, interface })
    }

    pub(crate) fn release_program(&mut self, handle: ProgramHandle) -> Option<ProgramRecord> {
        self.programs.remove(&handle)
    }

    #[inline]
    pub(crate) fn program(&self, handle: ProgramHandle) -> Option<&ProgramRecord> {
        self.programs.get(&handle)
    }

    #[inline]
    pub(crate) fn live_shaders(&self) -> usize {
        self.stages.len()
    }

    #[inline]
    pub(crate) fn live_programs(&self) -> usize {
        self.programs.len()
    }
}
