//! WGSL compilation and program interface reflection on top of `naga`.
//!
//! Both drivers compile through here, so diagnostics are identical whether a
//! program ends up on a GPU or in a recording.
//!
//! Resource binding convention for linked programs:
//! - `@group(0) @binding(0)`: `var<uniform>` frame uniforms (at most
//!   [`FRAME_UNIFORMS_SIZE`] bytes)
//! - `@group(1) @binding(2 * i)`: `texture_2d<f32>` for pass input `i`
//! - `@group(1) @binding(2 * i + 1)`: `sampler` for pass input `i`

use std::fmt;

use naga::{Binding, Module, TypeInner};

use super::{AttributeBindings, ShaderStage, VertexSemantic};

/// Byte size of the frame uniform block drivers bind at group 0, binding 0.
pub const FRAME_UNIFORMS_SIZE: u32 = 32;

/// A parsed and validated shader stage.
#[derive(Debug)]
pub struct CompiledStage {
    stage: ShaderStage,
    module: Module,
    entry_point: String,
}

impl CompiledStage {
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Name of the entry point this stage runs.
    #[inline]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn entry(&self) -> Option<&naga::EntryPoint> {
        let wanted = self.stage.naga_stage();
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.stage == wanted && ep.name == self.entry_point)
    }
}

/// Parses and validates `source` as a WGSL module for `stage`.
///
/// On failure the returned string is the human-readable diagnostic, with
/// source spans rendered the way `naga` prints them.
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledStage, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let entry_point = {
        let wanted = stage.naga_stage();
        let mut entries = module.entry_points.iter().filter(|ep| ep.stage == wanted);
        let first = entries
            .next()
            .ok_or_else(|| format!("no {} entry point in {} shader", stage.wgsl_attribute(), stage))?;
        if entries.next().is_some() {
            log::debug!(
                "{} shader declares several {} entry points; using `{}`",
                stage,
                stage.wgsl_attribute(),
                first.name
            );
        }
        first.name.clone()
    };

    Ok(CompiledStage {
        stage,
        module,
        entry_point,
    })
}

/// A vertex input resolved to the stream that feeds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub location: u32,
    pub name: String,
    pub semantic: VertexSemantic,
}

/// What a linked program consumes and produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramInterface {
    /// Sorted by location.
    pub vertex_inputs: Vec<VertexInput>,
    /// One past the highest `@location` the pixel stage writes.
    pub color_outputs: u32,
    pub uses_frame_uniforms: bool,
    /// Number of pass inputs (texture + sampler pairs) the program samples.
    pub texture_slots: u32,
}

impl ProgramInterface {
    pub fn semantics(&self) -> impl Iterator<Item = VertexSemantic> + '_ {
        self.vertex_inputs.iter().map(|v| v.semantic)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct IoType {
    scalar: naga::Scalar,
    components: u32,
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match (self.scalar.kind, self.scalar.width) {
            (naga::ScalarKind::Float, 2) => "f16",
            (naga::ScalarKind::Float, 8) => "f64",
            (naga::ScalarKind::Float, _) => "f32",
            (naga::ScalarKind::Sint, _) => "i32",
            (naga::ScalarKind::Uint, _) => "u32",
            (naga::ScalarKind::Bool, _) => "bool",
            _ => "abstract",
        };
        if self.components == 1 {
            f.write_str(s)
        } else {
            write!(f, "vec{}<{}>", self.components, s)
        }
    }
}

#[derive(Debug, Clone)]
struct Varying {
    location: u32,
    name: String,
    ty: IoType,
}

fn io_type(module: &Module, ty: naga::Handle<naga::Type>) -> Option<IoType> {
    match module.types[ty].inner {
        TypeInner::Scalar(scalar) => Some(IoType { scalar, components: 1 }),
        TypeInner::Vector { size, scalar } => Some(IoType {
            scalar,
            components: size as u32,
        }),
        _ => None,
    }
}

/// Flattens an argument or result (possibly a struct) into located varyings.
fn collect_located(
    module: &Module,
    binding: Option<&Binding>,
    name: Option<&str>,
    ty: naga::Handle<naga::Type>,
    out: &mut Vec<Varying>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            if let Some(ty) = io_type(module, ty) {
                out.push(Varying {
                    location: *location,
                    name: name.unwrap_or("").to_string(),
                    ty,
                });
            }
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { ref members, .. } = module.types[ty].inner {
                for m in members {
                    collect_located(module, m.binding.as_ref(), m.name.as_deref(), m.ty, out);
                }
            }
        }
    }
}

fn inputs_of(module: &Module, entry: &naga::EntryPoint) -> Vec<Varying> {
    let mut out = Vec::new();
    for arg in &entry.function.arguments {
        collect_located(module, arg.binding.as_ref(), arg.name.as_deref(), arg.ty, &mut out);
    }
    out.sort_by_key(|v| v.location);
    out
}

fn outputs_of(module: &Module, entry: &naga::EntryPoint) -> Vec<Varying> {
    let mut out = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_located(module, result.binding.as_ref(), None, result.ty, &mut out);
    }
    out.sort_by_key(|v| v.location);
    out
}

#[derive(Default)]
struct ResourceUsage {
    frame_uniforms: bool,
    texture_slots: u32,
}

fn is_sampled_2d(inner: &TypeInner) -> bool {
    matches!(
        inner,
        TypeInner::Image {
            dim: naga::ImageDimension::D2,
            arrayed: false,
            class: naga::ImageClass::Sampled {
                kind: naga::ScalarKind::Float,
                multi: false,
            },
        }
    )
}

fn check_resources(stage: &CompiledStage, usage: &mut ResourceUsage, errors: &mut Vec<String>) {
    let module = &stage.module;
    for (_, var) in module.global_variables.iter() {
        let Some(rb) = var.binding.as_ref() else { continue };
        let inner = &module.types[var.ty].inner;
        let name = var.name.as_deref().unwrap_or("<unnamed>");

        match (rb.group, rb.binding) {
            (0, 0) if var.space == naga::AddressSpace::Uniform => {
                let size = inner.size(module.to_ctx());
                if size > FRAME_UNIFORMS_SIZE {
                    errors.push(format!(
                        "{} shader: uniform `{}` is {} bytes, frame uniforms are {} bytes",
                        stage.stage, name, size, FRAME_UNIFORMS_SIZE
                    ));
                } else {
                    usage.frame_uniforms = true;
                }
            }
            (1, b) if b % 2 == 0 && is_sampled_2d(inner) => {
                usage.texture_slots = usage.texture_slots.max(b / 2 + 1);
            }
            (1, b) if b % 2 == 1 && matches!(inner, TypeInner::Sampler { comparison: false }) => {
                usage.texture_slots = usage.texture_slots.max(b / 2 + 1);
            }
            (g, b) => errors.push(format!(
                "{} shader: unsupported resource binding `{}` at @group({}) @binding({})",
                stage.stage, name, g, b
            )),
        }
    }
}

/// Checks that `vertex` and `pixel` form a valid program and reflects its interface.
///
/// All problems found are reported together, one per line.
pub fn link(
    vertex: &CompiledStage,
    pixel: &CompiledStage,
    attributes: &AttributeBindings,
) -> Result<ProgramInterface, String> {
    if vertex.stage != ShaderStage::Vertex || pixel.stage != ShaderStage::Pixel {
        return Err(format!(
            "stage mismatch: expected vertex + pixel, got {} + {}",
            vertex.stage, pixel.stage
        ));
    }
    let (Some(vs), Some(fs)) = (vertex.entry(), pixel.entry()) else {
        return Err("entry point missing from compiled module".to_string());
    };

    let mut errors = Vec::new();

    // Vertex inputs must map onto bound attribute streams.
    let mut vertex_inputs = Vec::new();
    for input in inputs_of(&vertex.module, vs) {
        let Some(&semantic) = attributes.get(&input.name) else {
            errors.push(format!(
                "vertex input `{}` (location {}) has no attribute binding",
                input.name, input.location
            ));
            continue;
        };
        if input.ty.scalar.kind != naga::ScalarKind::Float
            || input.ty.components != semantic.components()
        {
            errors.push(format!(
                "vertex input `{}` is {}, attribute {} supplies vec{}<f32>",
                input.name,
                input.ty,
                semantic,
                semantic.components()
            ));
            continue;
        }
        vertex_inputs.push(VertexInput {
            location: input.location,
            name: input.name,
            semantic,
        });
    }
    for name in attributes.keys() {
        if !vertex_inputs.iter().any(|v| &v.name == name) {
            log::debug!("attribute `{}` is bound but not used by the vertex stage", name);
        }
    }

    // Pixel inputs must be written by the vertex stage with the same type.
    let produced = outputs_of(&vertex.module, vs);
    for input in inputs_of(&pixel.module, fs) {
        match produced.iter().find(|o| o.location == input.location) {
            None => errors.push(format!(
                "pixel input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            )),
            Some(out) if out.ty != input.ty => errors.push(format!(
                "pixel input `{}` at location {} is {}, vertex stage writes {}",
                input.name, input.location, input.ty, out.ty
            )),
            Some(_) => {}
        }
    }

    let color_outputs = outputs_of(&pixel.module, fs)
        .iter()
        .map(|o| o.location + 1)
        .max()
        .unwrap_or(0);

    let mut usage = ResourceUsage::default();
    check_resources(vertex, &mut usage, &mut errors);
    check_resources(pixel, &mut usage, &mut errors);

    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    Ok(ProgramInterface {
        vertex_inputs,
        color_outputs,
        uses_frame_uniforms: usage.frame_uniforms,
        texture_slots: usage.texture_slots,
    })
}
