use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use crate::coords::Extent;
use crate::device::{Gpu, GpuInit};
use crate::mesh::MeshData;
use crate::shader::reflect::FRAME_UNIFORMS_SIZE;
use crate::shader::{AttributeBindings, ProgramInterface, ShaderStage, VertexSemantic};
use crate::target::InternalFormat;
use crate::time::FrameTime;

use super::{
    Driver, HandleAlloc, LinkedProgram, MeshHandle, PassSubmission, ProgramHandle, RasterState,
    ShaderHandle, ShaderStore, TextureDesc, TextureHandle,
};

struct GpuProgram {
    vertex: wgpu::ShaderModule,
    pixel: wgpu::ShaderModule,
    vertex_entry: String,
    pixel_entry: String,
    interface: ProgramInterface,
    uniforms_bgl: wgpu::BindGroupLayout,
    textures_bgl: Option<wgpu::BindGroupLayout>,
    layout: wgpu::PipelineLayout,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: InternalFormat,
    extent: Extent,
}

struct GpuMesh {
    streams: BTreeMap<VertexSemantic, wgpu::Buffer>,
    indices: Option<wgpu::Buffer>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    colors: Vec<InternalFormat>,
    depth: Option<InternalFormat>,
    raster: RasterState,
}

/// Driver executing passes on a headless wgpu device.
///
/// Programs are turned into render pipelines lazily, one per combination of
/// target formats and raster state they are used with.
pub struct WgpuDriver {
    gpu: Gpu,
    shaders: ShaderStore,
    alloc: HandleAlloc,
    programs: HashMap<ProgramHandle, GpuProgram>,
    textures: HashMap<TextureHandle, GpuTexture>,
    meshes: HashMap<MeshHandle, GpuMesh>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    sampler: wgpu::Sampler,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuDriver {
    pub fn new(gpu: Gpu) -> Self {
        let sampler = gpu.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln input sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        Self {
            gpu,
            shaders: ShaderStore::default(),
            alloc: HandleAlloc::default(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            pipelines: HashMap::new(),
            sampler,
            encoder: None,
        }
    }

    /// Creates the device and the driver in one go, blocking on adapter setup.
    pub fn from_init(init: GpuInit) -> Result<Self> {
        let gpu = Gpu::new_blocking(init).context("failed to initialize GPU")?;
        Ok(Self::new(gpu))
    }

    #[inline]
    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    /// Copies an RGBA8 texture back to the CPU as tightly packed rows.
    ///
    /// Work recorded in the current frame is submitted first.
    pub fn read_rgba8(&mut self, texture: TextureHandle) -> Result<(Extent, Vec<u8>)> {
        self.submit_pending();

        let tex = self
            .textures
            .get(&texture)
            .with_context(|| format!("unknown texture handle {}", texture.raw()))?;
        anyhow::ensure!(
            matches!(tex.format, InternalFormat::Rgba8 | InternalFormat::Rgba8Srgb),
            "readback supports Rgba8 textures only, got {}",
            tex.format
        );

        let Extent { width, height } = tex.extent;
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let device = self.gpu.device();
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln readback buffer"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kiln readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            tex.extent.to_wgpu(),
        );
        self.gpu.queue().submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("device poll failed during readback")?;
        rx.recv()
            .context("readback callback dropped")?
            .context("failed to map readback buffer")?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        Ok((tex.extent, pixels))
    }

    fn submit_pending(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.gpu.queue().submit(std::iter::once(encoder.finish()));
        }
    }

    fn build_program(&self, label: &str, handle: ProgramHandle) -> Option<GpuProgram> {
        let record = self.shaders.program(handle)?;
        let device = self.gpu.device();

        let module = |stage: ShaderStage, source: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{} {}", label, stage)),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_string())),
            })
        };
        let vertex = module(ShaderStage::Vertex, &record.vertex_source);
        let pixel = module(ShaderStage::Pixel, &record.pixel_source);

        let uniforms_entries: Vec<wgpu::BindGroupLayoutEntry> = record
            .interface
            .uses_frame_uniforms
            .then_some(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .into_iter()
            .collect();
        let uniforms_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln frame uniforms bgl"),
            entries: &uniforms_entries,
        });

        let textures_bgl = (record.interface.texture_slots > 0).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..record.interface.texture_slots)
                .flat_map(|slot| {
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: slot * 2,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: slot * 2 + 1,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("kiln pass inputs bgl"),
                entries: &entries,
            })
        });

        let groups: Vec<&wgpu::BindGroupLayout> =
            std::iter::once(&uniforms_bgl).chain(textures_bgl.as_ref()).collect();
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &groups,
            immediate_size: 0,
        });

        Some(GpuProgram {
            vertex,
            pixel,
            vertex_entry: record.vertex_entry.clone(),
            pixel_entry: record.pixel_entry.clone(),
            interface: record.interface.clone(),
            uniforms_bgl,
            textures_bgl,
            layout,
        })
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey, label: &str) -> bool {
        if self.pipelines.contains_key(key) {
            return true;
        }
        let Some(program) = self.programs.get(&key.program) else {
            return false;
        };

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = program
            .interface
            .vertex_inputs
            .iter()
            .map(|input| {
                [wgpu::VertexAttribute {
                    format: input.semantic.vertex_format(),
                    offset: 0,
                    shader_location: input.location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = program
            .interface
            .vertex_inputs
            .iter()
            .zip(&attributes)
            .map(|(input, attrs)| wgpu::VertexBufferLayout {
                array_stride: input.semantic.stride(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .colors
            .iter()
            .enumerate()
            .map(|(i, format)| {
                let written = (i as u32) < program.interface.color_outputs;
                let blend = if key.raster.blend && format.is_blendable() {
                    Some(wgpu::BlendState::ALPHA_BLENDING)
                } else {
                    None
                };
                Some(wgpu::ColorTargetState {
                    format: format.to_wgpu(),
                    blend,
                    write_mask: if written {
                        wgpu::ColorWrites::ALL
                    } else {
                        wgpu::ColorWrites::empty()
                    },
                })
            })
            .collect();
        if key.raster.blend && key.colors.iter().any(|f| !f.is_blendable()) {
            log::debug!("pass `{}`: blending disabled on non-blendable attachments", label);
        }

        let depth_stencil = key.depth.map(|format| wgpu::DepthStencilState {
            format: format.to_wgpu(),
            depth_write_enabled: key.raster.depth_write,
            depth_compare: if key.raster.depth_test {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self
            .gpu
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&program.layout),

                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(program.vertex_entry.as_str()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },

                fragment: Some(wgpu::FragmentState {
                    module: &program.pixel,
                    entry_point: Some(program.pixel_entry.as_str()),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),

                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: key.raster.cull_back_face.then_some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },

                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        log::debug!("built render pipeline for `{}` ({} pipelines cached)", label, self.pipelines.len() + 1);
        self.pipelines.insert(key.clone(), pipeline);
        true
    }
}

impl Driver for WgpuDriver {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn max_texture_dimension(&self) -> u32 {
        self.gpu.device().limits().max_texture_dimension_2d
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        self.shaders.compile(stage, source)
    }

    fn release_shader(&mut self, shader: ShaderHandle) {
        self.shaders.release_shader(shader);
    }

    fn link_program(
        &mut self,
        label: &str,
        vertex: ShaderHandle,
        pixel: ShaderHandle,
        attributes: &AttributeBindings,
    ) -> Result<LinkedProgram, String> {
        let linked = self.shaders.link(label, vertex, pixel, attributes)?;
        match self.build_program(label, linked.handle) {
            Some(program) => {
                self.programs.insert(linked.handle, program);
                Ok(linked)
            }
            None => {
                self.shaders.release_program(linked.handle);
                Err(format!("program `{}` vanished while linking", label))
            }
        }
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.shaders.release_program(program);
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>, pixels: Option<&[u8]>) -> TextureHandle {
        let usage = if desc.format.is_depth() {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST
        };

        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: desc.extent.to_wgpu(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage,
            view_formats: &[],
        });

        if let Some(pixels) = pixels {
            let bytes_per_row = desc.extent.width * desc.format.bytes_per_pixel();
            self.gpu.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(desc.extent.height),
                },
                desc.extent.to_wgpu(),
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TextureHandle::from_raw(self.alloc.next());
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                format: desc.format,
                extent: desc.extent,
            },
        );
        handle
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
        }
    }

    fn upload_mesh(&mut self, label: &str, data: &MeshData) -> MeshHandle {
        let device = self.gpu.device();
        let streams = data
            .streams()
            .map(|(semantic, values)| {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} {}", label, semantic)),
                    contents: bytemuck::cast_slice(values),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                (semantic, buffer)
            })
            .collect();
        let indices = (!data.indices().is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data.indices()),
                usage: wgpu::BufferUsages::INDEX,
            })
        });

        let handle = MeshHandle::from_raw(self.alloc.next());
        self.meshes.insert(handle, GpuMesh { streams, indices });
        handle
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
    }

    fn begin_frame(&mut self, time: &FrameTime) {
        self.submit_pending();
        self.encoder = Some(self.gpu.device().create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some(&format!("kiln frame {}", time.frame_index)),
            },
        ));
    }

    fn execute_pass(&mut self, pass: &PassSubmission<'_>) -> Result<(), String> {
        let key = PipelineKey {
            program: pass.program,
            colors: pass.colors.iter().map(|a| a.format).collect(),
            depth: pass.depth.map(|a| a.format),
            raster: pass.raster,
        };
        if !self.ensure_pipeline(&key, pass.label) {
            return Err(format!("unknown program handle {}", pass.program.raw()));
        }

        let device = self.gpu.device();
        let (Some(pipeline), Some(program)) =
            (self.pipelines.get(&key), self.programs.get(&pass.program))
        else {
            return Err(format!("no pipeline for program {}", pass.program.raw()));
        };

        let mut color_views = Vec::with_capacity(pass.colors.len());
        for attachment in pass.colors {
            let Some(t) = self.textures.get(&attachment.texture) else {
                return Err("colour attachment storage missing".to_string());
            };
            color_views.push(&t.view);
        }
        let depth_view = match pass.depth {
            Some(attachment) => match self.textures.get(&attachment.texture) {
                Some(t) => Some((&t.view, attachment.format)),
                None => {
                    return Err("depth attachment storage missing".to_string());
                }
            },
            None => None,
        };

        let uniforms_buffer = program.interface.uses_frame_uniforms.then(|| {
            debug_assert_eq!(
                std::mem::size_of_val(&pass.uniforms) as u32,
                FRAME_UNIFORMS_SIZE
            );
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kiln frame uniforms"),
                contents: bytemuck::bytes_of(&pass.uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });
        let uniforms_entries: Vec<wgpu::BindGroupEntry<'_>> = uniforms_buffer
            .iter()
            .map(|buffer| wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniforms_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln frame uniforms bind group"),
            layout: &program.uniforms_bgl,
            entries: &uniforms_entries,
        });

        let inputs_bg = match &program.textures_bgl {
            Some(layout) => {
                let mut entries = Vec::with_capacity(pass.inputs.len() * 2);
                for (slot, handle) in pass.inputs.iter().enumerate() {
                    let Some(t) = self.textures.get(handle) else {
                        return Err(format!("input {} storage missing", slot));
                    };
                    entries.push(wgpu::BindGroupEntry {
                        binding: slot as u32 * 2,
                        resource: wgpu::BindingResource::TextureView(&t.view),
                    });
                    entries.push(wgpu::BindGroupEntry {
                        binding: slot as u32 * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    });
                }
                Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("kiln pass inputs bind group"),
                    layout,
                    entries: &entries,
                }))
            }
            None => None,
        };

        let load_color = match pass.clear {
            Some(c) => wgpu::LoadOp::Clear(c.to_wgpu()),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = color_views
            .iter()
            .map(|&view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: load_color,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment =
            depth_view.map(|(view, format)| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if pass.clear.is_some() {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: format.has_stencil().then_some(wgpu::Operations {
                    load: if pass.clear.is_some() {
                        wgpu::LoadOp::Clear(0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
            });

        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln pass encoder"),
            })
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(pass.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        if pass.viewport.is_empty() || pass.draws.is_empty() {
            return Ok(());
        }

        let vp = pass.viewport;
        rpass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &uniforms_bg, &[]);
        if let Some(bg) = &inputs_bg {
            rpass.set_bind_group(1, bg, &[]);
        }

        'draws: for draw in pass.draws {
            let Some(mesh) = self.meshes.get(&draw.mesh) else {
                continue;
            };
            for (slot, input) in program.interface.vertex_inputs.iter().enumerate() {
                let Some(buffer) = mesh.streams.get(&input.semantic) else {
                    continue 'draws;
                };
                rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            match (&mesh.indices, draw.indexed) {
                (Some(ibo), true) => {
                    rpass.set_index_buffer(ibo.slice(..), wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(0..draw.count, 0, 0..1);
                }
                _ => rpass.draw(0..draw.count, 0..1),
            }
        }
        Ok(())
    }

    fn end_frame(&mut self) {
        self.submit_pending();
    }
}
