use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use clap::{Parser, ValueEnum};

use kiln_engine::coords::ColorRgba;
use kiln_engine::device::GpuInit;
use kiln_engine::driver::{Driver, RecordingDriver, WgpuDriver};
use kiln_engine::logging::{LoggingConfig, init_logging};
use kiln_engine::mesh::MeshData;
use kiln_engine::scene::Layer;
use kiln_engine::shader::{ShaderStage, VertexSemantic};
use kiln_engine::target::{InternalFormat, TextureSource};
use kiln_engine::{ContextConfig, DEFAULT_TARGET, RenderContext, RenderPass, RenderPipeline};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Render on the GPU through wgpu.
    Wgpu,
    /// Record commands only; no GPU required.
    Recording,
}

/// Renders the two-pass kiln demo offscreen.
#[derive(Debug, Parser)]
#[command(name = "kiln-studio", version)]
struct Args {
    /// Number of frames to render.
    #[arg(long, default_value_t = 3)]
    frames: u32,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    #[arg(long, value_enum, default_value_t = Backend::Wgpu)]
    backend: Backend,

    /// Save the default target as PNG after the last frame (wgpu only).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log filter in `env_logger` syntax, e.g. `kiln_engine=debug`.
    #[arg(long)]
    log: Option<String>,
}

const SCENE_VS: &str = r#"
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

const SCENE_FS: &str = r#"
struct FrameUniforms {
    viewport: vec4<f32>,
    time: f32,
    frame: u32,
};

@group(0) @binding(0) var<uniform> frame: FrameUniforms;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>, @location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let p = (pos.xy - frame.viewport.xy) / frame.viewport.zw;
    let wave = 0.5 + 0.5 * sin(10.0 * p.x + 3.0 * frame.time);
    return vec4<f32>(uv.x, wave, uv.y, 1.0);
}
"#;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log.clone().map(LoggingConfig::with_filter).unwrap_or_default());

    println!();
    println!("  ╔════════════════════════════════════════╗");
    println!("  ║            KILN STUDIO v0.1            ║");
    println!("  ║   offscreen passes  ·  wgsl programs   ║");
    println!("  ╚════════════════════════════════════════╝");
    println!();

    let config = ContextConfig {
        window_size: kiln_engine::coords::Extent::new(args.width, args.height),
        ..Default::default()
    };

    match args.backend {
        Backend::Wgpu => {
            let driver = WgpuDriver::from_init(GpuInit::default())?;
            let info = driver.gpu().adapter_info();
            log::info!("studio on `{}` ({:?})", info.name, info.backend);
            let mut ctx = RenderContext::new(driver, config)?;
            run(&mut ctx, &args)?;
            if let Some(path) = &args.output {
                save_default_target(&mut ctx, path)?;
            }
        }
        Backend::Recording => {
            if args.output.is_some() {
                bail!("--output needs the wgpu backend");
            }
            let mut ctx = RenderContext::new(RecordingDriver::new(), config)?;
            run(&mut ctx, &args)?;
            let stats = ctx.driver().stats();
            println!(
                "  [REC] {} passes  ·  {} programs  ·  {} textures live",
                stats.passes_executed, stats.live_programs, stats.live_textures
            );
            if let Some(frame) = ctx.driver().last_frame() {
                println!("  [REC] last frame: {} commands, targets {:?}", frame.commands.len(), frame.bound_targets());
            }
        }
    }

    println!();
    Ok(())
}

/// Scene pass into `fbo`, then a fullscreen copy of it onto the default target.
fn run<D: Driver>(ctx: &mut RenderContext<D>, args: &Args) -> anyhow::Result<()> {
    ctx.create_program("prog1")?;
    {
        let program = ctx.program_mut("prog1")?;
        program.set_attribute("position", VertexSemantic::Position)?;
        program.set_attribute("uv", VertexSemantic::TexCoord)?;
        program.set_shader_source(ShaderStage::Vertex, SCENE_VS);
        program.set_shader_source(ShaderStage::Pixel, SCENE_FS);
    }
    if !ctx.complete_program("prog1")? {
        let log = ctx.program("prog1").map(|p| p.info_log()).unwrap_or_default();
        bail!("prog1 did not link:\n{}", log);
    }
    ctx.set_mode("normal", "prog1");

    ctx.create_framebuffer("fbo")?;
    ctx.create_texture(
        "fbo_color",
        TextureSource::RenderTarget {
            format: InternalFormat::Rgba8,
            extent: None,
        },
    )?;
    ctx.resize_framebuffer("fbo", args.width, args.height)?;
    ctx.add_target_texture("fbo", "fbo_color")?;
    ctx.add_target("fbo", InternalFormat::Depth24)?;

    let panel = ctx.create_mesh("panel", &panel_mesh())?;
    ctx.scene_mut().add(Layer(0), panel);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(
        &RenderPass::new("fbo", "normal", "scene")
            .with_clear(ColorRgba::new(0.05, 0.05, 0.08, 1.0))
            .with_depth(true, true)
            .with_label("scene"),
    );
    pipeline.append(
        &RenderPass::new(DEFAULT_TARGET, "fullscreen", "fullscreen")
            .with_inputs(["fbo_color"])
            .with_label("present"),
    );

    log::info!("rendering {} frame(s) at {}x{}", args.frames, args.width, args.height);
    for _ in 0..args.frames {
        let report = ctx.render_frame(&mut pipeline);
        println!(
            "  [FRAME {:>3}] {} executed  ·  {} skipped  ·  {} draws",
            report.time.frame_index,
            report.executed(),
            report.skipped(),
            report.total_draws()
        );
        for (index, err) in report.errors() {
            println!("              pass {}: {}", index, err);
        }
    }
    Ok(())
}

/// Inset quad with `uv` running corner to corner.
fn panel_mesh() -> MeshData {
    MeshData::new()
        .with_stream(
            VertexSemantic::Position,
            vec![
                -0.8f32, -0.8, 0.0, //
                0.8, -0.8, 0.0, //
                0.8, 0.8, 0.0, //
                -0.8, 0.8, 0.0,
            ],
        )
        .with_stream(
            VertexSemantic::TexCoord,
            vec![0.0f32, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
        )
        .with_indices(vec![0u32, 1, 2, 2, 3, 0])
}

fn save_default_target(ctx: &mut RenderContext<WgpuDriver>, path: &Path) -> anyhow::Result<()> {
    let handle = ctx
        .color_attachment_handle(DEFAULT_TARGET, 0)
        .context("default target has no colour attachment")?;
    let (extent, pixels) = ctx.driver_mut().read_rgba8(handle)?;
    let image = image::RgbaImage::from_raw(extent.width, extent.height, pixels)
        .context("readback size does not match the target")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("  [OUT] wrote {} ({})", path.display(), extent);
    Ok(())
}
