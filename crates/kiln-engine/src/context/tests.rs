use super::*;
use crate::coords::{ColorRgba, Viewport};
use crate::driver::{Command, RecordingDriver};
use crate::pipeline::{PassOutcome, RenderPass, RenderPipeline};
use crate::scene::{GenerateCx, Layer};
use crate::shader::ProgramState;
use crate::shader::reflect::tests::{FS, VS};

fn ctx() -> RenderContext<RecordingDriver> {
    RenderContext::new(RecordingDriver::new(), ContextConfig::default()).unwrap()
}

fn add_p1(ctx: &mut RenderContext<RecordingDriver>) {
    ctx.create_program("p1").unwrap();
    let p = ctx.program_mut("p1").unwrap();
    p.set_attribute("position", VertexSemantic::Position).unwrap();
    p.set_attribute("uv", VertexSemantic::TexCoord).unwrap();
    p.set_shader_source(ShaderStage::Vertex, VS);
    p.set_shader_source(ShaderStage::Pixel, FS);
    assert!(ctx.complete_program("p1").unwrap());
}

fn add_quad_instance(ctx: &mut RenderContext<RecordingDriver>) {
    let id = ctx.create_mesh("quad", &MeshData::fullscreen_quad()).unwrap();
    ctx.scene_mut().add(Layer(0), id);
}

fn add_fbo(ctx: &mut RenderContext<RecordingDriver>) {
    ctx.create_framebuffer("fbo").unwrap();
    ctx.create_texture(
        "color",
        TextureSource::RenderTarget {
            format: InternalFormat::Rgba8,
            extent: Some(Extent::new(256, 256)),
        },
    )
    .unwrap();
    ctx.add_target_texture("fbo", "color").unwrap();
    ctx.add_target("fbo", InternalFormat::Depth24).unwrap();
}

fn skipped(outcome: &PassOutcome) -> &Error {
    outcome.error().expect("pass should have been skipped")
}

#[test]
fn builtins_exist() {
    let c = ctx();
    assert!(c.program(FULLSCREEN_PROGRAM).unwrap().is_complete());
    let default = c.framebuffer(DEFAULT_TARGET).unwrap();
    assert_eq!(default.extent(), Some(Extent::new(640, 480)));
    assert_eq!(default.color_count(), 1);
    assert!(default.has_depth());
    assert!(c.mesh(builtin::FULLSCREEN_QUAD).is_some());
}

#[test]
fn p1_scene_pass_executes() {
    let mut c = ctx();
    add_p1(&mut c);
    add_quad_instance(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(
        &RenderPass::new(DEFAULT_TARGET, "p1", "scene")
            .with_clear(ColorRgba::black())
            .with_depth(true, true),
    );

    let report = c.render_frame(&mut pipeline);
    assert_eq!(report.outcomes.len(), 1);
    assert!(matches!(report.outcomes[0], PassOutcome::Executed { draws: 1 }));

    let frame = c.driver().last_frame().unwrap();
    assert_eq!(frame.bound_targets(), [DEFAULT_TARGET]);
    assert_eq!(frame.draw_count(), 1);
}

#[test]
fn fbo_sizing_follows_attachments_and_resizes() {
    let mut c = ctx();
    add_fbo(&mut c);
    assert_eq!(c.framebuffer("fbo").unwrap().extent(), Some(Extent::new(256, 256)));

    c.resize_framebuffer("fbo", 640, 480).unwrap();
    let sizes = c.attachment_extents("fbo").unwrap();
    assert_eq!(sizes.len(), 2);
    assert!(sizes.iter().all(|s| *s == Some(Extent::new(640, 480))));
    assert_eq!(c.texture("color").unwrap().extent(), Some(Extent::new(640, 480)));

    c.create_texture(
        "quarter",
        TextureSource::RenderTarget {
            format: InternalFormat::Rgba8,
            extent: Some(Extent::new(320, 240)),
        },
    )
    .unwrap();
    assert!(matches!(
        c.add_target_texture("fbo", "quarter"),
        Err(Error::IncompatibleSize { .. })
    ));
    assert_eq!(c.framebuffer("fbo").unwrap().color_count(), 1);

    c.resize_window(320, 240).unwrap();
    assert_eq!(c.framebuffer(DEFAULT_TARGET).unwrap().extent(), Some(Extent::new(320, 240)));
    assert_eq!(c.framebuffer("fbo").unwrap().extent(), Some(Extent::new(640, 480)));
    let default_sizes = c.attachment_extents(DEFAULT_TARGET).unwrap();
    assert!(default_sizes.iter().all(|s| *s == Some(Extent::new(320, 240))));
}

#[test]
fn window_scaled_target_tracks_window() {
    let mut c = ctx();
    c.create_window_framebuffer("half", 0.5).unwrap();
    c.add_target("half", InternalFormat::Rgba16Float).unwrap();
    assert_eq!(c.framebuffer("half").unwrap().extent(), Some(Extent::new(320, 240)));
    c.resize_window(1000, 500).unwrap();
    assert_eq!(c.framebuffer("half").unwrap().extent(), Some(Extent::new(500, 250)));
    assert!(matches!(c.resize_window(0, 10), Err(Error::InvalidSize { .. })));
}

#[test]
fn oversized_window_resize_changes_nothing() {
    let mut c = ctx();
    c.create_window_framebuffer("big", 4.0).unwrap();
    c.add_target("big", InternalFormat::Rgba8).unwrap();
    assert_eq!(c.framebuffer("big").unwrap().extent(), Some(Extent::new(2560, 1920)));

    assert!(matches!(c.resize_window(4000, 4000), Err(Error::InvalidSize { .. })));
    assert_eq!(c.window_size(), Extent::new(640, 480));
    assert_eq!(c.framebuffer(DEFAULT_TARGET).unwrap().extent(), Some(Extent::new(640, 480)));
    assert_eq!(c.framebuffer("big").unwrap().extent(), Some(Extent::new(2560, 1920)));

    // Not mistaken for a no-op on retry.
    assert!(matches!(c.resize_window(4000, 4000), Err(Error::InvalidSize { .. })));
    c.resize_window(800, 600).unwrap();
    assert_eq!(c.framebuffer("big").unwrap().extent(), Some(Extent::new(3200, 2400)));
}

#[test]
fn texture_attaches_to_one_target_only() {
    let mut c = ctx();
    add_p1(&mut c);
    add_fbo(&mut c);
    c.create_framebuffer("other").unwrap();
    c.resize_framebuffer("other", 64, 64).unwrap();

    let err = c.add_target_texture("other", "color").unwrap_err();
    assert!(matches!(err, Error::InvalidAttachment { ref target, .. } if target == "other"));
    assert_eq!(c.framebuffer("other").unwrap().color_count(), 0);
    assert_eq!(c.texture("color").unwrap().extent(), Some(Extent::new(256, 256)));

    c.resize_framebuffer("fbo", 128, 128).unwrap();
    let sizes = c.attachment_extents("fbo").unwrap();
    assert!(sizes.iter().all(|s| *s == Some(Extent::new(128, 128))));

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new("fbo", "p1", "scene"));
    let report = c.render_frame(&mut pipeline);
    assert!(report.outcomes[0].is_executed());
}

#[test]
fn attachment_size_drift_makes_target_incomplete() {
    let mut c = ctx();
    add_p1(&mut c);
    add_fbo(&mut c);
    let id = c.textures.lookup("color").unwrap();
    c.textures
        .get_mut(id)
        .unwrap()
        .allocate("color", Extent::new(8, 8), &mut c.driver);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new("fbo", "p1", "scene"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(
        skipped(&report.outcomes[0]),
        Error::IncompleteTarget { reason: "attached texture size differs from the target", .. }
    ));
}

#[test]
fn driver_rejection_is_reported_as_invalid_pass() {
    let mut c = ctx();
    add_p1(&mut c);
    add_fbo(&mut c);
    let handle = c.color_attachment_handle("fbo", 0).unwrap();
    c.driver_mut().release_texture(handle);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new("fbo", "p1", "scene"));
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p1", "scene"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(skipped(&report.outcomes[0]), Error::InvalidPass { pass: 0, .. }));
    assert!(report.outcomes[1].is_executed());
    assert_eq!(c.driver().last_frame().unwrap().bound_targets(), [DEFAULT_TARGET]);
}

#[test]
fn mismatched_texture_is_incompatible() {
    let mut c = ctx();
    add_fbo(&mut c);
    c.create_texture(
        "small",
        TextureSource::RenderTarget {
            format: InternalFormat::Rgba8,
            extent: Some(Extent::new(16, 16)),
        },
    )
    .unwrap();
    let err = c.add_target_texture("fbo", "small").unwrap_err();
    assert!(matches!(err, Error::IncompatibleSize { .. }));
}

#[test]
fn duplicate_names_rejected() {
    let mut c = ctx();
    add_p1(&mut c);
    assert!(matches!(
        c.create_program("p1"),
        Err(Error::DuplicateName { kind: ResourceKind::Program, .. })
    ));
    assert!(matches!(
        c.create_framebuffer(DEFAULT_TARGET),
        Err(Error::DuplicateName { kind: ResourceKind::Target, .. })
    ));
    add_fbo(&mut c);
    let again = c.create_texture(
        "color",
        TextureSource::RenderTarget {
            format: InternalFormat::Rgba8,
            extent: None,
        },
    );
    assert!(matches!(again, Err(Error::DuplicateName { kind: ResourceKind::Texture, .. })));
    assert!(c.program("p1").unwrap().is_complete());
}

#[test]
fn unresolved_target_skips_only_that_pass() {
    let mut c = ctx();
    add_p1(&mut c);
    add_quad_instance(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p1", "scene"));
    pipeline.append(&RenderPass::new("missing", "p1", "scene"));
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p1", "scene"));

    let report = c.render_frame(&mut pipeline);
    assert!(report.outcomes[0].is_executed());
    assert!(matches!(
        skipped(&report.outcomes[1]),
        Error::UnresolvedReference { pass: 1, kind: ResourceKind::Target, .. }
    ));
    assert!(report.outcomes[2].is_executed());
    assert_eq!(report.skipped(), 1);
    assert_eq!(c.driver().last_frame().unwrap().executed_passes(), [0, 2]);
}

#[test]
fn passes_execute_in_append_order_each_frame() {
    let mut c = ctx();
    add_p1(&mut c);
    add_fbo(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new("fbo", "p1", "scene"));
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "fullscreen", "fullscreen").with_inputs(["color"]));
    pipeline.append(&RenderPass::new("fbo", "p1", "scene"));

    for _ in 0..3 {
        let report = c.render_frame(&mut pipeline);
        assert_eq!(report.executed(), 3);
    }
    let frames = c.driver().frames();
    assert_eq!(frames.len(), 3);
    for frame in frames {
        assert_eq!(frame.bound_targets(), ["fbo", DEFAULT_TARGET, "fbo"]);
    }
    assert_eq!(frames[2].frame_index, 2);
}

#[test]
fn recorded_commands_follow_issue_order() {
    let mut c = ctx();
    add_p1(&mut c);
    add_quad_instance(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(
        &RenderPass::new(DEFAULT_TARGET, "p1", "scene")
            .with_clear(ColorRgba::new(0.2, 0.3, 0.4, 1.0))
            .with_depth(true, true)
            .with_cull_back_face(true),
    );
    c.render_frame(&mut pipeline);

    let commands = &c.driver().last_frame().unwrap().commands;
    assert_eq!(commands.len(), 6);
    assert!(matches!(commands[0], Command::BindTarget { pass: 0, .. }));
    assert_eq!(commands[1], Command::Viewport(Viewport::new(0.0, 0.0, 640.0, 480.0)));
    assert_eq!(commands[2], Command::Clear(ColorRgba::new(0.2, 0.3, 0.4, 1.0)));
    match &commands[3] {
        Command::State(state) => {
            assert!(state.depth_test && state.depth_write && state.cull_back_face);
            assert!(!state.blend);
        }
        other => panic!("expected state, got {:?}", other),
    }
    match &commands[4] {
        Command::Program { uniforms, .. } => assert_eq!(uniforms.viewport, [0.0, 0.0, 640.0, 480.0]),
        other => panic!("expected program, got {:?}", other),
    }
    assert!(matches!(commands[5], Command::Draw(_)));
}

#[test]
fn mode_alias_resolves_and_unknown_mode_is_unresolved() {
    let mut c = ctx();
    add_p1(&mut c);
    add_quad_instance(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "normal", "scene"));
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "nope", "scene"));

    let report = c.render_frame(&mut pipeline);
    assert!(matches!(
        skipped(&report.outcomes[0]),
        Error::UnresolvedReference { kind: ResourceKind::Program, .. }
    ));

    c.set_mode("normal", "p1");
    let report = c.render_frame(&mut pipeline);
    assert!(report.outcomes[0].is_executed());
    assert!(matches!(
        skipped(&report.outcomes[1]),
        Error::UnresolvedReference { pass: 1, kind: ResourceKind::Program, .. }
    ));
}

#[test]
fn unknown_generator_is_unresolved() {
    let mut c = ctx();
    add_p1(&mut c);
    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p1", "particles"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(
        skipped(&report.outcomes[0]),
        Error::UnresolvedReference { kind: ResourceKind::Generator, .. }
    ));
}

#[test]
fn stale_cached_ids_are_re_resolved() {
    let mut c = ctx();
    add_p1(&mut c);
    add_quad_instance(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p1", "scene"));
    assert!(c.render_frame(&mut pipeline).outcomes[0].is_executed());
    let first = pipeline.cached(0).unwrap().program;

    c.destroy_program("p1").unwrap();
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(skipped(&report.outcomes[0]), Error::UnresolvedReference { .. }));

    add_p1(&mut c);
    let report = c.render_frame(&mut pipeline);
    assert!(report.outcomes[0].is_executed());
    let second = pipeline.cached(0).unwrap().program;
    assert_ne!(first, second);
    assert_eq!(first.index(), second.index());
}

#[test]
fn incomplete_program_skips_pass() {
    let mut c = ctx();
    c.create_program("p2").unwrap();
    c.program_mut("p2").unwrap().set_shader_source(ShaderStage::Vertex, VS);
    assert!(!c.complete_program("p2").unwrap());
    assert_eq!(c.program("p2").unwrap().state(), ProgramState::Failed);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p2", "scene"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(
        skipped(&report.outcomes[0]),
        Error::IncompleteProgram { pass: 0, .. }
    ));
}

#[test]
fn incomplete_target_skips_pass() {
    let mut c = ctx();
    add_p1(&mut c);
    c.create_framebuffer("empty").unwrap();

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new("empty", "p1", "scene"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(skipped(&report.outcomes[0]), Error::IncompleteTarget { .. }));
}

#[test]
fn destroyed_attachment_makes_target_incomplete() {
    let mut c = ctx();
    add_p1(&mut c);
    add_fbo(&mut c);
    c.destroy_texture("color").unwrap();

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new("fbo", "p1", "scene"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(
        skipped(&report.outcomes[0]),
        Error::IncompleteTarget { reason: "attached texture was destroyed", .. }
    ));
}

#[test]
fn fullscreen_blit_samples_input() {
    let mut c = ctx();
    add_fbo(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "fullscreen", "fullscreen").with_inputs(["color"]));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(report.outcomes[0], PassOutcome::Executed { draws: 1 }));

    let color = c.texture("color").unwrap().handle().unwrap();
    let frame = c.driver().last_frame().unwrap();
    let inputs = frame.commands.iter().find_map(|cmd| match cmd {
        Command::Program { inputs, .. } => Some(inputs.clone()),
        _ => None,
    });
    assert_eq!(inputs, Some(vec![color]));
}

#[test]
fn missing_or_self_referencing_inputs_are_invalid() {
    let mut c = ctx();
    add_fbo(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "fullscreen", "fullscreen"));
    pipeline.append(&RenderPass::new("fbo", "fullscreen", "fullscreen").with_inputs(["color"]));
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "fullscreen", "fullscreen").with_inputs(["nothing"]));

    let report = c.render_frame(&mut pipeline);
    assert!(matches!(skipped(&report.outcomes[0]), Error::InvalidPass { pass: 0, .. }));
    let err = skipped(&report.outcomes[1]);
    assert!(matches!(err, Error::InvalidPass { pass: 1, .. }));
    assert!(err.to_string().contains("also an attachment"), "{}", err);
    assert!(matches!(
        skipped(&report.outcomes[2]),
        Error::UnresolvedReference { kind: ResourceKind::Texture, .. }
    ));
}

#[test]
fn empty_viewport_clears_without_drawing() {
    let mut c = ctx();
    add_p1(&mut c);
    add_quad_instance(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(
        &RenderPass::new(DEFAULT_TARGET, "p1", "scene")
            .with_viewport(Viewport::new(700.0, 0.0, 100.0, 100.0))
            .with_clear(ColorRgba::black()),
    );
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(report.outcomes[0], PassOutcome::Executed { draws: 0 }));
    let frame = c.driver().last_frame().unwrap();
    assert!(frame.commands.iter().any(|cmd| matches!(cmd, Command::Clear(_))));
    assert_eq!(frame.draw_count(), 0);
}

#[test]
fn meshes_missing_program_streams_are_not_drawn() {
    let mut c = ctx();
    add_p1(&mut c);
    let tri = c
        .create_mesh(
            "tri",
            &MeshData::new().with_stream(VertexSemantic::Position, vec![0.0f32; 9]),
        )
        .unwrap();
    c.scene_mut().add(Layer(0), tri);
    add_quad_instance(&mut c);

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p1", "scene"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(report.outcomes[0], PassOutcome::Executed { draws: 1 }));

    c.destroy_mesh("quad").unwrap();
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(report.outcomes[0], PassOutcome::Executed { draws: 0 }));
    assert!(c.destroy_mesh(builtin::FULLSCREEN_QUAD).is_err());
}

#[test]
fn custom_generator_is_invoked_per_pass() {
    let mut c = ctx();
    add_p1(&mut c);
    c.register_generator(
        "twice",
        Box::new(|cx: &GenerateCx<'_>, out: &mut Vec<Id<Mesh>>| {
            out.push(cx.fullscreen_quad);
            out.push(cx.fullscreen_quad);
        }),
    )
    .unwrap();

    let mut pipeline = RenderPipeline::new();
    pipeline.append(&RenderPass::new(DEFAULT_TARGET, "p1", "twice"));
    let report = c.render_frame(&mut pipeline);
    assert!(matches!(report.outcomes[0], PassOutcome::Executed { draws: 2 }));
}

#[test]
fn pixel_texture_size_is_checked() {
    let mut c = ctx();
    let err = c
        .create_texture(
            "img",
            TextureSource::Pixels {
                extent: Extent::new(2, 2),
                data: vec![0; 15],
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTexture { .. }));

    let ok = c.create_texture(
        "img",
        TextureSource::Pixels {
            extent: Extent::new(2, 2),
            data: vec![255; 16],
        },
    );
    assert!(ok.is_ok());
    assert!(c.texture("img").unwrap().is_allocated());
}

#[test]
fn missing_image_file_is_reported() {
    let mut c = ctx();
    let err = c
        .create_texture_from_path("img", "/definitely/not/here.png")
        .unwrap_err();
    assert!(matches!(err, Error::Image { .. }));
    assert!(c.texture("img").is_none());
}

#[test]
fn destroying_everything_releases_driver_storage() {
    let mut c = ctx();
    add_p1(&mut c);
    add_fbo(&mut c);
    let baseline_textures = 2; // default colour + depth
    assert_eq!(c.driver().stats().live_textures, baseline_textures + 2);

    c.destroy_framebuffer("fbo").unwrap();
    c.destroy_texture("color").unwrap();
    c.destroy_program("p1").unwrap();
    let stats = c.driver().stats();
    assert_eq!(stats.live_textures, baseline_textures);
    assert_eq!(stats.live_programs, 1);
}
