use std::sync::Arc;

use terrafx::{
    BuildError,
    data_structures::property_root::PropertyRoot,
    effect::{
        pass::{CullFace, RenderingHint},
        scheme::{Scheme, SchemeTable},
        technique::Predicate,
    },
};

use crate::common::test_utils::{Fixture, context, init_logger, node};

mod common;

#[test]
fn unknown_attributes_are_skipped() {
    init_logger();
    let fixture = Fixture::new("unknown-attribute");
    let (ctx, _) = context(fixture.path());
    let description = node(
        r#"{"technique": {"pass": {
            "cull-face": "back",
            "shimmer": {"amount": 3},
            "rendering-hint": "transparent"
        }}}"#,
    );

    let effect = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");

    let technique = &effect.techniques()[0];
    assert_eq!(technique.passes.len(), 1);
    let pass = &technique.passes[0];
    assert_eq!(pass.cull_face, Some(CullFace::Back));
    assert_eq!(pass.rendering_hint, Some(RenderingHint::Transparent));
    assert_eq!(pass.bin_number(), 10);
    assert!(effect.diagnostics().is_empty());
    assert!(effect.choose_technique("", 0, ctx.probes()).is_some());
}

#[test]
fn inactive_attribute_leaves_the_pass_untouched() {
    init_logger();
    let fixture = Fixture::new("inactive");
    let (ctx, _) = context(fixture.path());
    let description = node(
        r#"{"technique": {"pass": {
            "blend": {"active": false, "source": "src-alpha"},
            "render-bin": {"active": true, "bin-number": 3, "bin-name": "DepthSortedBin"}
        }}}"#,
    );

    let effect = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");

    let pass = &effect.techniques()[0].passes[0];
    assert!(pass.blend.is_none());
    assert_eq!(pass.bin_number(), 3);
    assert_eq!(
        pass.render_bin.as_ref().map(|b| b.name.as_str()),
        Some("DepthSortedBin")
    );
}

#[test]
fn bad_predicate_disables_only_its_technique() {
    init_logger();
    let fixture = Fixture::new("bad-predicate");
    let (ctx, _) = context(fixture.path());
    let description = node(
        r#"{"name": "fallbacks", "technique": [
            {"name": "broken", "predicate": {"wobble": 1}, "pass": {"cull-face": "front"}},
            {"name": "plain", "pass": {"cull-face": "off"}}
        ]}"#,
    );

    let effect = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");

    assert_eq!(effect.techniques().len(), 2);
    assert!(matches!(effect.techniques()[0].predicate(), Predicate::Never));
    let diagnostic = &effect.diagnostics()[0];
    assert_eq!(diagnostic.effect, "fallbacks");
    assert_eq!(diagnostic.technique, Some(0));
    assert_eq!(diagnostic.attribute.as_deref(), Some("predicate"));
    let chosen = effect
        .choose_technique("", 0, ctx.probes())
        .expect("The plain technique should be usable.");
    assert_eq!(chosen.name, "plain");
}

#[test]
fn failing_pass_makes_its_technique_unusable() {
    init_logger();
    let fixture = Fixture::new("failing-pass");
    let (ctx, backend) = context(fixture.path());
    let description = node(
        r#"{"technique": [
            {"pass": {"program": {"vertex-shader": "missing.vert"}}},
            {"pass": {"polygon-offset": {"factor": 1, "units": 2}}}
        ]}"#,
    );

    let effect = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");

    let failed = &effect.techniques()[0];
    assert!(failed.passes.is_empty());
    assert!(matches!(failed.predicate(), Predicate::Never));
    let diagnostic = &effect.diagnostics()[0];
    assert_eq!(diagnostic.pass, Some(0));
    assert_eq!(diagnostic.attribute.as_deref(), Some("program"));
    assert_eq!(backend.linked(), 0);
    let chosen = effect
        .choose_technique("", 0, ctx.probes())
        .expect("The second technique should be usable.");
    assert_eq!(chosen.name, "1");
}

#[test]
fn program_uniform_and_texture_go_through_the_shared_caches() {
    init_logger();
    let fixture = Fixture::new("shared-caches");
    fixture.write("shaders/terrain.vert", "// vertex");
    fixture.write("shaders/terrain.frag", "// fragment");
    let (ctx, backend) = context(fixture.path());
    let description = |name: &str| {
        node(&format!(
            r#"{{"name": "{name}", "technique": {{"pass": {{
                "program": {{
                    "vertex-shader": "shaders/terrain.vert",
                    "fragment-shader": "shaders/terrain.frag",
                    "attribute": {{"name": "tangent", "index": 6}}
                }},
                "uniform": {{"name": "snowLevel", "type": "float", "value": 1200.0}},
                "texture-unit": {{"unit": 2, "image": "missing-snow.png", "wrap-s": "clamp"}}
            }}}}}}"#
        ))
    };

    let a = ctx
        .make_effect_from_node(&description("rock"), true)
        .expect("Effect failed to build.");
    let b = ctx
        .make_effect_from_node(&description("grass"), true)
        .expect("Effect failed to build.");

    let (pa, pb) = (&a.techniques()[0].passes[0], &b.techniques()[0].passes[0]);
    let (program_a, program_b) = (
        pa.program.as_ref().expect("Pass has no program."),
        pb.program.as_ref().expect("Pass has no program."),
    );
    assert!(Arc::ptr_eq(program_a, program_b));
    assert_eq!(program_a.attribute_location("tangent"), Some(6));
    assert_eq!(backend.compiled(), 2);
    assert_eq!(backend.linked(), 1);

    // Uniforms are keyed per effect.
    let (ua, ub) = (
        pa.uniform("snowLevel").expect("Missing uniform."),
        pb.uniform("snowLevel").expect("Missing uniform."),
    );
    assert!(!Arc::ptr_eq(ua, ub));
    assert_eq!(ua.as_f32s(), vec![1200.0]);

    let unit = pa.texture_units.get(&2).expect("Missing texture unit.");
    assert!(unit.texture.placeholder);
    assert_eq!(unit.sampler.address_mode_u, wgpu::AddressMode::ClampToEdge);
    assert!(Arc::ptr_eq(&unit.texture, &pb.texture_units[&2].texture));
    assert_eq!(ctx.resources().textures.len(), 1);
}

#[test]
fn parameters_can_bind_uniforms_to_live_properties() {
    init_logger();
    let fixture = Fixture::new("live-uniform");
    let (ctx, _) = context(fixture.path());
    let properties = Arc::new(PropertyRoot::new());
    properties.set("/environment/snow-level-m", 900.0);
    let ctx = ctx.with_properties(properties.clone());
    let description = node(
        r#"{
            "parameters": {"snow": {"use": "/environment/snow-level-m"}},
            "technique": {"pass": {
                "uniform": {"name": "snowLevel", "type": "float", "value": {"use": "snow"}}
            }}
        }"#,
    );

    let effect = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");
    let uniform = effect.techniques()[0].passes[0]
        .uniform("snowLevel")
        .expect("Missing uniform.")
        .clone();
    assert!(uniform.is_live());
    assert_eq!(ctx.flush_listeners(), 1);
    assert_eq!(uniform.as_f32s(), vec![900.0]);

    properties.set("/environment/snow-level-m", 1500.0);
    assert_eq!(uniform.as_f32s(), vec![1500.0]);
}

#[test]
fn inheritance_merges_the_parent_description() {
    init_logger();
    let fixture = Fixture::new("inheritance");
    fixture.write(
        "Effects/terrain-default.json",
        r#"{
            "parameters": {"bin": 1},
            "technique": {"pass": {
                "cull-face": "back",
                "render-bin": {"bin-number": {"use": "bin"}}
            }}
        }"#,
    );
    let (ctx, _) = context(fixture.path());
    let description = node(
        r#"{"name": "runway", "inherits-from": "Effects/terrain-default", "parameters": {"bin": 4}}"#,
    );

    let effect = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");

    assert_eq!(effect.name(), "runway");
    let pass = &effect.techniques()[0].passes[0];
    assert_eq!(pass.cull_face, Some(CullFace::Back));
    assert_eq!(pass.bin_number(), 4);
    assert!(ctx.library().contains("Effects/terrain-default"));
}

#[test]
fn inheritance_cycle_is_a_build_error() {
    init_logger();
    let fixture = Fixture::new("cycle");
    let (ctx, _) = context(fixture.path());
    ctx.library().register("a", node(r#"{"inherits-from": "b"}"#));
    ctx.library().register("b", node(r#"{"inherits-from": "c"}"#));
    ctx.library().register("c", node(r#"{"inherits-from": "a"}"#));

    let error = ctx.make_effect("a", false).expect_err("A cycle must not resolve.");

    let build = error
        .downcast_ref::<BuildError>()
        .expect("Expected a build error.");
    assert!(build.message.contains("cycle"));
}

#[test]
fn missing_parent_is_a_build_error() {
    init_logger();
    let fixture = Fixture::new("missing-parent");
    let (ctx, _) = context(fixture.path());

    let result = ctx.make_effect_from_node(&node(r#"{"inherits-from": "Effects/nowhere"}"#), true);

    assert!(result.is_err());
}

#[test]
fn scheme_fallback_supplies_missing_techniques() {
    init_logger();
    let fixture = Fixture::new("schemes");
    let (ctx, _) = context(fixture.path());
    let ctx = ctx.with_scheme_table(SchemeTable::new(vec![Scheme {
        name: "shadow-map".to_string(),
        fallback: Some("shadow-fallback".to_string()),
    }]));
    ctx.library().register(
        "shadow-fallback",
        node(
            r#"{"technique": {"@index": 11, "scheme": "shadow-map",
                "pass": {"color-mask": [0, 0, 0, 0], "render-bin": {"bin-number": -1}}}}"#,
        ),
    );

    let plain = ctx
        .make_effect_from_node(&node(r#"{"technique": {"pass": {"cull-face": "back"}}}"#), true)
        .expect("Effect failed to build.");
    let own = ctx
        .make_effect_from_node(
            &node(r#"{"technique": {"scheme": "shadow-map", "pass": {"cull-face": "front"}}}"#),
            true,
        )
        .expect("Effect failed to build.");

    assert_eq!(plain.techniques().len(), 2);
    let shadow = plain
        .choose_technique("shadow-map", 0, ctx.probes())
        .expect("Fallback technique missing.");
    assert_eq!(shadow.passes[0].bin_number(), -1);
    assert_eq!(shadow.passes[0].color_mask, Some(wgpu::ColorWrites::empty()));
    assert!(plain.choose_technique("", 0, ctx.probes()).is_some());

    // An effect that implements the scheme itself keeps its own technique.
    assert_eq!(own.techniques().len(), 1);
    let shadow = own
        .choose_technique("shadow-map", 0, ctx.probes())
        .expect("Own technique missing.");
    assert_eq!(shadow.passes[0].cull_face, Some(CullFace::Front));
}

#[test]
fn identical_descriptions_share_one_live_effect() {
    init_logger();
    let fixture = Fixture::new("effect-cache");
    let (ctx, _) = context(fixture.path());
    let description = node(r#"{"technique": {"pass": {"cull-face": "back"}}}"#);

    let a = ctx
        .make_effect_from_node(&description, false)
        .expect("Effect failed to build.");
    let b = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.is_realized());
    assert_eq!(ctx.effects().live_count(), 1);

    drop(a);
    drop(b);
    assert_eq!(ctx.effects().live_count(), 0);
    assert_eq!(ctx.effects().purge(), 1);

    let c = ctx
        .make_effect_from_node(&description, false)
        .expect("Effect failed to build.");
    assert!(!c.is_realized());
}

#[test]
fn auxiliary_pass_state_is_recorded() {
    init_logger();
    let fixture = Fixture::new("auxiliary");
    fixture.write("shaders/grass.vert", "// vertex");
    fixture.write("shaders/grass.geom", "// geometry");
    let (ctx, backend) = context(fixture.path());
    let description = node(
        r#"{"technique": {"pass": {
            "program": {
                "vertex-shader": "shaders/grass.vert",
                "geometry-shader": "shaders/grass.geom",
                "geometry-vertices-out": 12,
                "geometry-input-type": "triangles",
                "geometry-output-type": "triangle-strip",
                "uniform-block-binding": {"name": "Lights", "index": 2}
            },
            "buffer-unit": [
                {"unit": 4, "buffer": "depth"},
                {"unit": 5, "buffer": "normals"}
            ],
            "uniform": {"name": "sunPosition", "type": "float-vec3", "value": [1, 2, 3], "positioned": true},
            "texture-unit": {"unit": 0, "image": "blades.png", "texenv-combine": {"combine-rgb": "modulate"}}
        }}}"#,
    );

    let effect = ctx
        .make_effect_from_node(&description, true)
        .expect("Effect failed to build.");

    assert!(effect.diagnostics().is_empty());
    let pass = &effect.techniques()[0].passes[0];
    let program = pass.program.as_ref().expect("Pass has no program.");
    let parameters = program.parameters();
    assert_eq!(parameters.geometry_vertices_out, Some(12));
    assert_eq!(parameters.geometry_input_type.as_deref(), Some("triangles"));
    assert_eq!(parameters.geometry_output_type.as_deref(), Some("triangle-strip"));
    assert_eq!(parameters.uniform_block_bindings, vec![("Lights".to_string(), 2)]);
    assert_eq!(backend.compiled(), 2);

    let buffers: Vec<(u32, &str)> = pass
        .buffer_units
        .iter()
        .map(|b| (b.unit, b.buffer.as_str()))
        .collect();
    assert_eq!(buffers, vec![(4, "depth"), (5, "normals")]);
    assert_eq!(pass.positioned_uniforms, vec!["sunPosition".to_string()]);
    assert_eq!(
        pass.uniform("sunPosition").map(|u| u.as_f32s()),
        Some(vec![1.0, 2.0, 3.0])
    );
    assert!(pass.texture_units[&0].combine.contains_key("combine-rgb"));
}
