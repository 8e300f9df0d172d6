//! Fixed-function state attributes: material, blending, depth, stencil and
//! friends.

use crate::{
    data_structures::config_node::ConfigNode,
    effect::{
        builders::BuildContext,
        pass::{
            AlphaTest, Blend, CullFace, Pass, Point, PolygonModes, PolygonOffset,
            RenderBin, RenderingHint, Stencil,
        },
    },
    error::build_error,
};

pub fn compare_function(name: &str) -> Option<wgpu::CompareFunction> {
    use wgpu::CompareFunction as C;
    Some(match name {
        "never" => C::Never,
        "less" => C::Less,
        "equal" => C::Equal,
        "lequal" | "less-equal" => C::LessEqual,
        "greater" => C::Greater,
        "notequal" | "not-equal" => C::NotEqual,
        "gequal" | "greater-equal" => C::GreaterEqual,
        "always" => C::Always,
        _ => return None,
    })
}

fn blend_factor(name: &str) -> Option<wgpu::BlendFactor> {
    use wgpu::BlendFactor as F;
    Some(match name {
        "zero" => F::Zero,
        "one" => F::One,
        "src-color" => F::Src,
        "one-minus-src-color" => F::OneMinusSrc,
        "src-alpha" => F::SrcAlpha,
        "one-minus-src-alpha" => F::OneMinusSrcAlpha,
        "dst-color" => F::Dst,
        "one-minus-dst-color" => F::OneMinusDst,
        "dst-alpha" => F::DstAlpha,
        "one-minus-dst-alpha" => F::OneMinusDstAlpha,
        "src-alpha-saturate" => F::SrcAlphaSaturated,
        "constant-color" | "constant-alpha" => F::Constant,
        "one-minus-constant-color" | "one-minus-constant-alpha" => F::OneMinusConstant,
        _ => return None,
    })
}

fn blend_operation(name: &str) -> Option<wgpu::BlendOperation> {
    use wgpu::BlendOperation as O;
    Some(match name {
        "add" => O::Add,
        "subtract" => O::Subtract,
        "reverse-subtract" => O::ReverseSubtract,
        "min" => O::Min,
        "max" => O::Max,
        _ => return None,
    })
}

fn stencil_operation(name: &str) -> Option<wgpu::StencilOperation> {
    use wgpu::StencilOperation as S;
    Some(match name {
        "keep" => S::Keep,
        "zero" => S::Zero,
        "replace" => S::Replace,
        "incr" => S::IncrementClamp,
        "decr" => S::DecrementClamp,
        "invert" => S::Invert,
        "incr-wrap" => S::IncrementWrap,
        "decr-wrap" => S::DecrementWrap,
        _ => return None,
    })
}

fn polygon_mode(name: &str) -> Option<wgpu::PolygonMode> {
    Some(match name {
        "fill" => wgpu::PolygonMode::Fill,
        "line" => wgpu::PolygonMode::Line,
        "point" => wgpu::PolygonMode::Point,
        _ => return None,
    })
}

/// Looks `child` up under `prop` and maps it through `parse`, turning an
/// unknown name into a build error.
fn named<T>(
    prop: &ConfigNode,
    child: &str,
    ctx: &BuildContext,
    parse: fn(&str) -> Option<T>,
) -> anyhow::Result<Option<T>> {
    let Some(name) = ctx.resolver.child_string(prop, child)? else {
        return Ok(None);
    };
    match parse(&name) {
        Some(v) => Ok(Some(v)),
        None => build_error(format!("unknown {child} '{name}'"), prop.name()),
    }
}

fn color(values: [f64; 4]) -> [f32; 4] {
    values.map(|c| c as f32)
}

pub fn build_name(pass: &mut Pass, prop: &ConfigNode, ctx: &BuildContext) -> anyhow::Result<()> {
    if let Some(name) = ctx.resolver.value(prop)?.as_str() {
        pass.name = name.to_string();
    }
    Ok(())
}

pub fn build_material(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let r = &ctx.resolver;
    let mut material = pass.material.clone().unwrap_or_default();
    if let Some(c) = r.child_vec4(node, "ambient")? {
        material.ambient = color(c);
    }
    if let Some(c) = r.child_vec4(node, "diffuse")? {
        material.diffuse = color(c);
    }
    if let Some(c) = r.child_vec4(node, "specular")? {
        material.specular = color(c);
    }
    if let Some(c) = r.child_vec4(node, "emissive")? {
        material.emissive = color(c);
    }
    if let Some(s) = r.child_f64(node, "shininess")? {
        material.shininess = s as f32;
    }
    if let Some(mode) = r.child_string(node, "color-mode")? {
        material.color_mode = Some(mode);
    }
    pass.material = Some(material);
    Ok(())
}

pub fn build_blend(pass: &mut Pass, prop: &ConfigNode, ctx: &BuildContext) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    if node.is_leaf() || node.child("use").is_some() {
        let enabled = ctx.resolver.value(prop)?.as_bool().unwrap_or(false);
        pass.blend = Some(Blend {
            state: enabled.then_some(wgpu::BlendState::ALPHA_BLENDING),
            constant: None,
        });
        return Ok(());
    }
    if let Some(false) = ctx.resolver.child_bool(node, "mode")? {
        pass.blend = Some(Blend {
            state: None,
            constant: None,
        });
        return Ok(());
    }
    let source = named(node, "source", ctx, blend_factor)?;
    let destination = named(node, "destination", ctx, blend_factor)?;
    let operation =
        named(node, "equation", ctx, blend_operation)?.unwrap_or(wgpu::BlendOperation::Add);
    let rgb = wgpu::BlendComponent {
        src_factor: named(node, "source-rgb", ctx, blend_factor)?
            .or(source)
            .unwrap_or(wgpu::BlendFactor::SrcAlpha),
        dst_factor: named(node, "destination-rgb", ctx, blend_factor)?
            .or(destination)
            .unwrap_or(wgpu::BlendFactor::OneMinusSrcAlpha),
        operation,
    };
    let alpha = wgpu::BlendComponent {
        src_factor: named(node, "source-alpha", ctx, blend_factor)?
            .or(source)
            .unwrap_or(wgpu::BlendFactor::One),
        dst_factor: named(node, "destination-alpha", ctx, blend_factor)?
            .or(destination)
            .unwrap_or(wgpu::BlendFactor::OneMinusSrcAlpha),
        operation,
    };
    pass.blend = Some(Blend {
        state: Some(wgpu::BlendState { color: rgb, alpha }),
        constant: ctx.resolver.child_vec4(node, "constant-color")?.map(color),
    });
    Ok(())
}

pub fn build_alpha_test(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    if node.is_leaf() || node.child("use").is_some() {
        let enabled = ctx.resolver.value(prop)?.as_bool().unwrap_or(false);
        pass.alpha_test = Some(AlphaTest {
            enabled,
            comparison: wgpu::CompareFunction::Greater,
            reference: 0.0,
        });
        return Ok(());
    }
    pass.alpha_test = Some(AlphaTest {
        enabled: true,
        comparison: named(node, "comparison", ctx, compare_function)?
            .unwrap_or(wgpu::CompareFunction::Always),
        reference: ctx.resolver.child_f64(node, "reference")?.unwrap_or(0.0) as f32,
    });
    Ok(())
}

pub fn build_stencil(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let r = &ctx.resolver;
    let face = wgpu::StencilFaceState {
        compare: named(node, "function", ctx, compare_function)?
            .unwrap_or(wgpu::CompareFunction::Always),
        fail_op: named(node, "stencil-fail", ctx, stencil_operation)?
            .unwrap_or(wgpu::StencilOperation::Keep),
        depth_fail_op: named(node, "z-fail", ctx, stencil_operation)?
            .unwrap_or(wgpu::StencilOperation::Keep),
        pass_op: named(node, "pass", ctx, stencil_operation)?
            .unwrap_or(wgpu::StencilOperation::Keep),
    };
    let mask = r.child_i64(node, "mask")?.unwrap_or(0xff) as u32;
    pass.stencil = Some(Stencil {
        state: wgpu::StencilState {
            front: face,
            back: face,
            read_mask: mask,
            write_mask: r.child_i64(node, "write-mask")?.map_or(mask, |m| m as u32),
        },
        reference: r.child_i64(node, "value")?.unwrap_or(0) as u32,
    });
    Ok(())
}

pub fn build_depth(pass: &mut Pass, prop: &ConfigNode, ctx: &BuildContext) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let r = &ctx.resolver;
    let mut depth = pass.depth.unwrap_or_default();
    if node.is_leaf() || node.child("use").is_some() {
        depth.enabled = r.value(prop)?.as_bool().unwrap_or(true);
        pass.depth = Some(depth);
        return Ok(());
    }
    if let Some(enabled) = r.child_bool(node, "enabled")? {
        depth.enabled = enabled;
    }
    if let Some(compare) = named(node, "function", ctx, compare_function)? {
        depth.compare = compare;
    }
    if let Some(write) = r.child_bool(node, "write-mask")? {
        depth.write_enabled = write;
    }
    if let Some(near) = r.child_f64(node, "near")? {
        depth.near = near as f32;
    }
    if let Some(far) = r.child_f64(node, "far")? {
        depth.far = far as f32;
    }
    pass.depth = Some(depth);
    Ok(())
}

pub fn build_cull_face(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let value = ctx.resolver.value(prop)?;
    pass.cull_face = Some(match value.as_str() {
        Some("front") => CullFace::Front,
        Some("back") => CullFace::Back,
        Some("front-back") => CullFace::FrontAndBack,
        Some("off") => CullFace::Off,
        other => {
            return build_error(
                format!("invalid cull-face '{}'", other.unwrap_or_default()),
                "cull-face",
            );
        }
    });
    Ok(())
}

pub fn build_color_mask(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let value = ctx.resolver.value(prop)?;
    let mask = match value.as_vec4() {
        Some(v) => v.map(|c| c != 0.0),
        None => {
            let flags: Vec<bool> = value
                .serialize()
                .split_whitespace()
                .map(|t| matches!(t, "true" | "1"))
                .collect();
            match flags.as_slice() {
                [r, g, b, a] => [*r, *g, *b, *a],
                _ => return build_error(format!("invalid color-mask '{value}'"), "color-mask"),
            }
        }
    };
    let mut writes = wgpu::ColorWrites::empty();
    for (enabled, bit) in mask.into_iter().zip([
        wgpu::ColorWrites::RED,
        wgpu::ColorWrites::GREEN,
        wgpu::ColorWrites::BLUE,
        wgpu::ColorWrites::ALPHA,
    ]) {
        if enabled {
            writes |= bit;
        }
    }
    pass.color_mask = Some(writes);
    Ok(())
}

pub fn build_polygon_mode(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let front = named(node, "front", ctx, polygon_mode)?.unwrap_or(wgpu::PolygonMode::Fill);
    let back = named(node, "back", ctx, polygon_mode)?.unwrap_or(front);
    pass.polygon_mode = Some(PolygonModes { front, back });
    Ok(())
}

pub fn build_polygon_offset(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let (Some(factor), Some(units)) = (
        ctx.resolver.child_f64(node, "factor")?,
        ctx.resolver.child_f64(node, "units")?,
    ) else {
        return build_error("polygon-offset needs factor and units", "polygon-offset");
    };
    pass.polygon_offset = Some(PolygonOffset {
        factor: factor as f32,
        units: units as f32,
    });
    Ok(())
}

pub fn build_point(pass: &mut Pass, prop: &ConfigNode, ctx: &BuildContext) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let r = &ctx.resolver;
    let attenuation = r.child_value(node, "distance-attenuation")?.and_then(|v| {
        let v = v.as_vec4()?;
        Some([v[0] as f32, v[1] as f32, v[2] as f32])
    });
    pass.point = Some(Point {
        size: r.child_f64(node, "size")?.unwrap_or(1.0) as f32,
        min_size: r.child_f64(node, "min-size")?.map(|s| s as f32),
        max_size: r.child_f64(node, "max-size")?.map(|s| s as f32),
        distance_attenuation: attenuation,
    });
    Ok(())
}

pub fn build_rendering_hint(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let value = ctx.resolver.value(prop)?;
    pass.rendering_hint = Some(match value.as_str() {
        Some("default") => RenderingHint::Default,
        Some("opaque") => RenderingHint::Opaque,
        Some("transparent") => RenderingHint::Transparent,
        _ => return build_error(format!("invalid rendering-hint '{value}'"), "rendering-hint"),
    });
    Ok(())
}

pub fn build_render_bin(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let Some(number) = ctx.resolver.child_i64(node, "bin-number")? else {
        return build_error("render-bin needs a bin-number", "render-bin");
    };
    pass.render_bin = Some(RenderBin {
        number: number as i32,
        name: ctx
            .resolver
            .child_string(node, "bin-name")?
            .unwrap_or_else(|| "RenderBin".to_string()),
    });
    Ok(())
}
