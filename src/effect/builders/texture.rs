use std::{collections::BTreeMap, sync::Arc};

use crate::{
    data_structures::{
        config_node::ConfigNode,
        texture::{SamplerState, Texture},
    },
    effect::{
        builders::BuildContext,
        pass::{BufferUnit, Pass, TextureKind, TextureUnit},
    },
    error::build_error,
    resources::texture::Placeholder,
};

fn address_mode(name: &str) -> Option<wgpu::AddressMode> {
    Some(match name {
        "repeat" => wgpu::AddressMode::Repeat,
        "clamp" | "clamp-to-edge" => wgpu::AddressMode::ClampToEdge,
        "clamp-to-border" => wgpu::AddressMode::ClampToBorder,
        "mirror" | "mirrored-repeat" => wgpu::AddressMode::MirrorRepeat,
        _ => return None,
    })
}

/// Splits a filter name into its texel and mipmap filters, e.g.
/// `linear-mipmap-nearest`.
fn filter(name: &str) -> Option<(wgpu::FilterMode, Option<wgpu::FilterMode>)> {
    let mode = |n: &str| match n {
        "nearest" => Some(wgpu::FilterMode::Nearest),
        "linear" => Some(wgpu::FilterMode::Linear),
        _ => None,
    };
    match name.split_once("-mipmap-") {
        Some((texel, mip)) => Some((mode(texel)?, Some(mode(mip)?))),
        None => Some((mode(name)?, None)),
    }
}

/// Leaf children of `node` as strings, for state recorded but not
/// interpreted here.
fn record(node: &ConfigNode, ctx: &BuildContext) -> anyhow::Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for child in node.children() {
        let key = if child.index() == 0 {
            child.name().to_string()
        } else {
            format!("{}[{}]", child.name(), child.index())
        };
        out.insert(key, ctx.resolver.value(child)?.serialize());
    }
    Ok(out)
}

fn sampler(node: &ConfigNode, ctx: &BuildContext) -> anyhow::Result<SamplerState> {
    let r = &ctx.resolver;
    let mut state = SamplerState::default();
    for (child, slot) in [
        ("wrap-s", &mut state.address_mode_u),
        ("wrap-t", &mut state.address_mode_v),
        ("wrap-r", &mut state.address_mode_w),
    ] {
        if let Some(name) = r.child_string(node, child)? {
            *slot = match address_mode(&name) {
                Some(mode) => mode,
                None => return build_error(format!("unknown {child} '{name}'"), "texture-unit"),
            };
        }
    }
    if let Some(name) = r.child_string(node, "filter")? {
        let Some((min, mip)) = filter(&name) else {
            return build_error(format!("unknown filter '{name}'"), "texture-unit");
        };
        state.min_filter = min;
        if let Some(mip) = mip {
            state.mipmap_filter = mip;
        }
    }
    if let Some(name) = r.child_string(node, "mag-filter")? {
        match filter(&name) {
            Some((mag, None)) => state.mag_filter = mag,
            _ => return build_error(format!("invalid mag-filter '{name}'"), "texture-unit"),
        }
    }
    Ok(state)
}

/// Builds one texture unit. Units without an explicit `unit` or `name` take
/// their position among the pass's texture units.
pub fn build_texture_unit(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let r = &ctx.resolver;
    let position = prop.index();
    let unit = match r.child_i64(node, "unit")? {
        Some(u) if u >= 0 => u as u32,
        Some(u) => return build_error(format!("negative texture unit {u}"), "texture-unit"),
        None => position as u32,
    };
    let name = r
        .child_string(node, "name")?
        .unwrap_or_else(|| position.to_string());
    let type_name = r
        .child_string(node, "type")?
        .unwrap_or_else(|| "2d".to_string());
    let Some(kind) = TextureKind::from_name(&type_name) else {
        return build_error(format!("unknown texture type '{type_name}'"), "texture-unit");
    };

    let texture = match kind {
        TextureKind::White => Arc::new(Texture::white()),
        TextureKind::Transparent => Arc::new(Texture::transparent()),
        _ => {
            let Some(image) = r.child_string(node, "image")? else {
                return build_error(
                    format!("texture-unit {name} of type {type_name} needs an image"),
                    "texture-unit",
                );
            };
            let is_normal_map = r.child_bool(node, "normal-map")?.unwrap_or(false);
            ctx.resources
                .textures
                .get_or_load(&image, ctx.search_path, is_normal_map, Placeholder::White)
        }
    };

    let environment = match node.child("environment") {
        Some(env) => match r.value(env)?.as_str() {
            Some(mode) => Some(mode.to_string()),
            None => r.child_string(r.node(env)?, "mode")?,
        },
        None => None,
    };
    let combine = match node.child("texenv-combine") {
        Some(c) => record(r.node(c)?, ctx)?,
        None => BTreeMap::new(),
    };
    let texgen = match node.child("texgen") {
        Some(t) => record(r.node(t)?, ctx)?,
        None => BTreeMap::new(),
    };

    pass.texture_units.insert(
        unit,
        TextureUnit {
            name,
            unit,
            kind,
            texture,
            sampler: sampler(node, ctx)?,
            environment,
            combine,
            texgen,
        },
    );
    Ok(())
}

/// A texture unit bound to a named render buffer once that exists.
pub fn build_buffer_unit(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<()> {
    let node = ctx.resolver.node(prop)?;
    let unit = ctx.resolver.child_i64(node, "unit")?;
    let buffer = ctx.resolver.child_string(node, "buffer")?;
    match (unit, buffer) {
        (Some(unit), Some(buffer)) if unit >= 0 => {
            pass.buffer_units.retain(|b| b.unit != unit as u32);
            pass.buffer_units.push(BufferUnit {
                unit: unit as u32,
                buffer,
            });
            Ok(())
        }
        _ => build_error("buffer-unit needs a unit and a buffer name", "buffer-unit"),
    }
}
