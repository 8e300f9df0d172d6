//! Pass attribute builders.
//!
//! Each attribute a pass may carry is one [`AttributeKind`]. The table below
//! maps the attribute's name in the effect description to its kind and to the
//! function that applies it to a [`Pass`]; supporting a new attribute is one
//! new table row.

use std::{collections::HashMap, sync::OnceLock};

use crate::{
    data_structures::config_node::ConfigNode,
    effect::{pass::Pass, property::PropertyResolver},
    resources::{ResourceCache, SearchPath, backend::GraphicsBackend},
};

pub mod program;
pub mod state;
pub mod texture;
pub mod uniform;

/// Everything a builder may consult while filling in a pass.
pub struct BuildContext<'a> {
    pub effect: &'a str,
    pub resolver: PropertyResolver<'a>,
    pub resources: &'a ResourceCache,
    pub backend: &'a dyn GraphicsBackend,
    pub search_path: &'a SearchPath,
}

pub type BuilderFn = fn(&mut Pass, &ConfigNode, &BuildContext) -> anyhow::Result<()>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Name,
    Material,
    Blend,
    AlphaTest,
    Stencil,
    Depth,
    CullFace,
    ColorMask,
    PolygonMode,
    PolygonOffset,
    Point,
    RenderingHint,
    RenderBin,
    Program,
    TextureUnit,
    Uniform,
    BufferUnit,
}

const ATTRIBUTES: &[(&str, AttributeKind, BuilderFn)] = &[
    ("name", AttributeKind::Name, state::build_name),
    ("material", AttributeKind::Material, state::build_material),
    ("blend", AttributeKind::Blend, state::build_blend),
    ("alpha-test", AttributeKind::AlphaTest, state::build_alpha_test),
    ("stencil", AttributeKind::Stencil, state::build_stencil),
    ("depth", AttributeKind::Depth, state::build_depth),
    ("cull-face", AttributeKind::CullFace, state::build_cull_face),
    ("color-mask", AttributeKind::ColorMask, state::build_color_mask),
    ("polygon-mode", AttributeKind::PolygonMode, state::build_polygon_mode),
    ("polygon-offset", AttributeKind::PolygonOffset, state::build_polygon_offset),
    ("point", AttributeKind::Point, state::build_point),
    ("rendering-hint", AttributeKind::RenderingHint, state::build_rendering_hint),
    ("render-bin", AttributeKind::RenderBin, state::build_render_bin),
    ("program", AttributeKind::Program, program::build_program),
    ("texture-unit", AttributeKind::TextureUnit, texture::build_texture_unit),
    ("uniform", AttributeKind::Uniform, uniform::build_uniform),
    ("buffer-unit", AttributeKind::BufferUnit, texture::build_buffer_unit),
];

fn table() -> &'static HashMap<&'static str, (AttributeKind, BuilderFn)> {
    static TABLE: OnceLock<HashMap<&'static str, (AttributeKind, BuilderFn)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        ATTRIBUTES
            .iter()
            .map(|(name, kind, builder)| (*name, (*kind, *builder)))
            .collect()
    })
}

impl AttributeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        table().get(name).map(|(kind, _)| *kind)
    }

    pub fn name(self) -> &'static str {
        ATTRIBUTES
            .iter()
            .find(|(_, kind, _)| *kind == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn all() -> impl Iterator<Item = AttributeKind> {
        ATTRIBUTES.iter().map(|(_, kind, _)| *kind)
    }
}

/// What happened to one attribute node of a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Built(AttributeKind),
    /// The attribute carried `active: false`.
    Inactive(AttributeKind),
    Unknown,
}

/// Applies one attribute node to `pass`.
///
/// Unknown attribute names are not errors; the caller decides how to report
/// them. A block whose `active` flag is false is skipped without touching the
/// pass.
pub fn apply_attribute(
    pass: &mut Pass,
    prop: &ConfigNode,
    ctx: &BuildContext,
) -> anyhow::Result<Applied> {
    let Some((kind, builder)) = table().get(prop.name()).copied() else {
        return Ok(Applied::Unknown);
    };
    if !ctx.resolver.is_active(prop)? {
        return Ok(Applied::Inactive(kind));
    }
    builder(pass, prop, ctx)?;
    Ok(Applied::Built(kind))
}
