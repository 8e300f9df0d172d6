//! Render state collected for one pass.
//!
//! Every field is optional: `None` means the pass leaves that piece of state
//! to whatever the renderer inherits. Builders in [`super::builders`] fill the
//! fields in from the effect description.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    data_structures::texture::{SamplerState, Texture},
    resources::{shader::Program, uniform::Uniform},
};

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub emissive: [f32; 4],
    pub shininess: f32,
    pub color_mode: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            emissive: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.0,
            color_mode: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blend {
    /// `None` turns blending off for the pass.
    pub state: Option<wgpu::BlendState>,
    pub constant: Option<[f32; 4]>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlphaTest {
    pub enabled: bool,
    pub comparison: wgpu::CompareFunction,
    pub reference: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stencil {
    pub state: wgpu::StencilState,
    pub reference: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Depth {
    pub enabled: bool,
    pub compare: wgpu::CompareFunction,
    pub write_enabled: bool,
    pub near: f32,
    pub far: f32,
}

impl Default for Depth {
    fn default() -> Self {
        Self {
            enabled: true,
            compare: wgpu::CompareFunction::Less,
            write_enabled: true,
            near: 0.0,
            far: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullFace {
    Off,
    Front,
    Back,
    FrontAndBack,
}

impl CullFace {
    /// The face wgpu should cull. wgpu can't cull both faces, so
    /// `FrontAndBack` maps to `Back` and the pass is expected to draw nothing
    /// visible anyway.
    pub fn to_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullFace::Off => None,
            CullFace::Front => Some(wgpu::Face::Front),
            CullFace::Back | CullFace::FrontAndBack => Some(wgpu::Face::Back),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolygonModes {
    pub front: wgpu::PolygonMode,
    pub back: wgpu::PolygonMode,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub size: f32,
    pub min_size: Option<f32>,
    pub max_size: Option<f32>,
    pub distance_attenuation: Option<[f32; 3]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderingHint {
    Default,
    Opaque,
    Transparent,
}

impl RenderingHint {
    pub fn default_bin(self) -> i32 {
        match self {
            RenderingHint::Transparent => 10,
            RenderingHint::Default | RenderingHint::Opaque => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderBin {
    pub number: i32,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    D1,
    D2,
    D3,
    Cubemap,
    White,
    Transparent,
}

impl TextureKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "1d" => TextureKind::D1,
            "2d" => TextureKind::D2,
            "3d" => TextureKind::D3,
            "cubemap" => TextureKind::Cubemap,
            "white" => TextureKind::White,
            "transparent" => TextureKind::Transparent,
            _ => return None,
        })
    }

    pub fn view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            TextureKind::D1 => wgpu::TextureViewDimension::D1,
            TextureKind::D3 => wgpu::TextureViewDimension::D3,
            TextureKind::Cubemap => wgpu::TextureViewDimension::Cube,
            _ => wgpu::TextureViewDimension::D2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextureUnit {
    pub name: String,
    pub unit: u32,
    pub kind: TextureKind,
    pub texture: Arc<Texture>,
    pub sampler: SamplerState,
    pub environment: Option<String>,
    pub combine: BTreeMap<String, String>,
    pub texgen: BTreeMap<String, String>,
}

/// A named texture bound later, once the buffer it names exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferUnit {
    pub unit: u32,
    pub buffer: String,
}

#[derive(Clone, Debug, Default)]
pub struct Pass {
    pub name: String,
    pub material: Option<Material>,
    pub blend: Option<Blend>,
    pub alpha_test: Option<AlphaTest>,
    pub stencil: Option<Stencil>,
    pub depth: Option<Depth>,
    pub cull_face: Option<CullFace>,
    pub color_mask: Option<wgpu::ColorWrites>,
    pub polygon_mode: Option<PolygonModes>,
    pub polygon_offset: Option<PolygonOffset>,
    pub point: Option<Point>,
    pub rendering_hint: Option<RenderingHint>,
    pub render_bin: Option<RenderBin>,
    pub program: Option<Arc<Program>>,
    pub texture_units: BTreeMap<u32, TextureUnit>,
    pub uniforms: BTreeMap<String, Arc<Uniform>>,
    pub buffer_units: Vec<BufferUnit>,
    /// Names of uniforms whose value is a position to transform at draw time.
    pub positioned_uniforms: Vec<String>,
}

impl Pass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Bin the renderer sorts this pass into.
    pub fn bin_number(&self) -> i32 {
        match (&self.render_bin, self.rendering_hint) {
            (Some(bin), _) => bin.number,
            (None, Some(hint)) => hint.default_bin(),
            (None, None) => 0,
        }
    }

    pub fn uniform(&self, name: &str) -> Option<&Arc<Uniform>> {
        self.uniforms.get(name)
    }
}
