//! Landclass materials and their regional variants.
//!
//! A material library is a JSON document:
//!
//! ```json
//! {
//!   "landclasses": { "1": "Grass", "2": "Water" },
//!   "regions": [
//!     { "name": "global", "materials": [ { "name": "Grass", "tree": { "coverage": 400.0 } } ] },
//!     { "name": "alps", "bounds": [5.0, 45.0, 16.0, 48.0], "condition": "/sim/rendering/alpine",
//!       "materials": [ { "name": "Grass", "skirt_height": 20.0 } ] }
//!   ]
//! }
//! ```
//!
//! Looking a material up by name returns the variant of the smallest region
//! containing the point whose condition holds; among equally small regions the
//! one declared last wins. Regions without bounds cover everything.

use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::Context as _;
use cgmath::Vector2;
use serde::{Deserialize, Serialize};

use crate::{
    data_structures::property_root::PropertyRoot, resources::SearchPath, terrain::layer::Bounds,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSettings {
    /// Ground area per tree.
    pub coverage: f64,
    pub texture: String,
    pub height: f32,
    pub width: f32,
    /// Visibility range, falls back to the scatter configuration.
    pub range: Option<f32>,
    /// Texture variants packed side by side in `texture`.
    pub varieties: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingSettings {
    pub coverage: f64,
    pub texture: String,
    pub min_width: f32,
    pub max_width: f32,
    pub min_depth: f32,
    pub max_depth: f32,
    pub min_height: f32,
    pub max_height: f32,
    pub range: Option<f32>,
}

impl Default for BuildingSettings {
    fn default() -> Self {
        Self {
            coverage: 0.0,
            texture: String::new(),
            min_width: 8.0,
            max_width: 15.0,
            min_depth: 8.0,
            max_depth: 15.0,
            min_height: 3.0,
            max_height: 9.0,
            range: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSettings {
    pub coverage: f64,
    pub size: f32,
    pub color: [f32; 4],
    pub range: Option<f32>,
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            coverage: 0.0,
            size: 1.0,
            color: [1.0, 0.9, 0.7, 1.0],
            range: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Heading {
    #[default]
    Random,
    Fixed,
    /// Taken from the red channel of the object mask.
    Mask,
}

/// A model scattered at random on this material.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomObject {
    pub model: String,
    pub coverage: f64,
    /// Footprint radius used for spacing checks.
    pub spacing: f64,
    pub range: Option<f32>,
    pub heading: Heading,
}

impl Default for RandomObject {
    fn default() -> Self {
        Self {
            model: String::new(),
            coverage: 0.0,
            spacing: 5.0,
            range: None,
            heading: Heading::Random,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub name: String,
    pub water: bool,
    /// Height of the skirt hung below the tile perimeter.
    pub skirt_height: Option<f64>,
    pub tree: Option<TreeSettings>,
    pub building: Option<BuildingSettings>,
    pub light: Option<LightSettings>,
    pub objects: Vec<RandomObject>,
    /// Image gating scatter per texel, resolved on the search path.
    pub object_mask: Option<String>,
    /// Slope cosine below which nothing is placed.
    pub zero_density_cos: f64,
    /// Slope cosine above which density is unattenuated.
    pub max_density_cos: f64,
    #[serde(skip)]
    pub mask: Option<Arc<image::RgbaImage>>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            water: false,
            skirt_height: None,
            tree: None,
            building: None,
            light: None,
            objects: Vec::new(),
            object_mask: None,
            zero_density_cos: 0.707,
            max_density_cos: 0.866,
            mask: None,
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn water(name: impl Into<String>) -> Self {
        Self {
            water: true,
            ..Self::new(name)
        }
    }

    pub fn with_mask(mut self, mask: image::RgbaImage) -> Self {
        self.mask = Some(Arc::new(mask));
        self
    }

    /// Whether this material scatters anything at all.
    pub fn scatters(&self) -> bool {
        self.tree.as_ref().is_some_and(|t| t.coverage > 0.0)
            || self.building.as_ref().is_some_and(|b| b.coverage > 0.0)
            || self.light.as_ref().is_some_and(|l| l.coverage > 0.0)
            || self.objects.iter().any(|o| o.coverage > 0.0)
    }
}

#[derive(Clone, Debug)]
pub struct MaterialRegion {
    pub name: String,
    pub bounds: Option<Bounds>,
    /// Boolean property that must be set for the region to apply.
    pub condition: Option<String>,
    pub materials: Vec<Arc<Material>>,
}

impl MaterialRegion {
    pub fn global(name: impl Into<String>, materials: Vec<Material>) -> Self {
        Self {
            name: name.into(),
            bounds: None,
            condition: None,
            materials: materials.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn bounded(name: impl Into<String>, bounds: Bounds, materials: Vec<Material>) -> Self {
        Self {
            bounds: Some(bounds),
            ..Self::global(name, materials)
        }
    }

    pub fn with_condition(mut self, property: impl Into<String>) -> Self {
        self.condition = Some(property.into());
        self
    }

    fn applies(&self, point: Vector2<f64>, properties: Option<&PropertyRoot>) -> bool {
        let inside = self.bounds.is_none_or(|b| b.contains(point));
        let enabled = match &self.condition {
            None => true,
            Some(path) => properties.and_then(|p| p.get_bool(path)).unwrap_or(false),
        };
        inside && enabled
    }

    fn area(&self) -> f64 {
        self.bounds.map_or(f64::INFINITY, |b| b.area())
    }
}

#[derive(Deserialize)]
struct RegionDocument {
    name: String,
    #[serde(default)]
    bounds: Option<[f64; 4]>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    materials: Vec<Material>,
}

#[derive(Deserialize)]
struct LibraryDocument {
    #[serde(default)]
    landclasses: HashMap<String, String>,
    #[serde(default)]
    regions: Vec<RegionDocument>,
}

#[derive(Clone, Debug, Default)]
pub struct MaterialLibrary {
    regions: Vec<MaterialRegion>,
    landclasses: HashMap<u8, String>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a library document. Object masks are loaded from `search_path`;
    /// a mask that can't be found is logged and left out.
    pub fn load(path: &Path, search_path: &SearchPath) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading materials {}", path.display()))?;
        let document: LibraryDocument = serde_json::from_str(&text)
            .with_context(|| format!("parsing materials {}", path.display()))?;

        let mut library = Self::new();
        for (code, name) in document.landclasses {
            let code: u8 = code
                .parse()
                .with_context(|| format!("landclass code '{code}' in {}", path.display()))?;
            library.landclasses.insert(code, name);
        }
        for region in document.regions {
            let materials = region
                .materials
                .into_iter()
                .map(|m| Self::load_mask(m, search_path))
                .map(Arc::new)
                .collect();
            library.regions.push(MaterialRegion {
                name: region.name,
                bounds: region
                    .bounds
                    .map(|[x0, y0, x1, y1]| Bounds::new(Vector2::new(x0, y0), Vector2::new(x1, y1))),
                condition: region.condition,
                materials,
            });
        }
        log::info!(
            "Loaded {} material region(s), {} landclass(es) from {}",
            library.regions.len(),
            library.landclasses.len(),
            path.display()
        );
        Ok(library)
    }

    fn load_mask(mut material: Material, search_path: &SearchPath) -> Material {
        let Some(name) = &material.object_mask else {
            return material;
        };
        let loaded = search_path
            .resolve(name)
            .ok_or_else(|| anyhow::anyhow!("not on the search path"))
            .and_then(|p| Ok(image::open(&p)?.to_rgba8()));
        match loaded {
            Ok(mask) => material.mask = Some(Arc::new(mask)),
            Err(e) => log::warn!("Material {}: object mask {name}: {e:#}", material.name),
        }
        material
    }

    pub fn push_region(&mut self, region: MaterialRegion) {
        self.regions.push(region);
    }

    pub fn map_landclass(&mut self, code: u8, material: impl Into<String>) {
        self.landclasses.insert(code, material.into());
    }

    pub fn regions(&self) -> &[MaterialRegion] {
        &self.regions
    }

    pub fn landclass_name(&self, code: u8) -> Option<&str> {
        self.landclasses.get(&code).map(String::as_str)
    }

    /// The most specific applicable variant of `name` at `point`.
    pub fn find(
        &self,
        name: &str,
        point: Vector2<f64>,
        properties: Option<&PropertyRoot>,
    ) -> Option<Arc<Material>> {
        let mut best: Option<(f64, &Arc<Material>)> = None;
        for region in self.regions.iter().filter(|r| r.applies(point, properties)) {
            let Some(material) = region.materials.iter().rev().find(|m| m.name == name) else {
                continue;
            };
            let area = region.area();
            if best.is_none_or(|(a, _)| area <= a) {
                best = Some((area, material));
            }
        }
        best.map(|(_, m)| m.clone())
    }

    pub fn for_landclass(
        &self,
        code: u8,
        point: Vector2<f64>,
        properties: Option<&PropertyRoot>,
    ) -> Option<Arc<Material>> {
        self.find(self.landclass_name(code)?, point, properties)
    }
}
