//! Engine configuration.
//!
//! Loads settings from a JSON document or falls back to defaults when the file
//! is missing. Every section has a `Default` so partial documents are fine.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub effects: EffectConfig,
    pub terrain: TerrainConfig,
    pub scatter: ScatterConfig,
}

impl EngineConfig {
    /// Reads `path`; a missing file yields the default configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Directories searched for effect descriptions, shaders and textures.
    pub search_paths: Vec<PathBuf>,
    /// Optional scheme → fallback-effect table, loaded lazily on first use.
    pub scheme_table: Option<PathBuf>,
    /// Upper bound on distinct graphics contexts tracked per technique.
    pub max_contexts: usize,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            scheme_table: None,
            max_contexts: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Mesh samples per elevation sample along each axis. Values other than 1
    /// switch sampling to bilinear interpolation.
    pub sample_ratio: f32,
    pub vertical_scale: f32,
    /// Share seam vertices with neighbouring tiles.
    pub boundary_stitching: bool,
    /// Skirt height used when a landclass material does not specify one.
    pub default_skirt_height: f64,
    /// Distance generated vertices are kept below constraint geometry.
    pub constraint_gap: f64,
    /// Height above a vertex the constraint probe ray starts at.
    pub constraint_probe_height: f64,
    /// Height above/below a feature point used when draping it on the mesh.
    pub feature_probe_height: f64,
    /// Lift applied to draped feature geometry to avoid z-fighting.
    pub feature_elevation_offset: f64,
    pub coastline_width: f64,
    /// How far the seaward edge of a coastline ribbon is pushed outward and up.
    pub coastline_tilt: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            sample_ratio: 1.0,
            vertical_scale: 1.0,
            boundary_stitching: true,
            default_skirt_height: 0.0,
            constraint_gap: 0.5,
            constraint_probe_height: 1000.0,
            feature_probe_height: 1000.0,
            feature_elevation_offset: 0.1,
            coastline_width: 150.0,
            coastline_tilt: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterConfig {
    /// Seed of the scatter random stream. The stream is seeded once per pass.
    pub seed: u64,
    pub tree_density: f64,
    pub building_density: f64,
    pub light_density: f64,
    pub object_density: f64,
    /// Fixed cell count per axis of the spatial index. `None` derives it from
    /// the instance count.
    pub grid_dimension: Option<usize>,
    pub max_grid_dimension: usize,
    /// Instances per leaf targeted when deriving the grid dimension.
    pub leaf_capacity: usize,
    pub tree_range: f32,
    pub building_range: f32,
    pub light_range: f32,
    pub object_range: f32,
    /// Minimum distance from a building to the edges of its triangle.
    pub building_edge_clearance: f64,
    /// Same for random objects.
    pub object_edge_clearance: f64,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            seed: 123,
            tree_density: 1.0,
            building_density: 1.0,
            light_density: 1.0,
            object_density: 1.0,
            grid_dimension: None,
            max_grid_dimension: 8,
            leaf_capacity: 512,
            tree_range: 8_000.0,
            building_range: 5_000.0,
            light_range: 20_000.0,
            object_range: 3_000.0,
            building_edge_clearance: 2.0,
            object_edge_clearance: 2.0,
        }
    }
}
