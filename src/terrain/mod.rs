//! Procedural terrain tiles.
//!
//! [`TerrainWorld`] owns the loaded tiles and everything shared between them:
//! the elevation constraint set, the material library and the vector features
//! waiting to be draped. Tiles are rebuilt when their [`tile::DirtyMask`] is
//! non-empty; neighbours, constraints and features set those bits.
//!
//! - `layer`: elevation grids, landclass images and the locator
//! - `mesh`: vertex grid, land/water split and skirts
//! - `constraint`: geometry generated terrain is kept below
//! - `features`: roads, areas and coastlines draped on the mesh
//! - `material`: landclass materials by region
//! - `tile`: dirty state and double-buffered output

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use arc_swap::ArcSwap;
use cgmath::Vector2;

use crate::{
    config::{EngineConfig, ScatterConfig, TerrainConfig},
    data_structures::property_root::PropertyRoot,
    scatter::{Scatter, ScatterOutput, placement::Triangle},
    terrain::{
        constraint::{ConstraintId, ConstraintSet, ConstraintVolume},
        features::{AreaFeature, BucketId, Coastline, FeatureBucket, LineFeature},
        layer::{Bounds, ElevationLayer, LandclassLayer},
        material::MaterialLibrary,
        mesh::{GeneratedMesh, MeshInputs, Neighbors},
        tile::{DirtyMask, Side, SwapMode, TerrainTile, TileBuffer, TileId},
    },
};

pub mod constraint;
pub mod features;
pub mod layer;
pub mod material;
pub mod mesh;
pub mod tessellate;
pub mod tile;

pub struct TerrainWorld {
    config: TerrainConfig,
    scatter: ScatterConfig,
    constraints: ConstraintSet,
    materials: ArcSwap<MaterialLibrary>,
    properties: Option<Arc<PropertyRoot>>,
    tiles: RwLock<HashMap<TileId, Arc<TerrainTile>>>,
    features: RwLock<HashMap<BucketId, FeatureBucket>>,
}

impl TerrainWorld {
    pub fn new(config: &EngineConfig, materials: MaterialLibrary) -> Self {
        Self {
            config: config.terrain.clone(),
            scatter: config.scatter.clone(),
            constraints: ConstraintSet::new(),
            materials: ArcSwap::from_pointee(materials),
            properties: None,
            tiles: RwLock::new(HashMap::new()),
            features: RwLock::new(HashMap::new()),
        }
    }

    /// Live properties consulted by material region conditions.
    pub fn with_properties(mut self, properties: Arc<PropertyRoot>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn scatter_config(&self) -> &ScatterConfig {
        &self.scatter
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn materials(&self) -> Arc<MaterialLibrary> {
        self.materials.load_full()
    }

    /// Replaces the material library; every tile is rebuilt on the next
    /// regeneration.
    pub fn set_materials(&self, materials: MaterialLibrary) {
        self.materials.store(Arc::new(materials));
        for tile in self.tiles() {
            tile.mark_dirty(DirtyMask::ALL);
        }
    }

    pub fn tile(&self, id: TileId) -> Option<Arc<TerrainTile>> {
        self.tiles.read().ok()?.get(&id).cloned()
    }

    pub fn tiles(&self) -> Vec<Arc<TerrainTile>> {
        self.tiles
            .read()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Loads a tile, replacing any tile with the same id. The tile starts
    /// fully dirty and its neighbours' facing edges are flagged.
    pub fn add_tile(
        &self,
        id: TileId,
        elevation: ElevationLayer,
        landclass: Option<LandclassLayer>,
    ) -> Arc<TerrainTile> {
        let tile = Arc::new(TerrainTile::new(
            id,
            Arc::new(elevation),
            landclass.map(Arc::new),
        ));
        if let Ok(mut tiles) = self.tiles.write() {
            tiles.insert(id, tile.clone());
        }
        self.touch_neighbors(id);
        tile
    }

    pub fn remove_tile(&self, id: TileId) -> Option<Arc<TerrainTile>> {
        let removed = self.tiles.write().ok()?.remove(&id);
        if removed.is_some() {
            self.touch_neighbors(id);
        }
        removed
    }

    /// Flags the edges and corners of surrounding tiles that face `id`.
    fn touch_neighbors(&self, id: TileId) {
        if !self.config.boundary_stitching {
            return;
        }
        for side in Side::ALL {
            if let Some(neighbor) = self.tile(id.neighbor(side)) {
                neighbor.mark_dirty(side.opposite().edge());
            }
        }
        for vertical in [Side::South, Side::North] {
            for horizontal in [Side::West, Side::East] {
                if let Some(neighbor) = self.tile(id.diagonal(vertical, horizontal)) {
                    neighbor.mark_dirty(vertical.opposite().edge() | horizontal.opposite().edge());
                }
            }
        }
    }

    fn mark_intersecting(&self, bounds: &Bounds, mask: DirtyMask) -> usize {
        let mut marked = 0;
        for tile in self.tiles() {
            if tile.bounds().intersects(bounds) {
                tile.mark_dirty(mask);
                marked += 1;
            }
        }
        marked
    }

    /// Registers a constraint and flags every loaded tile under it.
    pub fn add_constraint(&self, volume: ConstraintVolume) -> ConstraintId {
        let bounds = volume.bounds();
        let id = self.constraints.add(Arc::new(volume));
        let marked = self.mark_intersecting(&bounds, DirtyMask::ALL);
        log::debug!("Constraint {id} added, {marked} tile(s) dirty");
        id
    }

    pub fn remove_constraint(&self, id: ConstraintId) -> bool {
        match self.constraints.remove(id) {
            Some(volume) => {
                let marked = self.mark_intersecting(&volume.bounds(), DirtyMask::ALL);
                log::debug!("Constraint {id} removed, {marked} tile(s) dirty");
                true
            }
            None => false,
        }
    }

    fn push_bucket(&self, bucket: BucketId, update: impl FnOnce(&mut FeatureBucket)) {
        let bounds = {
            let Ok(mut features) = self.features.write() else {
                return;
            };
            let entry = features.entry(bucket).or_default();
            update(entry);
            entry.bounds
        };
        if let Some(bounds) = bounds {
            let marked = self.mark_intersecting(&bounds, DirtyMask::ALL);
            log::debug!("Features for bucket {bucket}: {marked} tile(s) dirty");
        }
    }

    /// Replaces the line features of `bucket`. An empty list clears them
    /// without touching any tile.
    pub fn push_line_features(&self, bucket: BucketId, lines: Vec<LineFeature>) {
        if lines.is_empty() {
            self.clear_features(bucket, |b| b.lines.clear());
            return;
        }
        self.push_bucket(bucket, |b| {
            for line in &lines {
                b.cover(&line.nodes);
            }
            b.lines = lines;
        });
    }

    pub fn push_area_features(&self, bucket: BucketId, areas: Vec<AreaFeature>) {
        if areas.is_empty() {
            self.clear_features(bucket, |b| b.areas.clear());
            return;
        }
        self.push_bucket(bucket, |b| {
            for area in &areas {
                b.cover(&area.nodes);
            }
            b.areas = areas;
        });
    }

    pub fn push_coastlines(&self, bucket: BucketId, coastlines: Vec<Coastline>) {
        if coastlines.is_empty() {
            self.clear_features(bucket, |b| b.coastlines.clear());
            return;
        }
        self.push_bucket(bucket, |b| {
            for coastline in &coastlines {
                b.cover(&coastline.nodes);
            }
            b.coastlines = coastlines;
        });
    }

    fn clear_features(&self, bucket: BucketId, clear: impl FnOnce(&mut FeatureBucket)) {
        if let Ok(mut features) = self.features.write()
            && let Some(entry) = features.get_mut(&bucket)
        {
            clear(entry);
            if entry.is_empty() {
                features.remove(&bucket);
            }
        }
    }

    /// Rebuilds one tile according to its dirty mask. Returns `false` when
    /// the tile was clean.
    pub fn init_tile(&self, id: TileId, mode: SwapMode) -> anyhow::Result<bool> {
        let tile = self
            .tile(id)
            .ok_or_else(|| anyhow::anyhow!("tile {id:?} is not loaded"))?;
        let _building = tile.build_lock();
        let mask = tile.take_dirty();
        if mask.is_empty() {
            return Ok(false);
        }

        let elevation_at = |at: TileId| self.tile(at).map(|t| t.elevation().clone());
        let neighbor = |side| elevation_at(id.neighbor(side));
        let diagonal = |vertical, horizontal| elevation_at(id.diagonal(vertical, horizontal));
        let (west, east, south, north) = (
            neighbor(Side::West),
            neighbor(Side::East),
            neighbor(Side::South),
            neighbor(Side::North),
        );
        let (south_west, south_east, north_west, north_east) = (
            diagonal(Side::South, Side::West),
            diagonal(Side::South, Side::East),
            diagonal(Side::North, Side::West),
            diagonal(Side::North, Side::East),
        );
        let materials = self.materials();
        let mesh = mesh::generate(&MeshInputs {
            elevation: tile.elevation(),
            landclass: tile.landclass().map(Arc::as_ref),
            neighbors: Neighbors {
                west: west.as_deref(),
                east: east.as_deref(),
                south: south.as_deref(),
                north: north.as_deref(),
                south_west: south_west.as_deref(),
                south_east: south_east.as_deref(),
                north_west: north_west.as_deref(),
                north_east: north_east.as_deref(),
            },
            materials: &materials,
            properties: self.properties.as_deref(),
            constraints: &self.constraints,
            config: &self.config,
        });

        let previous = tile.current();
        let reuse = match &previous {
            Some(prev) if mask == DirtyMask::IMAGERY => Some(prev),
            _ => None,
        };
        let (features, batches, stats) = match reuse {
            Some(prev) => (prev.features.clone(), prev.batches.clone(), prev.stats),
            None => {
                let features = self.features.read().map_or_else(
                    |_| Vec::new(),
                    |buckets| features::overlay(buckets.values(), &mesh, &tile.bounds(), &self.config),
                );
                let scattered = self.scatter_tile(&tile, &mesh, &materials);
                let stats = scattered.stats;
                (features, scattered.into_batches(&self.scatter), stats)
            }
        };

        let buffer = TileBuffer {
            generation: tile.next_generation(),
            mesh,
            features,
            batches,
            stats,
        };
        log::debug!(
            "Tile {id:?} rebuilt ({mask:?}): generation {}, {} feature mesh(es), {} batch(es)",
            buffer.generation,
            buffer.features.len(),
            buffer.batches.len()
        );
        tile.install(Arc::new(buffer), mode);

        if mask.contains(DirtyMask::ELEVATION) {
            self.touch_neighbors(id);
        }
        Ok(true)
    }

    fn scatter_tile(
        &self,
        tile: &TerrainTile,
        mesh: &GeneratedMesh,
        materials: &MaterialLibrary,
    ) -> ScatterOutput {
        let mut scatter = Scatter::new(&self.scatter, mesh.center);
        let Some(landclass) = tile.landclass() else {
            return scatter.finish();
        };
        let mut missing = HashSet::new();
        for (indices, water) in mesh.triangles() {
            if water {
                continue;
            }
            let triangle = Triangle::new(
                indices.map(|i| mesh.vertices[i as usize]),
                indices.map(|i| mesh.tex_coords[i as usize]),
            );
            let tex = triangle.tex_centroid();
            let code = landclass.landclass(tex.x, tex.y);
            let centroid = triangle.centroid();
            match materials.for_landclass(
                code,
                Vector2::new(centroid.x, centroid.y),
                self.properties.as_deref(),
            ) {
                Some(material) if material.scatters() => scatter.triangle(&triangle, &material),
                Some(_) => {}
                None => {
                    scatter.skip_missing_material();
                    if missing.insert(code) {
                        log::warn!(
                            "Tile {:?}: no material for landclass {code}, skipping its triangles",
                            tile.id()
                        );
                    }
                }
            }
        }
        scatter.finish()
    }

    /// Rebuilds every dirty tile, including neighbours flagged along the way.
    /// Returns how many rebuilds ran.
    pub fn regenerate_dirty(&self, mode: SwapMode) -> anyhow::Result<usize> {
        let mut rebuilt = 0;
        loop {
            let dirty: Vec<TileId> = self
                .tiles()
                .iter()
                .filter(|t| !t.dirty().is_empty())
                .map(|t| t.id())
                .collect();
            if dirty.is_empty() {
                return Ok(rebuilt);
            }
            for id in dirty {
                if self.init_tile(id, mode)? {
                    rebuilt += 1;
                }
            }
        }
    }

    /// Frame-boundary hook: swaps in every parked buffer. Returns how many.
    pub fn update(&self) -> usize {
        self.tiles().iter().filter(|t| t.apply_pending()).count()
    }
}
