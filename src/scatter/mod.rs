//! Procedural scatter of trees, buildings, lights and random objects over
//! classified terrain triangles.
//!
//! One pass walks a tile's triangles in order with a single random stream
//! seeded from [`ScatterConfig::seed`], so the same tile always scatters the
//! same way. Placements are grouped into [`bins`] by shared visual
//! attributes and each bin is indexed by a [`quadtree::SpatialGrid`].

use std::sync::Arc;

use cgmath::{Rad, Vector3};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::{
    config::ScatterConfig,
    data_structures::instance::Instance,
    scatter::{
        bins::{BinKey, Bins, BuildingKey, LightKey, ObjectKey, TreeKey},
        placement::{Footprint, MaskChannel, Triangle, mask_value, scatter_points, slope_factor},
        quadtree::{SpatialGrid, dimension_for},
    },
    terrain::material::{Heading, Material},
};

pub mod bins;
pub mod placement;
pub mod quadtree;

/// Counts of what happened to candidates during a pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScatterStats {
    pub candidates: usize,
    pub placed: usize,
    pub slope_rejected: usize,
    pub mask_rejected: usize,
    pub spacing_vs_objects: usize,
    pub spacing_vs_buildings: usize,
    pub too_close_to_edge: usize,
    /// Triangles skipped because their landclass has no material.
    pub missing_material: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScatterKind {
    Trees,
    Buildings,
    Lights,
    Objects,
}

/// One bin's instances under a spatial index.
#[derive(Clone, Debug)]
pub struct InstanceBatch {
    pub kind: ScatterKind,
    pub label: String,
    pub grid: SpatialGrid,
}

#[derive(Clone, Debug, Default)]
pub struct ScatterOutput {
    pub trees: Bins<TreeKey>,
    pub buildings: Bins<BuildingKey>,
    pub lights: Bins<LightKey>,
    pub objects: Bins<ObjectKey>,
    pub stats: ScatterStats,
}

impl ScatterOutput {
    pub fn instance_count(&self) -> usize {
        self.trees.instance_count()
            + self.buildings.instance_count()
            + self.lights.instance_count()
            + self.objects.instance_count()
    }

    /// Indexes every bin with a grid sized from its instance count, or the
    /// configured fixed size.
    pub fn into_batches(self, config: &ScatterConfig) -> Vec<InstanceBatch> {
        fn index<K: BinKey>(
            kind: ScatterKind,
            bins: Bins<K>,
            config: &ScatterConfig,
            out: &mut Vec<InstanceBatch>,
        ) {
            for bin in bins.into_bins() {
                let dimension = config.grid_dimension.unwrap_or_else(|| {
                    dimension_for(
                        bin.instances.len(),
                        config.leaf_capacity,
                        config.max_grid_dimension,
                    )
                });
                out.push(InstanceBatch {
                    kind,
                    label: bin.key.label(),
                    grid: SpatialGrid::build(bin.instances, dimension, bin.key.range()),
                });
            }
        }
        let mut batches = Vec::new();
        index(ScatterKind::Trees, self.trees, config, &mut batches);
        index(ScatterKind::Buildings, self.buildings, config, &mut batches);
        index(ScatterKind::Lights, self.lights, config, &mut batches);
        index(ScatterKind::Objects, self.objects, config, &mut batches);
        batches
    }
}

/// Scatter state for one tile.
pub struct Scatter<'a> {
    config: &'a ScatterConfig,
    origin: Vector3<f64>,
    rng: Xoshiro256StarStar,
    output: ScatterOutput,
}

impl<'a> Scatter<'a> {
    /// Instances are placed relative to `origin`, usually the tile center.
    pub fn new(config: &'a ScatterConfig, origin: Vector3<f64>) -> Self {
        Self {
            config,
            origin,
            rng: Xoshiro256StarStar::seed_from_u64(config.seed),
            output: ScatterOutput::default(),
        }
    }

    pub fn skip_missing_material(&mut self) {
        self.output.stats.missing_material += 1;
    }

    pub fn finish(self) -> ScatterOutput {
        log::debug!("Scatter: {:?}", self.output.stats);
        self.output
    }

    fn local(&self, p: Vector3<f64>) -> Vector3<f32> {
        let d = p - self.origin;
        Vector3::new(d.x as f32, d.y as f32, d.z as f32)
    }

    fn heading(&mut self) -> Rad<f32> {
        Rad(self.rng.random::<f32>() * std::f32::consts::TAU)
    }

    /// Candidates for `coverage` on `triangle`, thinned by slope and `density`.
    fn candidates(
        &mut self,
        triangle: &Triangle,
        material: &Material,
        coverage: f64,
        density: f64,
    ) -> Vec<placement::Candidate> {
        if coverage <= 0.0 || density <= 0.0 {
            return Vec::new();
        }
        let factor = slope_factor(
            triangle.slope_cos(),
            material.zero_density_cos,
            material.max_density_cos,
        );
        if factor <= 0.0 {
            self.output.stats.slope_rejected += 1;
            return Vec::new();
        }
        let points = scatter_points(triangle, coverage / (density * factor), &mut self.rng);
        self.output.stats.candidates += points.len();
        points
    }

    /// Rejects with probability `1 - value` of the mask channel, when the
    /// material has a mask.
    fn masked_out(&mut self, material: &Material, tex: cgmath::Vector2<f64>, channel: MaskChannel) -> bool {
        let Some(mask) = &material.mask else {
            return false;
        };
        let value = mask_value(mask, tex, channel);
        if self.rng.random::<f64>() > value {
            self.output.stats.mask_rejected += 1;
            return true;
        }
        false
    }

    /// Everything `material` scatters on one triangle.
    pub fn triangle(&mut self, triangle: &Triangle, material: &Arc<Material>) {
        let mut objects: Vec<Footprint> = Vec::new();
        let mut buildings: Vec<Footprint> = Vec::new();
        self.trees(triangle, material);
        self.objects(triangle, material, &mut objects);
        self.buildings(triangle, material, &objects, &mut buildings);
        self.lights(triangle, material);
    }

    fn trees(&mut self, triangle: &Triangle, material: &Material) {
        let Some(tree) = &material.tree else {
            return;
        };
        let range = tree.range.unwrap_or(self.config.tree_range);
        let key = TreeKey::new(&tree.texture, tree.height, tree.width, range, tree.varieties);
        for c in self.candidates(triangle, material, tree.coverage, self.config.tree_density) {
            if self.masked_out(material, c.tex, MaskChannel::Green) {
                continue;
            }
            let heading = self.heading();
            let scale = Vector3::new(tree.width, tree.width, tree.height);
            let instance = Instance::placed(self.local(c.position), heading, scale);
            self.output.trees.push(&key, instance);
            self.output.stats.placed += 1;
        }
    }

    fn objects(&mut self, triangle: &Triangle, material: &Material, placed: &mut Vec<Footprint>) {
        for object in &material.objects {
            let range = object.range.unwrap_or(self.config.object_range);
            let key = ObjectKey::new(&object.model, range);
            for c in self.candidates(triangle, material, object.coverage, self.config.object_density) {
                if self.masked_out(material, c.tex, MaskChannel::Blue) {
                    continue;
                }
                if triangle.edge_distance(c.position) < self.config.object_edge_clearance {
                    self.output.stats.too_close_to_edge += 1;
                    continue;
                }
                let footprint = Footprint {
                    center: c.position,
                    radius: object.spacing,
                };
                if placed.iter().any(|p| p.overlaps(&footprint)) {
                    self.output.stats.spacing_vs_objects += 1;
                    continue;
                }
                let heading = match (object.heading, &material.mask) {
                    (Heading::Fixed, _) => Rad(0.0),
                    (Heading::Mask, Some(mask)) => mask_heading(mask, c.tex),
                    _ => self.heading(),
                };
                placed.push(footprint);
                let instance = Instance::placed(self.local(c.position), heading, Vector3::new(1.0, 1.0, 1.0));
                self.output.objects.push(&key, instance);
                self.output.stats.placed += 1;
            }
        }
    }

    fn buildings(
        &mut self,
        triangle: &Triangle,
        material: &Material,
        objects: &[Footprint],
        placed: &mut Vec<Footprint>,
    ) {
        let Some(building) = &material.building else {
            return;
        };
        let range = building.range.unwrap_or(self.config.building_range);
        let key = BuildingKey::new(&building.texture, range);
        for c in self.candidates(triangle, material, building.coverage, self.config.building_density) {
            if self.masked_out(material, c.tex, MaskChannel::Blue) {
                continue;
            }
            if triangle.edge_distance(c.position) < self.config.building_edge_clearance {
                self.output.stats.too_close_to_edge += 1;
                continue;
            }
            let width = self.between(building.min_width, building.max_width);
            let depth = self.between(building.min_depth, building.max_depth);
            let height = self.between(building.min_height, building.max_height);
            let footprint = Footprint {
                center: c.position,
                radius: 0.5 * ((width * width + depth * depth) as f64).sqrt(),
            };
            if objects.iter().any(|o| o.overlaps(&footprint)) {
                self.output.stats.spacing_vs_objects += 1;
                continue;
            }
            if placed.iter().any(|b| b.overlaps(&footprint)) {
                self.output.stats.spacing_vs_buildings += 1;
                continue;
            }
            let heading = match &material.mask {
                Some(mask) => mask_heading(mask, c.tex),
                None => self.heading(),
            };
            placed.push(footprint);
            let instance = Instance::placed(
                self.local(c.position),
                heading,
                Vector3::new(width, depth, height),
            );
            self.output.buildings.push(&key, instance);
            self.output.stats.placed += 1;
        }
    }

    fn lights(&mut self, triangle: &Triangle, material: &Material) {
        let Some(light) = &material.light else {
            return;
        };
        let range = light.range.unwrap_or(self.config.light_range);
        let key = LightKey::new(light.size, light.color, range);
        for c in self.candidates(triangle, material, light.coverage, self.config.light_density) {
            let scale = Vector3::new(light.size, light.size, light.size);
            let instance = Instance::placed(self.local(c.position), Rad(0.0), scale);
            self.output.lights.push(&key, instance);
            self.output.stats.placed += 1;
        }
    }

    fn between(&mut self, min: f32, max: f32) -> f32 {
        if max > min {
            self.rng.random_range(min..=max)
        } else {
            min
        }
    }
}

fn mask_heading(mask: &image::RgbaImage, tex: cgmath::Vector2<f64>) -> Rad<f32> {
    Rad(mask_value(mask, tex, MaskChannel::Red) as f32 * std::f32::consts::TAU)
}
