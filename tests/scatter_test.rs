use std::sync::Arc;

use cgmath::{Rad, Vector2, Vector3};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use terrafx::{
    config::ScatterConfig,
    data_structures::instance::Instance,
    scatter::{
        Scatter, ScatterKind,
        placement::{Triangle, scatter_points, slope_factor},
        quadtree::{SpatialGrid, dimension_for},
    },
    terrain::material::{BuildingSettings, Material, RandomObject, TreeSettings},
};

use crate::common::test_utils::init_logger;

mod common;

/// Flat triangle of the given area, right angle at the origin.
fn flat_triangle(area: f64) -> Triangle {
    Triangle::new(
        [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(100.0, 0.0, 0.0),
            Vector3::new(0.0, area / 50.0, 0.0),
        ],
        [Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0)],
    )
}

fn oak(coverage: f64) -> TreeSettings {
    TreeSettings {
        coverage,
        texture: "oak.png".to_string(),
        height: 10.0,
        width: 4.0,
        range: None,
        varieties: 1,
    }
}

fn forest(coverage: f64) -> Arc<Material> {
    Arc::new(Material {
        tree: Some(oak(coverage)),
        ..Material::new("forest")
    })
}

#[test]
fn count_is_area_over_coverage() {
    init_logger();
    let mut rng = Xoshiro256StarStar::seed_from_u64(7);
    let triangle = flat_triangle(1000.0);
    assert_eq!(triangle.area(), 1000.0);

    for _ in 0..100 {
        assert_eq!(scatter_points(&triangle, 100.0, &mut rng).len(), 10);
    }
    assert!(scatter_points(&triangle, 0.0, &mut rng).is_empty());
}

#[test]
fn fractional_remainder_is_placed_by_chance() {
    init_logger();
    let mut rng = Xoshiro256StarStar::seed_from_u64(11);
    let triangle = flat_triangle(250.0);
    let trials = 10_000;

    let mut total = 0;
    for _ in 0..trials {
        let n = scatter_points(&triangle, 100.0, &mut rng).len();
        assert!(n == 2 || n == 3);
        total += n;
    }

    // Mean 2.5 with a per-trial standard deviation of 0.5.
    let expected = 2.5 * trials as f64;
    assert!((total as f64 - expected).abs() < 200.0, "total {total}");
}

#[test]
fn candidates_lie_inside_the_triangle() {
    init_logger();
    let mut rng = Xoshiro256StarStar::seed_from_u64(3);
    let triangle = flat_triangle(1000.0);

    for c in scatter_points(&triangle, 10.0, &mut rng) {
        let p = c.position;
        assert!(p.x >= 0.0 && p.y >= 0.0);
        assert!(p.x / 100.0 + p.y / 20.0 <= 1.0 + 1e-9);
        assert!((c.tex.x - p.x / 100.0).abs() < 1e-9);
    }
}

#[test]
fn same_seed_scatters_the_same_way() {
    init_logger();
    let config = ScatterConfig::default();
    let triangle = flat_triangle(1000.0);
    let material = forest(50.0);
    let run = |config: &ScatterConfig| {
        let mut scatter = Scatter::new(config, Vector3::new(0.0, 0.0, 0.0));
        scatter.triangle(&triangle, &material);
        scatter.finish()
    };

    let first = run(&config);
    let second = run(&config);
    let reseeded = run(&ScatterConfig {
        seed: 99,
        ..config.clone()
    });

    let instances = |out: &terrafx::scatter::ScatterOutput| -> Vec<Instance> {
        out.trees.iter().flat_map(|b| b.instances.clone()).collect()
    };
    assert_eq!(first.stats, second.stats);
    assert_eq!(instances(&first), instances(&second));
    assert_ne!(instances(&first), instances(&reseeded));
    assert_eq!(first.trees.instance_count(), 20);
    assert_eq!(first.stats.placed, 20);
}

#[test]
fn steep_triangles_are_rejected() {
    init_logger();
    assert_eq!(slope_factor(1.0, 0.707, 0.866), 1.0);
    assert_eq!(slope_factor(0.5, 0.707, 0.866), 0.0);
    let mid = slope_factor(0.7865, 0.707, 0.866);
    assert!((mid - 0.5).abs() < 1e-9);

    let wall = Triangle::new(
        [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(100.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 20.0),
        ],
        [Vector2::new(0.0, 0.0); 3],
    );
    assert_eq!(wall.slope_cos(), 0.0);
    let config = ScatterConfig::default();
    let mut scatter = Scatter::new(&config, Vector3::new(0.0, 0.0, 0.0));
    scatter.triangle(&wall, &forest(10.0));
    let out = scatter.finish();

    assert_eq!(out.instance_count(), 0);
    assert_eq!(out.stats.slope_rejected, 1);
    assert_eq!(out.stats.candidates, 0);
}

#[test]
fn mask_without_green_rejects_every_tree() {
    init_logger();
    let mask = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 255, 255]));
    let material = Arc::new(Material {
        tree: Some(oak(100.0)),
        ..Material::new("forest").with_mask(mask)
    });
    let config = ScatterConfig::default();
    let mut scatter = Scatter::new(&config, Vector3::new(0.0, 0.0, 0.0));

    scatter.triangle(&flat_triangle(1000.0), &material);
    let out = scatter.finish();

    assert_eq!(out.trees.instance_count(), 0);
    assert_eq!(out.stats.candidates, 10);
    assert_eq!(out.stats.mask_rejected, 10);
}

#[test]
fn buildings_keep_clear_of_objects() {
    init_logger();
    let material = Arc::new(Material {
        objects: vec![RandomObject {
            model: "windmill.ac".to_string(),
            coverage: 100.0,
            spacing: 1.0e6,
            ..Default::default()
        }],
        building: Some(BuildingSettings {
            coverage: 100.0,
            texture: "house.png".to_string(),
            ..Default::default()
        }),
        ..Material::new("farmland")
    });
    let config = ScatterConfig {
        object_edge_clearance: 0.0,
        ..Default::default()
    };
    let mut scatter = Scatter::new(&config, Vector3::new(0.0, 0.0, 0.0));

    scatter.triangle(&flat_triangle(1000.0), &material);
    let out = scatter.finish();

    assert_eq!(out.objects.instance_count(), 1);
    assert_eq!(out.buildings.instance_count(), 0);
    assert!(out.stats.spacing_vs_objects >= 9);
    assert_eq!(
        out.stats.spacing_vs_objects + out.stats.too_close_to_edge,
        out.stats.candidates - 1
    );
}

#[test]
fn objects_keep_clear_of_triangle_edges() {
    init_logger();
    let material = Arc::new(Material {
        objects: vec![RandomObject {
            model: "pylon.ac".to_string(),
            coverage: 10.0,
            spacing: 0.0,
            ..Default::default()
        }],
        ..Material::new("scrub")
    });
    // A sliver two metres wide: nothing inside is two metres from every edge.
    let sliver = flat_triangle(100.0);
    let run = |config: &ScatterConfig| {
        let mut scatter = Scatter::new(config, Vector3::new(0.0, 0.0, 0.0));
        scatter.triangle(&sliver, &material);
        scatter.finish()
    };

    let out = run(&ScatterConfig::default());
    assert_eq!(out.stats.candidates, 10);
    assert_eq!(out.objects.instance_count(), 0);
    assert_eq!(out.stats.too_close_to_edge, 10);

    let unrestricted = run(&ScatterConfig {
        object_edge_clearance: 0.0,
        ..Default::default()
    });
    assert_eq!(unrestricted.objects.instance_count(), 10);
    assert_eq!(unrestricted.stats.too_close_to_edge, 0);
}

#[test]
fn identical_tree_settings_share_a_bin() {
    init_logger();
    let a = forest(100.0);
    let b = Arc::new(Material {
        tree: Some(oak(100.0)),
        ..Material::new("woodland")
    });
    let config = ScatterConfig {
        grid_dimension: Some(3),
        ..Default::default()
    };
    let mut scatter = Scatter::new(&config, Vector3::new(0.0, 0.0, 0.0));

    scatter.triangle(&flat_triangle(1000.0), &a);
    scatter.triangle(&flat_triangle(1000.0), &b);
    let out = scatter.finish();

    assert_eq!(out.trees.len(), 1);
    assert_eq!(out.trees.instance_count(), 20);
    let batches = out.into_batches(&config);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].kind, ScatterKind::Trees);
    assert_eq!(batches[0].label, "trees oak.png 4x10");
    assert_eq!(batches[0].grid.dimension(), 3);
    assert_eq!(batches[0].grid.instance_count(), 20);
    assert_eq!(batches[0].grid.leaves()[0].range, config.tree_range);
}

fn at(x: f32, y: f32) -> Instance {
    Instance::placed(Vector3::new(x, y, 0.0), Rad(0.0), Vector3::new(1.0, 1.0, 1.0))
}

#[test]
fn grid_drops_empty_cells_and_clamps_the_far_edge() {
    init_logger();
    let grid = SpatialGrid::build(vec![at(0.0, 0.0), at(10.0, 0.0), at(0.0, 10.0)], 2, 500.0);

    assert_eq!(grid.dimension(), 2);
    assert_eq!(grid.instance_count(), 3);
    let mut cells: Vec<(usize, usize)> = grid.leaves().iter().map(|l| l.cell).collect();
    cells.sort();
    assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0)]);
    for leaf in grid.leaves() {
        assert_eq!(leaf.range, 500.0);
        assert_eq!(leaf.raw().len(), leaf.instances.len());
    }

    let empty = SpatialGrid::build(Vec::new(), 4, 500.0);
    assert!(empty.leaves().is_empty());
    let single = SpatialGrid::build(vec![at(3.0, 3.0), at(3.0, 3.0)], 4, 500.0);
    assert_eq!(single.leaves().len(), 1);
}

#[test]
fn grid_dimension_grows_with_the_instance_count() {
    init_logger();
    assert_eq!(dimension_for(0, 512, 8), 1);
    assert_eq!(dimension_for(100, 512, 8), 1);
    assert_eq!(dimension_for(1000, 512, 8), 2);
    assert_eq!(dimension_for(5000, 512, 8), 4);
    assert_eq!(dimension_for(100_000, 512, 8), 8);
    assert_eq!(dimension_for(10, 0, 8), 4);
}
