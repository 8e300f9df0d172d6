use std::sync::Arc;

use cgmath::{InnerSpace, Vector2, Vector3};
use terrafx::{
    config::TerrainConfig,
    data_structures::property_root::PropertyRoot,
    terrain::{
        constraint::{ConstraintSet, ConstraintVolume},
        layer::{Bounds, ElevationLayer, LandclassLayer},
        material::{Material, MaterialLibrary, MaterialRegion},
        mesh::{self, GeneratedMesh, MeshInputs, Neighbors},
    },
};

use crate::common::test_utils::{elevation, init_logger, tile_locator};

mod common;

const GRASS: u8 = 0;
const OCEAN: u8 = 1;

fn materials() -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    library.push_region(MaterialRegion::global(
        "world",
        vec![Material::new("grass"), Material::water("ocean")],
    ));
    library.map_landclass(GRASS, "grass");
    library.map_landclass(OCEAN, "ocean");
    library
}

fn build(
    elevation: &ElevationLayer,
    landclass: Option<&LandclassLayer>,
    materials: &MaterialLibrary,
    constraints: &ConstraintSet,
    config: &TerrainConfig,
) -> GeneratedMesh {
    mesh::generate(&MeshInputs {
        elevation,
        landclass,
        neighbors: Neighbors::default(),
        materials,
        properties: None,
        constraints,
        config,
    })
}

#[test]
fn elevation_layer_interpolates_and_skips_missing_samples() {
    init_logger();
    let layer = elevation(3, tile_locator(0, 0, 100.0), |c, r| {
        if (c, r) == (2, 2) { f32::NAN } else { (c + 10 * r) as f32 }
    });

    assert_eq!(layer.height(1, 2), Some(21.0));
    assert_eq!(layer.height(2, 2), None);
    assert_eq!(layer.height(3, 0), None);
    assert_eq!(layer.sample(0.25, 0.0), Some(0.5));
    assert_eq!(layer.sample(0.0, 0.25), Some(5.0));
    // Exactly on the grid line next to the hole.
    assert_eq!(layer.sample(0.5, 1.0), Some(21.0));
    assert_eq!(layer.sample(0.75, 0.75), None);
    assert!(ElevationLayer::new(1, 4, vec![0.0; 4], tile_locator(0, 0, 1.0)).is_err());
    assert!(ElevationLayer::new(2, 2, vec![0.0; 3], tile_locator(0, 0, 1.0)).is_err());
}

#[test]
fn landclass_rows_start_in_the_south() {
    init_logger();
    let layer = LandclassLayer::from_codes(2, 2, &[1, 2, 3, 4]).expect("Invalid landclass.");

    assert_eq!(layer.landclass(0.1, 0.1), 1);
    assert_eq!(layer.landclass(0.9, 0.1), 2);
    assert_eq!(layer.landclass(0.1, 0.9), 3);
    assert_eq!(layer.landclass(1.0, 1.0), 4);
    assert!(LandclassLayer::from_codes(2, 2, &[1, 2, 3]).is_err());
}

/// A grass variant told apart by its skirt height.
fn grass(skirt: f64) -> Material {
    Material {
        skirt_height: Some(skirt),
        ..Material::new("grass")
    }
}

fn skirt_of(
    library: &MaterialLibrary,
    x: f64,
    y: f64,
    properties: Option<&PropertyRoot>,
) -> Option<f64> {
    library
        .find("grass", Vector2::new(x, y), properties)
        .and_then(|m| m.skirt_height)
}

#[test]
fn smallest_region_wins_inside_its_bounds() {
    init_logger();
    let mut library = MaterialLibrary::new();
    library.push_region(MaterialRegion::global("world", vec![grass(1.0)]));
    let alps = Bounds::new(Vector2::new(0.0, 0.0), Vector2::new(100.0, 100.0));
    library.push_region(MaterialRegion::bounded("alps", alps, vec![grass(2.0)]));
    // Declared after the small region, but larger.
    let europe = Bounds::new(Vector2::new(-500.0, -500.0), Vector2::new(500.0, 500.0));
    library.push_region(MaterialRegion::bounded("europe", europe, vec![grass(3.0)]));

    assert_eq!(skirt_of(&library, 50.0, 50.0, None), Some(2.0));
    assert_eq!(skirt_of(&library, 300.0, 50.0, None), Some(3.0));
    assert_eq!(skirt_of(&library, 900.0, 900.0, None), Some(1.0));
    assert!(library.find("sand", Vector2::new(50.0, 50.0), None).is_none());
}

#[test]
fn later_region_wins_among_equal_areas() {
    init_logger();
    let mut library = MaterialLibrary::new();
    let first = Bounds::new(Vector2::new(0.0, 0.0), Vector2::new(100.0, 100.0));
    let second = Bounds::new(Vector2::new(50.0, 50.0), Vector2::new(150.0, 150.0));
    library.push_region(MaterialRegion::bounded("first", first, vec![grass(1.0)]));
    library.push_region(MaterialRegion::bounded("second", second, vec![grass(2.0)]));

    assert_eq!(skirt_of(&library, 75.0, 75.0, None), Some(2.0));
    assert_eq!(skirt_of(&library, 25.0, 25.0, None), Some(1.0));
}

#[test]
fn region_with_an_unmet_condition_is_skipped() {
    init_logger();
    let mut library = MaterialLibrary::new();
    library.push_region(MaterialRegion::global("world", vec![grass(1.0)]));
    let bounds = Bounds::new(Vector2::new(0.0, 0.0), Vector2::new(100.0, 100.0));
    library.push_region(
        MaterialRegion::bounded("winter", bounds, vec![grass(2.0)])
            .with_condition("/sim/season/winter"),
    );
    let properties = PropertyRoot::new();

    assert_eq!(skirt_of(&library, 50.0, 50.0, None), Some(1.0));
    assert_eq!(skirt_of(&library, 50.0, 50.0, Some(&properties)), Some(1.0));
    properties.set("/sim/season/winter", false);
    assert_eq!(skirt_of(&library, 50.0, 50.0, Some(&properties)), Some(1.0));
    properties.set("/sim/season/winter", true);
    assert_eq!(skirt_of(&library, 50.0, 50.0, Some(&properties)), Some(2.0));
}

#[test]
fn sample_ratio_resizes_the_grid() {
    init_logger();
    let layer = elevation(9, tile_locator(0, 0, 800.0), |c, _| c as f32);
    assert_eq!(mesh::mesh_dimensions(&layer, 1.0), (9, 9));
    assert_eq!(mesh::mesh_dimensions(&layer, 0.5), (5, 5));
    assert_eq!(mesh::mesh_dimensions(&layer, 0.01), (2, 2));

    let config = TerrainConfig {
        sample_ratio: 0.5,
        ..Default::default()
    };
    let mesh = build(&layer, None, &materials(), &ConstraintSet::new(), &config);

    assert_eq!((mesh.columns, mesh.rows), (5, 5));
    assert_eq!(mesh.triangle_count(), 32);
    let v = mesh.vertex_at(1, 0).expect("Missing vertex.");
    assert!((v.x - 200.0).abs() < 1e-9);
    assert!((v.z - 2.0).abs() < 1e-9);
}

#[test]
fn cells_are_water_only_when_every_corner_is_water() {
    init_logger();
    let layer = ElevationLayer::flat(4, 4, 0.0, tile_locator(0, 0, 300.0)).expect("Invalid layer.");
    #[rustfmt::skip]
    let codes = [
        OCEAN, OCEAN, GRASS, GRASS,
        GRASS, GRASS, GRASS, GRASS,
        GRASS, GRASS, GRASS, GRASS,
        GRASS, GRASS, GRASS, GRASS,
    ];
    let landclass = LandclassLayer::from_codes(4, 4, &codes).expect("Invalid landclass.");

    let mesh = build(
        &layer,
        Some(&landclass),
        &materials(),
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    );

    assert_eq!(mesh.triangle_count(), 18);
    assert_eq!(mesh.land.len(), 18 * 3);
    assert!(mesh.water.is_empty());
}

#[test]
fn all_water_tile_goes_to_the_water_buffer() {
    init_logger();
    let layer = ElevationLayer::flat(4, 4, 0.0, tile_locator(0, 0, 300.0)).expect("Invalid layer.");
    let landclass = LandclassLayer::from_codes(4, 4, &[OCEAN; 16]).expect("Invalid landclass.");

    let mesh = build(
        &layer,
        Some(&landclass),
        &materials(),
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    );

    assert!(mesh.land.is_empty());
    assert_eq!(mesh.water.len(), 18 * 3);
    assert!(mesh.triangles().all(|(_, water)| water));
}

#[test]
fn missing_corner_leaves_a_single_triangle() {
    init_logger();
    let layer = elevation(3, tile_locator(0, 0, 100.0), |c, r| {
        if (c, r) == (0, 0) { f32::NAN } else { 5.0 }
    });

    let mesh = build(
        &layer,
        None,
        &materials(),
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    );

    assert_eq!(mesh.vertices.len(), 8);
    assert_eq!(mesh.grid[0], None);
    assert_eq!(mesh.vertex_at(0, 0), None);
    assert_eq!(mesh.triangle_count(), 7);
    let first = mesh.triangles().next().expect("No triangles.").0;
    for i in first {
        assert!(mesh.grid.contains(&Some(i)));
    }
}

/// One cell whose south-west corner has no data; codes are `[sw, se, nw, ne]`.
fn cell_missing_a_corner(codes: [u8; 4]) -> GeneratedMesh {
    let layer = elevation(2, tile_locator(0, 0, 100.0), |c, r| {
        if (c, r) == (0, 0) { f32::NAN } else { 5.0 }
    });
    let landclass = LandclassLayer::from_codes(2, 2, &codes).expect("Invalid landclass.");
    build(
        &layer,
        Some(&landclass),
        &materials(),
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    )
}

#[test]
fn corner_triangle_is_water_when_its_three_corners_are() {
    init_logger();
    // The missing corner's own class does not count.
    let mesh = cell_missing_a_corner([GRASS, OCEAN, OCEAN, OCEAN]);

    assert_eq!(mesh.triangle_count(), 1);
    assert_eq!(mesh.water.len(), 3);
    assert!(mesh.land.is_empty());
}

#[test]
fn corner_triangle_with_a_land_corner_stays_on_land() {
    init_logger();
    let mesh = cell_missing_a_corner([OCEAN, OCEAN, GRASS, OCEAN]);

    assert_eq!(mesh.triangle_count(), 1);
    assert_eq!(mesh.land.len(), 3);
    assert!(mesh.water.is_empty());
}

#[test]
fn cells_split_along_the_more_coplanar_diagonal() {
    init_logger();
    let layer = elevation(4, tile_locator(0, 0, 30.0), |c, r| {
        ((c * r) as f32 * 3.0) + if (c + r) % 2 == 0 { 4.0 } else { 0.0 }
    });

    let mesh = build(
        &layer,
        None,
        &materials(),
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    );

    assert_eq!(mesh.triangle_count(), 18);
    let triangles: Vec<[u32; 3]> = mesh.triangles().map(|(t, _)| t).collect();
    let index = |c: usize, r: usize| mesh.grid[r * mesh.columns + c].expect("Missing vertex.");
    let n = |i: u32| mesh.normals[i as usize];
    for r in 0..mesh.rows - 1 {
        for c in 0..mesh.columns - 1 {
            let (i00, i10, i11, i01) =
                (index(c, r), index(c + 1, r), index(c + 1, r + 1), index(c, r + 1));
            let diagonal = if n(i00).dot(n(i11)) >= n(i10).dot(n(i01)) {
                [i00, i11]
            } else {
                [i10, i01]
            };
            let cell = &triangles[2 * (r * (mesh.columns - 1) + c)..][..2];
            for tri in cell {
                assert!(diagonal.iter().all(|i| tri.contains(i)));
            }
        }
    }
}

#[test]
fn default_skirt_hangs_below_the_closed_perimeter() {
    init_logger();
    let layer = ElevationLayer::flat(3, 3, 10.0, tile_locator(0, 0, 100.0)).expect("Invalid layer.");
    let config = TerrainConfig {
        default_skirt_height: 5.0,
        ..Default::default()
    };

    let mesh = build(&layer, None, &materials(), &ConstraintSet::new(), &config);

    assert_eq!(mesh.skirts.len(), 1);
    let strip = &mesh.skirts[0];
    // Eight perimeter vertices, closed by repeating the first.
    assert_eq!(strip.len(), 18);
    assert_eq!(strip[0], strip[16]);
    assert_eq!(mesh.vertices.len(), 9 + 9);
    for pair in strip.chunks(2) {
        let (top, bottom) = (mesh.vertices[pair[0] as usize], mesh.vertices[pair[1] as usize]);
        assert_eq!(top.z - bottom.z, 5.0);
        assert_eq!((top.x, top.y), (bottom.x, bottom.y));
    }
    assert_eq!(mesh.skirt_triangles().len(), 8 * 6);
    // Skirts are not part of the surface.
    assert_eq!(mesh.triangle_count(), 8);
}

#[test]
fn skirt_height_comes_from_perimeter_materials() {
    init_logger();
    let layer = ElevationLayer::flat(3, 3, 10.0, tile_locator(0, 0, 100.0)).expect("Invalid layer.");
    let landclass = LandclassLayer::from_codes(1, 1, &[GRASS]).expect("Invalid landclass.");
    let mut library = MaterialLibrary::new();
    library.push_region(MaterialRegion::global(
        "world",
        vec![Material {
            skirt_height: Some(20.0),
            ..Material::new("grass")
        }],
    ));
    library.map_landclass(GRASS, "grass");

    let mesh = build(
        &layer,
        Some(&landclass),
        &library,
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    );

    let strip = &mesh.skirts[0];
    let bottom = mesh.vertices[strip[1] as usize];
    assert_eq!(bottom.z, -10.0);
}

#[test]
fn no_skirt_without_a_height() {
    init_logger();
    let layer = ElevationLayer::flat(3, 3, 10.0, tile_locator(0, 0, 100.0)).expect("Invalid layer.");

    let mesh = build(
        &layer,
        None,
        &materials(),
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    );

    assert!(mesh.skirts.is_empty());
    assert!(mesh.skirt_triangles().is_empty());
}

#[test]
fn height_at_intersects_the_surface() {
    init_logger();
    let layer = elevation(5, tile_locator(0, 0, 100.0), |c, _| c as f32 * 2.0);

    let mesh = build(
        &layer,
        None,
        &materials(),
        &ConstraintSet::new(),
        &TerrainConfig::default(),
    );

    let h = mesh.height_at(37.5, 60.0, 100.0).expect("No surface below.");
    assert!((h - 3.0).abs() < 1e-6);
    let h = mesh.height_at(90.0, 10.0, 100.0).expect("No surface below.");
    assert!((h - 7.2).abs() < 1e-6);
    assert_eq!(mesh.height_at(250.0, 50.0, 100.0), None);
}

#[test]
fn constraint_pushes_vertices_below_its_surface() {
    init_logger();
    let layer = ElevationLayer::flat(5, 5, 10.0, tile_locator(0, 0, 100.0)).expect("Invalid layer.");
    let constraints = ConstraintSet::new();
    constraints.add(Arc::new(ConstraintVolume::from_box(
        Vector3::new(10.0, 30.0, 0.0),
        Vector3::new(60.0, 70.0, 8.0),
    )));
    let config = TerrainConfig {
        constraint_gap: 0.5,
        ..Default::default()
    };

    let mesh = build(&layer, None, &materials(), &constraints, &config);

    let under = mesh.vertex_at(1, 2).expect("Missing vertex.");
    assert_eq!((under.x, under.y), (25.0, 50.0));
    assert!((under.z - 7.5).abs() < 1e-9);
    let under = mesh.vertex_at(2, 2).expect("Missing vertex.");
    assert!((under.z - 7.5).abs() < 1e-9);
    let outside = mesh.vertex_at(1, 1).expect("Missing vertex.");
    assert_eq!(outside.z, 10.0);
}

#[test]
fn constraint_set_registration() {
    init_logger();
    let constraints = ConstraintSet::new();
    let vertex = Vector3::new(3.0, 6.0, 2.0);
    assert_eq!(constraints.clip(vertex, 100.0, 1.0), vertex);

    let id = constraints.add(Arc::new(ConstraintVolume::from_box(
        Vector3::new(0.0, 0.0, -10.0),
        Vector3::new(10.0, 10.0, 0.0),
    )));
    assert_eq!(constraints.len(), 1);
    let clipped = constraints.clip(vertex, 100.0, 1.0);
    assert!((clipped.z + 1.0).abs() < 1e-9);
    // Out of probe range.
    assert_eq!(constraints.clip(vertex, 1.0, 1.0), vertex);

    assert!(constraints.remove(id).is_some());
    assert!(constraints.is_empty());
    assert!(constraints.remove(id).is_none());
    assert!(ConstraintVolume::new(Vec::new()).is_none());
}
