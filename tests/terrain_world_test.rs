use cgmath::{Vector2, Vector3};
use terrafx::{
    config::EngineConfig,
    terrain::{
        TerrainWorld,
        constraint::ConstraintVolume,
        features::LineFeature,
        layer::LandclassLayer,
        material::{Material, MaterialLibrary, MaterialRegion, TreeSettings},
        tile::{DirtyMask, SwapMode, TileId},
    },
};

use crate::common::test_utils::{elevation, init_logger, tile_locator};

mod common;

const FOREST: u8 = 3;

fn forest_library() -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    library.push_region(MaterialRegion::global(
        "world",
        vec![Material {
            tree: Some(TreeSettings {
                coverage: 200.0,
                texture: "birch.png".to_string(),
                height: 12.0,
                width: 5.0,
                range: None,
                varieties: 2,
            }),
            ..Material::new("forest")
        }],
    ));
    library.map_landclass(FOREST, "forest");
    library
}

fn world() -> TerrainWorld {
    TerrainWorld::new(&EngineConfig::default(), forest_library())
}

fn flat_tile(world: &TerrainWorld, x: i32, height: f32) -> TileId {
    let id = TileId::new(0, x, 0);
    world.add_tile(id, elevation(8, tile_locator(x, 0, 100.0), |_, _| height), None);
    id
}

fn road() -> LineFeature {
    LineFeature {
        material: "road".to_string(),
        width: 4.0,
        nodes: vec![Vector2::new(12.0, 45.0), Vector2::new(92.0, 45.0)],
    }
}

#[test]
fn neighbouring_tiles_share_their_seam_exactly() {
    init_logger();
    let world = world();
    let west = flat_tile(&world, 0, 10.0);
    let east = flat_tile(&world, 1, 20.0);

    let rebuilt = world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");

    assert!(rebuilt >= 2);
    let mesh = |id| {
        world
            .tile(id)
            .and_then(|t| t.current())
            .expect("Tile has no buffer.")
    };
    let (a, b) = (mesh(west), mesh(east));
    for r in 0..8 {
        let left = a.mesh.vertex_at(7, r).expect("Missing seam vertex.");
        let right = b.mesh.vertex_at(0, r).expect("Missing seam vertex.");
        assert_eq!(left, right);
        assert_eq!(left.z, 15.0);
        assert_eq!(left.x, 100.0);
        assert_eq!(a.mesh.normal_at(7, r), b.mesh.normal_at(0, r));
    }
    // Interior vertices keep their own heights.
    assert_eq!(a.mesh.vertex_at(3, 3).map(|p| p.z), Some(10.0));
    assert_eq!(b.mesh.vertex_at(4, 3).map(|p| p.z), Some(20.0));
    assert!(world.tiles().iter().all(|t| t.dirty().is_empty()));
}

#[test]
fn four_tiles_agree_on_their_shared_corner() {
    init_logger();
    let world = world();
    let tile = |x: i32, y: i32, height: f32| {
        let id = TileId::new(0, x, y);
        world.add_tile(id, elevation(8, tile_locator(x, y, 100.0), |_, _| height), None);
        id
    };
    let (a, b) = (tile(0, 0, 10.0), tile(1, 0, 20.0));
    let (c, d) = (tile(0, 1, 30.0), tile(1, 1, 40.0));

    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");

    let mesh = |id| {
        world
            .tile(id)
            .and_then(|t| t.current())
            .expect("Tile has no buffer.")
    };
    let (a, b, c, d) = (mesh(a), mesh(b), mesh(c), mesh(d));
    for i in 0..8 {
        // South/north seams: A|C and B|D.
        assert_eq!(a.mesh.vertex_at(i, 7), c.mesh.vertex_at(i, 0), "A/C column {i}");
        assert_eq!(a.mesh.normal_at(i, 7), c.mesh.normal_at(i, 0), "A/C column {i}");
        assert_eq!(b.mesh.vertex_at(i, 7), d.mesh.vertex_at(i, 0), "B/D column {i}");
        // East/west seams: A|B and C|D.
        assert_eq!(a.mesh.vertex_at(7, i), b.mesh.vertex_at(0, i), "A/B row {i}");
        assert_eq!(a.mesh.normal_at(7, i), b.mesh.normal_at(0, i), "A/B row {i}");
        assert_eq!(c.mesh.vertex_at(7, i), d.mesh.vertex_at(0, i), "C/D row {i}");
    }

    let corner = a.mesh.vertex_at(7, 7).expect("Missing corner vertex.");
    assert_eq!(corner, Vector3::new(100.0, 100.0, 25.0));
    assert_eq!(b.mesh.vertex_at(0, 7), Some(corner));
    assert_eq!(c.mesh.vertex_at(7, 0), Some(corner));
    assert_eq!(d.mesh.vertex_at(0, 0), Some(corner));
    let normal = a.mesh.normal_at(7, 7);
    assert_eq!(d.mesh.normal_at(0, 0), normal);
    // Corners on the outer boundary only see two tiles.
    assert_eq!(a.mesh.vertex_at(7, 0).map(|p| p.z), Some(15.0));
    assert_eq!(a.mesh.vertex_at(0, 7).map(|p| p.z), Some(20.0));
}

#[test]
fn new_tile_flags_the_corner_of_its_diagonal_neighbour() {
    init_logger();
    let world = world();
    let south_west = flat_tile(&world, 0, 10.0);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");

    world.add_tile(
        TileId::new(0, 1, 1),
        elevation(8, tile_locator(1, 1, 100.0), |_, _| 40.0),
        None,
    );

    let tile = world.tile(south_west).expect("Tile missing.");
    assert_eq!(tile.dirty(), DirtyMask::RIGHT_EDGE | DirtyMask::TOP_EDGE);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    let corner = tile
        .current()
        .and_then(|b| b.mesh.vertex_at(7, 7))
        .expect("Missing corner vertex.");
    assert_eq!(corner.z, 25.0);
}

#[test]
fn new_tile_flags_the_facing_edge_of_its_neighbour() {
    init_logger();
    let world = world();
    let west = flat_tile(&world, 0, 10.0);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");

    flat_tile(&world, 1, 20.0);

    let tile = world.tile(west).expect("Tile missing.");
    assert_eq!(tile.dirty(), DirtyMask::RIGHT_EDGE);
    assert!(world.remove_tile(TileId::new(0, 1, 0)).is_some());
    assert!(world.remove_tile(TileId::new(0, 1, 0)).is_none());
}

#[test]
fn deferred_buffers_wait_for_the_frame_update() {
    init_logger();
    let world = world();
    let id = flat_tile(&world, 0, 10.0);
    let tile = world.tile(id).expect("Tile missing.");

    assert_eq!(world.regenerate_dirty(SwapMode::Deferred).ok(), Some(1));
    assert!(tile.current().is_none());
    assert!(tile.has_pending());

    assert_eq!(world.update(), 1);
    assert!(!tile.has_pending());
    assert_eq!(tile.current().map(|b| b.generation), Some(1));
    assert_eq!(world.update(), 0);
}

#[test]
fn clean_tile_is_not_rebuilt() {
    init_logger();
    let world = world();
    let id = flat_tile(&world, 0, 10.0);

    assert!(world.init_tile(id, SwapMode::Immediate).expect("Build failed."));
    assert!(!world.init_tile(id, SwapMode::Immediate).expect("Build failed."));
    assert!(world.init_tile(TileId::new(0, 9, 9), SwapMode::Immediate).is_err());
}

#[test]
fn constraints_flag_only_the_tiles_they_touch() {
    init_logger();
    let world = world();
    let id = flat_tile(&world, 0, 10.0);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    let tile = world.tile(id).expect("Tile missing.");

    world.add_constraint(ConstraintVolume::from_box(
        Vector3::new(500.0, 500.0, 0.0),
        Vector3::new(510.0, 510.0, 5.0),
    ));
    assert!(tile.dirty().is_empty());

    let pit = world.add_constraint(ConstraintVolume::from_box(
        Vector3::new(20.0, 20.0, -50.0),
        Vector3::new(60.0, 60.0, 4.0),
    ));
    assert_eq!(tile.dirty(), DirtyMask::ALL);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    let buffer = tile.current().expect("Tile has no buffer.");
    // Column 3, row 2 sits at (42.9, 28.6), inside the box.
    let clipped = buffer.mesh.vertex_at(3, 2).expect("Missing vertex.");
    assert!((clipped.z - 3.5).abs() < 1e-9);
    assert_eq!(buffer.mesh.vertex_at(0, 0).map(|p| p.z), Some(10.0));

    assert!(world.remove_constraint(pit));
    assert_eq!(tile.dirty(), DirtyMask::ALL);
    assert!(!world.remove_constraint(pit));
    assert_eq!(world.constraints().len(), 1);
}

#[test]
fn pushed_features_are_draped_on_the_next_rebuild() {
    init_logger();
    let world = world();
    let id = flat_tile(&world, 0, 10.0);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    let tile = world.tile(id).expect("Tile missing.");

    world.push_line_features(7, vec![road()]);
    assert_eq!(tile.dirty(), DirtyMask::ALL);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    assert_eq!(tile.current().map(|b| b.features.len()), Some(1));

    // Clearing a bucket leaves tiles alone until something else rebuilds them.
    world.push_line_features(7, Vec::new());
    assert!(tile.dirty().is_empty());
    assert_eq!(world.regenerate_dirty(SwapMode::Immediate).ok(), Some(0));
    assert_eq!(tile.current().map(|b| b.features.len()), Some(1));

    // An imagery-only rebuild keeps what was draped before.
    tile.mark_dirty(DirtyMask::IMAGERY);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    assert_eq!(tile.current().map(|b| b.features.len()), Some(1));

    tile.mark_dirty(DirtyMask::ALL);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    assert_eq!(tile.current().map(|b| b.features.len()), Some(0));
}

#[test]
fn landclass_drives_scatter_on_the_tile() {
    init_logger();
    let world = world();
    let id = TileId::new(0, 0, 0);
    let landclass =
        LandclassLayer::from_codes(2, 2, &[FOREST; 4]).expect("Invalid landclass layer.");
    world.add_tile(id, elevation(8, tile_locator(0, 0, 100.0), |_, _| 10.0), Some(landclass));

    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");

    let buffer = world
        .tile(id)
        .and_then(|t| t.current())
        .expect("Tile has no buffer.");
    assert_eq!(buffer.batches.len(), 1);
    assert_eq!(buffer.batches[0].label, "trees birch.png 5x12");
    // 10 000 m² at one tree per 200 m², give or take one per triangle.
    let trees = buffer.batches[0].grid.instance_count();
    assert!((30..=70).contains(&trees), "{trees} trees");
    assert_eq!(buffer.stats.placed, trees);

    // Same seed, same forest.
    let tile = world.tile(id).expect("Tile missing.");
    tile.mark_dirty(DirtyMask::ALL);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");
    let again = tile.current().expect("Tile has no buffer.");
    assert_eq!(again.stats, buffer.stats);
    assert!(again.generation > buffer.generation);
}

#[test]
fn replacing_materials_dirties_every_tile() {
    init_logger();
    let world = world();
    let id = flat_tile(&world, 0, 10.0);
    world
        .regenerate_dirty(SwapMode::Immediate)
        .expect("Regeneration failed.");

    world.set_materials(MaterialLibrary::new());

    let tile = world.tile(id).expect("Tile missing.");
    assert_eq!(tile.dirty(), DirtyMask::ALL);
    assert!(world.materials().regions().is_empty());
}
