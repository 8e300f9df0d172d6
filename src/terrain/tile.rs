//! Terrain tiles: input layers, dirty state and the double-buffered output.
//!
//! Render traversal only ever reads [`TerrainTile::current`]. A rebuilt
//! buffer replaces it in one atomic pointer swap, either right away or at the
//! next [`TerrainTile::apply_pending`] call the host makes between frames.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU32, AtomicU64, Ordering},
};

use arc_swap::ArcSwapOption;
use bitflags::bitflags;

use crate::{
    scatter::{InstanceBatch, ScatterStats},
    terrain::{
        features::FeatureMesh,
        layer::{Bounds, ElevationLayer, LandclassLayer},
        mesh::GeneratedMesh,
    },
};

bitflags! {
    /// What about a tile needs rebuilding.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DirtyMask: u32 {
        const IMAGERY = 1 << 0;
        const ELEVATION = 1 << 1;
        const LEFT_EDGE = 1 << 2;
        const RIGHT_EDGE = 1 << 3;
        const TOP_EDGE = 1 << 4;
        const BOTTOM_EDGE = 1 << 5;
        const EDGES = Self::LEFT_EDGE.bits()
            | Self::RIGHT_EDGE.bits()
            | Self::TOP_EDGE.bits()
            | Self::BOTTOM_EDGE.bits();
        const ALL = Self::IMAGERY.bits() | Self::ELEVATION.bits() | Self::EDGES.bits();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    West,
    East,
    South,
    North,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::West, Side::East, Side::South, Side::North];

    pub fn opposite(self) -> Side {
        match self {
            Side::West => Side::East,
            Side::East => Side::West,
            Side::South => Side::North,
            Side::North => Side::South,
        }
    }

    /// The dirty bit of the edge facing this side.
    pub fn edge(self) -> DirtyMask {
        match self {
            Side::West => DirtyMask::LEFT_EDGE,
            Side::East => DirtyMask::RIGHT_EDGE,
            Side::South => DirtyMask::BOTTOM_EDGE,
            Side::North => DirtyMask::TOP_EDGE,
        }
    }
}

/// Position of a tile in its level's grid; `x` grows east, `y` north.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub level: u32,
    pub x: i32,
    pub y: i32,
}

impl TileId {
    pub fn new(level: u32, x: i32, y: i32) -> Self {
        Self { level, x, y }
    }

    pub fn neighbor(self, side: Side) -> TileId {
        let (dx, dy) = match side {
            Side::West => (-1, 0),
            Side::East => (1, 0),
            Side::South => (0, -1),
            Side::North => (0, 1),
        };
        self.offset(dx, dy)
    }

    /// The tile diagonally across the corner between `vertical` and
    /// `horizontal`, e.g. `(South, West)` for the south-west tile.
    pub fn diagonal(self, vertical: Side, horizontal: Side) -> TileId {
        self.neighbor(vertical).neighbor(horizontal)
    }

    pub fn offset(self, dx: i32, dy: i32) -> TileId {
        TileId::new(self.level, self.x + dx, self.y + dy)
    }
}

/// How a rebuilt buffer reaches render traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapMode {
    /// Replace the current buffer right away. For single-threaded hosts.
    Immediate,
    /// Park the buffer until the next frame-boundary update.
    Deferred,
}

/// Everything built for a tile.
#[derive(Clone, Debug)]
pub struct TileBuffer {
    pub generation: u64,
    pub mesh: GeneratedMesh,
    pub features: Vec<FeatureMesh>,
    pub batches: Vec<InstanceBatch>,
    pub stats: ScatterStats,
}

pub struct TerrainTile {
    id: TileId,
    elevation: Arc<ElevationLayer>,
    landclass: Option<Arc<LandclassLayer>>,
    dirty: AtomicU32,
    generation: AtomicU64,
    current: ArcSwapOption<TileBuffer>,
    pending: ArcSwapOption<TileBuffer>,
    building: Mutex<()>,
}

impl std::fmt::Debug for TerrainTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainTile")
            .field("id", &self.id)
            .field("dirty", &self.dirty())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl TerrainTile {
    pub fn new(
        id: TileId,
        elevation: Arc<ElevationLayer>,
        landclass: Option<Arc<LandclassLayer>>,
    ) -> Self {
        Self {
            id,
            elevation,
            landclass,
            dirty: AtomicU32::new(DirtyMask::ALL.bits()),
            generation: AtomicU64::new(0),
            current: ArcSwapOption::empty(),
            pending: ArcSwapOption::empty(),
            building: Mutex::new(()),
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn elevation(&self) -> &Arc<ElevationLayer> {
        &self.elevation
    }

    pub fn landclass(&self) -> Option<&Arc<LandclassLayer>> {
        self.landclass.as_ref()
    }

    pub fn bounds(&self) -> Bounds {
        self.elevation.locator().bounds()
    }

    pub fn dirty(&self) -> DirtyMask {
        DirtyMask::from_bits_truncate(self.dirty.load(Ordering::Acquire))
    }

    pub fn mark_dirty(&self, mask: DirtyMask) {
        self.dirty.fetch_or(mask.bits(), Ordering::AcqRel);
    }

    /// Clears and returns the dirty mask.
    pub fn take_dirty(&self) -> DirtyMask {
        DirtyMask::from_bits_truncate(self.dirty.swap(0, Ordering::AcqRel))
    }

    /// Held while the tile is being rebuilt.
    pub(crate) fn build_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.building.lock().ok()
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The buffer render traversal should draw.
    pub fn current(&self) -> Option<Arc<TileBuffer>> {
        self.current.load_full()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load().is_some()
    }

    pub fn install(&self, buffer: Arc<TileBuffer>, mode: SwapMode) {
        match mode {
            SwapMode::Immediate => {
                self.pending.store(None);
                self.current.store(Some(buffer));
            }
            SwapMode::Deferred => self.pending.store(Some(buffer)),
        }
    }

    /// Promotes a parked buffer to current. Returns whether one was waiting.
    pub fn apply_pending(&self) -> bool {
        match self.pending.swap(None) {
            Some(buffer) => {
                self.current.store(Some(buffer));
                true
            }
            None => false,
        }
    }
}
