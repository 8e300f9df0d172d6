//! Spatial index of scattered instances: a fixed `N × N` grid over the
//! instances' bounding rectangle, one batched leaf per occupied cell.

use crate::data_structures::instance::{Instance, InstanceRaw};

/// Cell count per axis for `count` instances: enough cells that a leaf holds
/// about `leaf_capacity` instances, capped at `max`.
pub fn dimension_for(count: usize, leaf_capacity: usize, max: usize) -> usize {
    if count == 0 {
        return 1;
    }
    let leaves = count.div_ceil(leaf_capacity.max(1));
    ((leaves as f64).sqrt().ceil() as usize).clamp(1, max.max(1))
}

/// One drawable batch.
#[derive(Clone, Debug)]
pub struct Leaf {
    pub cell: (usize, usize),
    /// Tile-local rectangle `(min, max)` covered by the cell.
    pub bounds: ([f32; 2], [f32; 2]),
    pub range: f32,
    pub instances: Vec<Instance>,
}

impl Leaf {
    pub fn raw(&self) -> Vec<InstanceRaw> {
        self.instances.iter().map(Instance::to_raw).collect()
    }
}

#[derive(Clone, Debug)]
pub struct SpatialGrid {
    dimension: usize,
    leaves: Vec<Leaf>,
}

impl SpatialGrid {
    /// Sorts `instances` (in tile-local coordinates) into a
    /// `dimension × dimension` grid and drops the cells nobody landed in.
    pub fn build(instances: Vec<Instance>, dimension: usize, range: f32) -> Self {
        let dimension = dimension.max(1);
        if instances.is_empty() {
            return Self {
                dimension,
                leaves: Vec::new(),
            };
        }
        let (mut min, mut max) = ([f32::MAX; 2], [f32::MIN; 2]);
        for i in &instances {
            min[0] = min[0].min(i.position.x);
            min[1] = min[1].min(i.position.y);
            max[0] = max[0].max(i.position.x);
            max[1] = max[1].max(i.position.y);
        }
        let size = [max[0] - min[0], max[1] - min[1]];
        let cell_of = |value: f32, axis: usize| -> usize {
            if size[axis] <= 0.0 {
                return 0;
            }
            let f = (value - min[axis]) / size[axis] * dimension as f32;
            (f.max(0.0) as usize).min(dimension - 1)
        };

        let mut leaves: Vec<Leaf> = (0..dimension * dimension)
            .map(|i| {
                let (x, y) = (i % dimension, i / dimension);
                let step = [size[0] / dimension as f32, size[1] / dimension as f32];
                Leaf {
                    cell: (x, y),
                    bounds: (
                        [min[0] + step[0] * x as f32, min[1] + step[1] * y as f32],
                        [min[0] + step[0] * (x + 1) as f32, min[1] + step[1] * (y + 1) as f32],
                    ),
                    range,
                    instances: Vec::new(),
                }
            })
            .collect();
        for instance in instances {
            let x = cell_of(instance.position.x, 0);
            let y = cell_of(instance.position.y, 1);
            leaves[y * dimension + x].instances.push(instance);
        }
        leaves.retain(|leaf| !leaf.instances.is_empty());
        Self { dimension, leaves }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn instance_count(&self) -> usize {
        self.leaves.iter().map(|l| l.instances.len()).sum()
    }
}
