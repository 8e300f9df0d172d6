//! Tile mesh generation.
//!
//! A tile's elevation layer is resampled into a `columns × rows` vertex grid.
//! With boundary stitching on, vertices on an edge shared with a loaded
//! neighbour are computed from both tiles' layers by one function of
//! `(western or southern tile, eastern or northern tile, position along the
//! edge)`. Both tiles evaluate it with the same arguments, so seam vertices
//! come out bit-identical. A grid corner is shared by up to four tiles and is
//! computed from all of them, in a fixed south-west, south-east, north-west,
//! north-east order.
//!
//! Each grid cell becomes two triangles (or one, when a corner has no data).
//! A cell goes to the water buffer only when every corner it uses is water.

use cgmath::{InnerSpace, Vector2, Vector3};

use crate::{
    config::TerrainConfig,
    data_structures::property_root::PropertyRoot,
    terrain::{
        constraint::{ConstraintSet, segment_triangle},
        layer::{ElevationLayer, LandclassLayer, Locator},
        material::MaterialLibrary,
    },
};

/// Vertex as uploaded to the GPU, positioned relative to the tile center.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl TerrainVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<TerrainVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Elevation layers of the eight tiles around the one being built.
#[derive(Clone, Copy, Debug, Default)]
pub struct Neighbors<'a> {
    pub west: Option<&'a ElevationLayer>,
    pub east: Option<&'a ElevationLayer>,
    pub south: Option<&'a ElevationLayer>,
    pub north: Option<&'a ElevationLayer>,
    pub south_west: Option<&'a ElevationLayer>,
    pub south_east: Option<&'a ElevationLayer>,
    pub north_west: Option<&'a ElevationLayer>,
    pub north_east: Option<&'a ElevationLayer>,
}

pub struct MeshInputs<'a> {
    pub elevation: &'a ElevationLayer,
    pub landclass: Option<&'a LandclassLayer>,
    pub neighbors: Neighbors<'a>,
    pub materials: &'a MaterialLibrary,
    pub properties: Option<&'a PropertyRoot>,
    pub constraints: &'a ConstraintSet,
    pub config: &'a TerrainConfig,
}

/// One tile's generated geometry, in world coordinates.
#[derive(Clone, Debug)]
pub struct GeneratedMesh {
    pub columns: usize,
    pub rows: usize,
    pub center: Vector3<f64>,
    pub vertices: Vec<Vector3<f64>>,
    pub normals: Vec<Vector3<f64>>,
    pub tex_coords: Vec<Vector2<f64>>,
    /// Vertex index per grid position, `None` where the layer has no data.
    pub grid: Vec<Option<u32>>,
    pub land: Vec<u32>,
    pub water: Vec<u32>,
    /// Triangle strips (`top, bottom, top, bottom, ..`) hanging below each
    /// contiguous run of valid perimeter vertices.
    pub skirts: Vec<Vec<u32>>,
    triangles: Vec<[u32; 3]>,
    water_triangles: Vec<bool>,
    cell_start: Vec<u32>,
    locator: Option<Locator>,
    z_range: (f64, f64),
}

impl GeneratedMesh {
    fn empty(columns: usize, rows: usize, center: Vector3<f64>, locator: Locator) -> Self {
        Self {
            columns,
            rows,
            center,
            vertices: Vec::new(),
            normals: Vec::new(),
            tex_coords: Vec::new(),
            grid: Vec::with_capacity(columns * rows),
            land: Vec::new(),
            water: Vec::new(),
            skirts: Vec::new(),
            triangles: Vec::new(),
            water_triangles: Vec::new(),
            cell_start: Vec::new(),
            locator: Some(locator),
            z_range: (f64::INFINITY, f64::NEG_INFINITY),
        }
    }
}

/// Grid size a layer is resampled to for a given sampling ratio.
pub fn mesh_dimensions(layer: &ElevationLayer, sample_ratio: f32) -> (usize, usize) {
    let scale = |n: usize| ((((n - 1) as f32) * sample_ratio).round() as usize + 1).max(2);
    (scale(layer.columns()), scale(layer.rows()))
}

/// A layer seen through the mesh grid it is resampled to.
#[derive(Clone, Copy)]
struct Surface<'a> {
    layer: &'a ElevationLayer,
    columns: usize,
    rows: usize,
    direct: bool,
    vertical_scale: f64,
}

impl<'a> Surface<'a> {
    fn new(layer: &'a ElevationLayer, config: &TerrainConfig) -> Self {
        let (columns, rows) = mesh_dimensions(layer, config.sample_ratio);
        Self {
            layer,
            columns,
            rows,
            direct: columns == layer.columns() && rows == layer.rows(),
            vertical_scale: config.vertical_scale as f64,
        }
    }

    fn u(&self, column: usize) -> f64 {
        column as f64 / (self.columns - 1) as f64
    }

    fn v(&self, row: usize) -> f64 {
        row as f64 / (self.rows - 1) as f64
    }

    fn height(&self, column: usize, row: usize) -> Option<f64> {
        let h = if self.direct {
            self.layer.height(column, row)
        } else {
            self.layer.sample(self.u(column), self.v(row))
        };
        h.map(|h| h * self.vertical_scale)
    }

    fn position(&self, column: usize, row: usize) -> Option<Vector3<f64>> {
        let h = self.height(column, row)?;
        Some(self.layer.locator().to_world(self.u(column), self.v(row), h))
    }
}

fn average(first: Option<f64>, second: Option<f64>) -> Option<f64> {
    match (first, second) {
        (Some(a), Some(b)) => Some((a + b) * 0.5),
        (a, b) => a.or(b),
    }
}

/// Normal from the neighbours left/right and below/above a vertex. A missing
/// neighbour is replaced by the vertex itself.
fn normal_from(
    center: Vector3<f64>,
    left: Option<Vector3<f64>>,
    right: Option<Vector3<f64>>,
    down: Option<Vector3<f64>>,
    up: Option<Vector3<f64>>,
) -> Vector3<f64> {
    let across = right.unwrap_or(center) - left.unwrap_or(center);
    let along = up.unwrap_or(center) - down.unwrap_or(center);
    let n = across.cross(along);
    if n.magnitude2() > 0.0 {
        n.normalize()
    } else {
        Vector3::unit_z()
    }
}

/// Seam vertex `row` of the edge between `west` and `east`.
fn east_west_seam(
    west: &Surface,
    east: &Surface,
    row: usize,
) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let locator = west.layer.locator();
    let edge = |r: usize| {
        let h = average(west.height(west.columns - 1, r), east.height(0, r))?;
        Some(locator.to_world(1.0, west.v(r), h))
    };
    let position = edge(row)?;
    let normal = normal_from(
        position,
        west.position(west.columns - 2, row),
        east.position(1, row),
        row.checked_sub(1).and_then(edge),
        (row + 1 < west.rows).then(|| edge(row + 1)).flatten(),
    );
    Some((position, normal))
}

/// Seam vertex `column` of the edge between `south` and `north`.
fn south_north_seam(
    south: &Surface,
    north: &Surface,
    column: usize,
) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let locator = south.layer.locator();
    let edge = |c: usize| {
        let h = average(south.height(c, south.rows - 1), north.height(c, 0))?;
        Some(locator.to_world(south.u(c), 1.0, h))
    };
    let position = edge(column)?;
    let normal = normal_from(
        position,
        column.checked_sub(1).and_then(edge),
        (column + 1 < south.columns).then(|| edge(column + 1)).flatten(),
        south.position(column, south.rows - 2),
        north.position(column, 1),
    );
    Some((position, normal))
}

/// Averages the available samples in order and places the result with the
/// first tile that has data.
fn shared_point(samples: &[Option<(&Surface<'_>, usize, usize)>]) -> Option<Vector3<f64>> {
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut anchor = None;
    for &(surface, column, row) in samples.iter().flatten() {
        if let Some(h) = surface.height(column, row) {
            sum += h;
            count += 1;
            anchor.get_or_insert((surface, column, row));
        }
    }
    let (surface, column, row) = anchor?;
    Some(
        surface
            .layer
            .locator()
            .to_world(surface.u(column), surface.v(row), sum / count as f64),
    )
}

/// Vertex where the tiles `[south_west, south_east, north_west, north_east]`
/// meet.
fn corner_seam(tiles: [Option<&Surface<'_>>; 4]) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let [sw, se, nw, ne] = tiles;
    let position = shared_point(&[
        sw.map(|s| (s, s.columns - 1, s.rows - 1)),
        se.map(|s| (s, 0, s.rows - 1)),
        nw.map(|s| (s, s.columns - 1, 0)),
        ne.map(|s| (s, 0, 0)),
    ])?;
    let left = shared_point(&[
        sw.map(|s| (s, s.columns - 2, s.rows - 1)),
        nw.map(|s| (s, s.columns - 2, 0)),
    ]);
    let right = shared_point(&[se.map(|s| (s, 1, s.rows - 1)), ne.map(|s| (s, 1, 0))]);
    let down = shared_point(&[
        sw.map(|s| (s, s.columns - 1, s.rows - 2)),
        se.map(|s| (s, 0, s.rows - 2)),
    ]);
    let up = shared_point(&[nw.map(|s| (s, s.columns - 1, 1)), ne.map(|s| (s, 0, 1))]);
    Some((position, normal_from(position, left, right, down, up)))
}

pub fn generate(inputs: &MeshInputs) -> GeneratedMesh {
    let config = inputs.config;
    let own = Surface::new(inputs.elevation, config);
    let (columns, rows) = (own.columns, own.rows);
    let locator = *inputs.elevation.locator();
    let at = |c: usize, r: usize| r * columns + c;

    let mut positions: Vec<Option<Vector3<f64>>> = (0..rows)
        .flat_map(|r| (0..columns).map(move |c| (c, r)))
        .map(|(c, r)| own.position(c, r))
        .collect();
    let mut seam_normals: Vec<Option<Vector3<f64>>> = vec![None; columns * rows];

    if config.boundary_stitching {
        let n = &inputs.neighbors;
        let neighbor = |layer| Option::map(layer, |l| Surface::new(l, config));
        let (south_all, north_all) = (neighbor(n.south), neighbor(n.north));
        let (west_all, east_all) = (neighbor(n.west), neighbor(n.east));
        let south = south_all.filter(|s| s.columns == columns);
        let north = north_all.filter(|s| s.columns == columns);
        let west = west_all.filter(|s| s.rows == rows);
        let east = east_all.filter(|s| s.rows == rows);
        let (south_west, south_east) = (neighbor(n.south_west), neighbor(n.south_east));
        let (north_west, north_east) = (neighbor(n.north_west), neighbor(n.north_east));

        let mut apply = |index: usize, seam: Option<(Vector3<f64>, Vector3<f64>)>| {
            positions[index] = seam.map(|s| s.0);
            seam_normals[index] = seam.map(|s| s.1);
        };
        for c in 0..columns {
            if let Some(south) = &south {
                apply(at(c, 0), south_north_seam(south, &own, c));
            }
            if let Some(north) = &north {
                apply(at(c, rows - 1), south_north_seam(&own, north, c));
            }
        }
        for r in 0..rows {
            if let Some(west) = &west {
                apply(at(0, r), east_west_seam(west, &own, r));
            }
            if let Some(east) = &east {
                apply(at(columns - 1, r), east_west_seam(&own, east, r));
            }
        }

        let corners = [
            (
                at(0, 0),
                [south_west.as_ref(), south_all.as_ref(), west_all.as_ref(), Some(&own)],
            ),
            (
                at(columns - 1, 0),
                [south_all.as_ref(), south_east.as_ref(), Some(&own), east_all.as_ref()],
            ),
            (
                at(0, rows - 1),
                [west_all.as_ref(), Some(&own), north_west.as_ref(), north_all.as_ref()],
            ),
            (
                at(columns - 1, rows - 1),
                [Some(&own), east_all.as_ref(), north_all.as_ref(), north_east.as_ref()],
            ),
        ];
        for (index, tiles) in corners {
            // A corner nobody else touches keeps its own sample.
            if tiles.iter().flatten().count() > 1 {
                apply(index, corner_seam(tiles));
            }
        }
    }

    let get = |c: Option<usize>, r: Option<usize>| -> Option<Vector3<f64>> {
        let (c, r) = (c?, r?);
        (c < columns && r < rows).then(|| positions[at(c, r)]).flatten()
    };
    let normals_grid: Vec<Option<Vector3<f64>>> = (0..rows)
        .flat_map(|r| (0..columns).map(move |c| (c, r)))
        .map(|(c, r)| {
            let center = positions[at(c, r)]?;
            Some(seam_normals[at(c, r)].unwrap_or_else(|| {
                normal_from(
                    center,
                    get(c.checked_sub(1), Some(r)),
                    get(Some(c + 1), Some(r)),
                    get(Some(c), r.checked_sub(1)),
                    get(Some(c), Some(r + 1)),
                )
            }))
        })
        .collect();

    let center_height = inputs.elevation.sample(0.5, 0.5).unwrap_or(0.0) * own.vertical_scale;
    let mut mesh = GeneratedMesh::empty(columns, rows, locator.center(center_height), locator);
    let mut water_vertex = Vec::new();
    let mut skirt_height: Option<f64> = None;

    for r in 0..rows {
        for c in 0..columns {
            let Some(position) = positions[at(c, r)] else {
                mesh.grid.push(None);
                continue;
            };
            let position = inputs.constraints.clip(
                position,
                config.constraint_probe_height,
                config.constraint_gap,
            );
            let (u, v) = (own.u(c), own.v(r));
            let material = inputs.landclass.and_then(|l| {
                inputs.materials.for_landclass(
                    l.landclass(u, v),
                    Vector2::new(position.x, position.y),
                    inputs.properties,
                )
            });
            let perimeter = c == 0 || r == 0 || c == columns - 1 || r == rows - 1;
            if perimeter && let Some(h) = material.as_ref().and_then(|m| m.skirt_height) {
                skirt_height = Some(skirt_height.map_or(h, |s: f64| s.max(h)));
            }
            water_vertex.push(material.is_some_and(|m| m.water));

            mesh.grid.push(Some(mesh.vertices.len() as u32));
            mesh.z_range.0 = mesh.z_range.0.min(position.z);
            mesh.z_range.1 = mesh.z_range.1.max(position.z);
            mesh.vertices.push(position);
            mesh.normals.push(normals_grid[at(c, r)].unwrap_or(Vector3::unit_z()));
            mesh.tex_coords.push(Vector2::new(u, v));
        }
    }

    emit_cells(&mut mesh, &water_vertex);
    let skirt_height = skirt_height.unwrap_or(config.default_skirt_height);
    if skirt_height != 0.0 {
        emit_skirts(&mut mesh, skirt_height);
    }
    log::debug!(
        "Generated {columns}x{rows} mesh: {} land, {} water triangles, {} skirt strip(s)",
        mesh.land.len() / 3,
        mesh.water.len() / 3,
        mesh.skirts.len()
    );
    mesh
}

fn emit_cells(mesh: &mut GeneratedMesh, water_vertex: &[bool]) {
    let (columns, rows) = (mesh.columns, mesh.rows);
    mesh.cell_start.push(0);
    for r in 0..rows - 1 {
        for c in 0..columns - 1 {
            // Counter-clockwise around the cell, seen from above.
            let corners = [
                mesh.grid[r * columns + c],
                mesh.grid[r * columns + c + 1],
                mesh.grid[(r + 1) * columns + c + 1],
                mesh.grid[(r + 1) * columns + c],
            ];
            let valid: Vec<u32> = corners.iter().flatten().copied().collect();
            let water = valid.iter().all(|&i| water_vertex[i as usize]);
            match corners {
                [Some(i00), Some(i10), Some(i11), Some(i01)] => {
                    let n = |i: u32| mesh.normals[i as usize];
                    let split_00_11 = n(i00).dot(n(i11)) >= n(i10).dot(n(i01));
                    let pair = if split_00_11 {
                        [[i00, i10, i11], [i00, i11, i01]]
                    } else {
                        [[i00, i10, i01], [i10, i11, i01]]
                    };
                    for tri in pair {
                        mesh.triangles.push(tri);
                        mesh.water_triangles.push(water);
                    }
                }
                _ if valid.len() == 3 => {
                    mesh.triangles.push([valid[0], valid[1], valid[2]]);
                    mesh.water_triangles.push(water);
                }
                _ => {}
            }
            mesh.cell_start.push(mesh.triangles.len() as u32);
        }
    }
    for (tri, &water) in mesh.triangles.iter().zip(&mesh.water_triangles) {
        if water {
            mesh.water.extend_from_slice(tri);
        } else {
            mesh.land.extend_from_slice(tri);
        }
    }
}

fn emit_skirts(mesh: &mut GeneratedMesh, height: f64) {
    let (columns, rows) = (mesh.columns, mesh.rows);
    let mut ring: Vec<Option<u32>> = Vec::with_capacity(2 * (columns + rows));
    ring.extend((0..columns).map(|c| mesh.grid[c]));
    ring.extend((1..rows).map(|r| mesh.grid[r * columns + columns - 1]));
    ring.extend((0..columns - 1).rev().map(|c| mesh.grid[(rows - 1) * columns + c]));
    ring.extend((1..rows - 1).rev().map(|r| mesh.grid[r * columns]));

    let runs: Vec<Vec<u32>> = match ring.iter().position(Option::is_none) {
        None => {
            let mut closed: Vec<u32> = ring.iter().flatten().copied().collect();
            closed.extend(closed.first().copied());
            vec![closed]
        }
        Some(gap) => {
            ring.rotate_left(gap);
            ring.split(Option::is_none)
                .map(|run| run.iter().flatten().copied().collect())
                .collect()
        }
    };

    let drop = Vector3::unit_z() * height;
    for run in runs.into_iter().filter(|run| run.len() >= 2) {
        let mut strip = Vec::with_capacity(run.len() * 2);
        for top in run {
            let bottom = mesh.vertices.len() as u32;
            let t = top as usize;
            mesh.vertices.push(mesh.vertices[t] - drop);
            mesh.normals.push(mesh.normals[t]);
            mesh.tex_coords.push(mesh.tex_coords[t]);
            strip.push(top);
            strip.push(bottom);
        }
        mesh.skirts.push(strip);
    }
}

impl GeneratedMesh {
    pub fn locator(&self) -> Option<&Locator> {
        self.locator.as_ref()
    }

    pub fn vertex_at(&self, column: usize, row: usize) -> Option<Vector3<f64>> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.grid[row * self.columns + column].map(|i| self.vertices[i as usize])
    }

    pub fn normal_at(&self, column: usize, row: usize) -> Option<Vector3<f64>> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.grid[row * self.columns + column].map(|i| self.normals[i as usize])
    }

    /// Surface triangles with their water flag; skirts are not included.
    pub fn triangles(&self) -> impl Iterator<Item = ([u32; 3], bool)> + '_ {
        self.triangles
            .iter()
            .copied()
            .zip(self.water_triangles.iter().copied())
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Skirt strips unrolled into a triangle list.
    pub fn skirt_triangles(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for strip in &self.skirts {
            for quad in strip.windows(4).step_by(2) {
                out.extend_from_slice(&[quad[0], quad[1], quad[3], quad[0], quad[3], quad[2]]);
            }
        }
        out
    }

    /// Height of the topmost surface triangle above `(x, y)`.
    pub fn height_at(&self, x: f64, y: f64, probe: f64) -> Option<f64> {
        let locator = self.locator?;
        if self.triangles.is_empty() {
            return None;
        }
        let local = locator.to_local(x, y);
        let cell = |coord: f64, count: usize| {
            let f = (coord * (count - 1) as f64).floor();
            (f.max(0.0) as usize).min(count - 2)
        };
        let (c, r) = (cell(local.x, self.columns), cell(local.y, self.rows));
        let start = Vector3::new(x, y, self.z_range.1 + probe);
        let end = Vector3::new(x, y, self.z_range.0 - probe);

        // Clipping can shift vertices, so look at the neighbouring cells too.
        let mut best: Option<f64> = None;
        for rr in r.saturating_sub(1)..=(r + 1).min(self.rows - 2) {
            for cc in c.saturating_sub(1)..=(c + 1).min(self.columns - 2) {
                let cell = rr * (self.columns - 1) + cc;
                let range = self.cell_start[cell] as usize..self.cell_start[cell + 1] as usize;
                for tri in &self.triangles[range] {
                    let corners = tri.map(|i| self.vertices[i as usize]);
                    if let Some(t) = segment_triangle(start, end, &corners) {
                        best = Some(best.map_or(t, |b| b.min(t)));
                    }
                }
            }
        }
        best.map(|t| start.z + (end.z - start.z) * t)
    }

    /// Vertices relative to the tile center, ready for upload.
    pub fn vertex_data(&self) -> Vec<TerrainVertex> {
        self.vertices
            .iter()
            .zip(&self.normals)
            .zip(&self.tex_coords)
            .map(|((p, n), t)| {
                let p = p - self.center;
                TerrainVertex {
                    position: [p.x as f32, p.y as f32, p.z as f32],
                    normal: [n.x as f32, n.y as f32, n.z as f32],
                    tex_coords: [t.x as f32, t.y as f32],
                }
            })
            .collect()
    }
}
