//! Vector features draped over tile meshes: roads and other line features,
//! area polygons and coastlines.
//!
//! Features arrive per geographic bucket. For each tile they are clipped to
//! the tile's bounds, projected onto its generated mesh and turned into
//! ribbons (lines, coastlines) or flat tessellated polygons (areas).

use cgmath::{InnerSpace, Vector2, Vector3};

use crate::{
    config::TerrainConfig,
    terrain::{layer::Bounds, mesh::GeneratedMesh, tessellate},
};

pub type BucketId = i64;

#[derive(Clone, Debug)]
pub struct LineFeature {
    pub material: String,
    pub width: f64,
    pub nodes: Vec<Vector2<f64>>,
}

/// A closed polygon; the first node is not repeated at the end.
#[derive(Clone, Debug)]
pub struct AreaFeature {
    pub material: String,
    pub nodes: Vec<Vector2<f64>>,
}

/// A shoreline with land on its left-hand side.
#[derive(Clone, Debug)]
pub struct Coastline {
    pub nodes: Vec<Vector2<f64>>,
}

/// Features of one geographic bucket.
#[derive(Clone, Debug, Default)]
pub struct FeatureBucket {
    pub bounds: Option<Bounds>,
    pub lines: Vec<LineFeature>,
    pub areas: Vec<AreaFeature>,
    pub coastlines: Vec<Coastline>,
}

impl FeatureBucket {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.areas.is_empty() && self.coastlines.is_empty()
    }

    pub fn intersects(&self, bounds: &Bounds) -> bool {
        self.bounds.is_some_and(|b| b.intersects(bounds))
    }

    /// Grows the bucket bounds to cover `nodes`.
    pub fn cover(&mut self, nodes: &[Vector2<f64>]) {
        let covered = Bounds::from_points(
            nodes
                .iter()
                .copied()
                .chain(self.bounds.iter().flat_map(|b| [b.min, b.max])),
        );
        if covered.is_some() {
            self.bounds = covered;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Line,
    Area,
    Coastline,
}

/// Triangles of one draped feature.
#[derive(Clone, Debug)]
pub struct FeatureMesh {
    pub kind: FeatureKind,
    pub material: String,
    pub vertices: Vec<Vector3<f64>>,
    pub normals: Vec<Vector3<f64>>,
    pub tex_coords: Vec<Vector2<f64>>,
    pub indices: Vec<u32>,
}

impl FeatureMesh {
    fn new(kind: FeatureKind, material: &str) -> Self {
        Self {
            kind,
            material: material.to_string(),
            vertices: Vec::new(),
            normals: Vec::new(),
            tex_coords: Vec::new(),
            indices: Vec::new(),
        }
    }

    fn push(&mut self, position: Vector3<f64>, tex: Vector2<f64>) -> u32 {
        self.vertices.push(position);
        self.normals.push(Vector3::unit_z());
        self.tex_coords.push(tex);
        (self.vertices.len() - 1) as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Liang–Barsky: the parameter range of `a..b` inside `bounds`.
pub fn clip_segment(a: Vector2<f64>, b: Vector2<f64>, bounds: &Bounds) -> Option<(f64, f64)> {
    let d = b - a;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    let edges = [
        (-d.x, a.x - bounds.min.x),
        (d.x, bounds.max.x - a.x),
        (-d.y, a.y - bounds.min.y),
        (d.y, bounds.max.y - a.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((t0, t1))
}

/// Pieces of a polyline inside `bounds`. A path that leaves and re-enters
/// the rectangle comes back as several pieces.
pub fn clip_polyline(nodes: &[Vector2<f64>], bounds: &Bounds) -> Vec<Vec<Vector2<f64>>> {
    let mut pieces: Vec<Vec<Vector2<f64>>> = Vec::new();
    let mut current: Vec<Vector2<f64>> = Vec::new();
    for pair in nodes.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        match clip_segment(a, b, bounds) {
            Some((t0, t1)) => {
                let start = a + (b - a) * t0;
                let end = a + (b - a) * t1;
                if current.last() != Some(&start) {
                    if current.len() >= 2 {
                        pieces.push(std::mem::take(&mut current));
                    }
                    current.clear();
                    current.push(start);
                }
                current.push(end);
                if t1 < 1.0 {
                    pieces.push(std::mem::take(&mut current));
                }
            }
            None => {
                if current.len() >= 2 {
                    pieces.push(std::mem::take(&mut current));
                }
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        pieces.push(current);
    }
    pieces.retain(|p| p.len() >= 2);
    pieces
}

/// Sutherland–Hodgman clip of a closed ring against `bounds`.
pub fn clip_polygon(ring: &[Vector2<f64>], bounds: &Bounds) -> Vec<Vector2<f64>> {
    type Inside = fn(Vector2<f64>, &Bounds) -> bool;
    type Cross = fn(Vector2<f64>, Vector2<f64>, &Bounds) -> Vector2<f64>;
    fn at_x(a: Vector2<f64>, b: Vector2<f64>, x: f64) -> Vector2<f64> {
        a + (b - a) * ((x - a.x) / (b.x - a.x))
    }
    fn at_y(a: Vector2<f64>, b: Vector2<f64>, y: f64) -> Vector2<f64> {
        a + (b - a) * ((y - a.y) / (b.y - a.y))
    }
    let planes: [(Inside, Cross); 4] = [
        (|p, b| p.x >= b.min.x, |p, q, b| at_x(p, q, b.min.x)),
        (|p, b| p.x <= b.max.x, |p, q, b| at_x(p, q, b.max.x)),
        (|p, b| p.y >= b.min.y, |p, q, b| at_y(p, q, b.min.y)),
        (|p, b| p.y <= b.max.y, |p, q, b| at_y(p, q, b.max.y)),
    ];
    let mut output = ring.to_vec();
    for (inside, cross) in planes {
        let input = std::mem::take(&mut output);
        for (i, &p) in input.iter().enumerate() {
            let prev = input[(i + input.len() - 1) % input.len()];
            match (inside(prev, bounds), inside(p, bounds)) {
                (true, true) => output.push(p),
                (true, false) => output.push(cross(prev, p, bounds)),
                (false, true) => {
                    output.push(cross(prev, p, bounds));
                    output.push(p);
                }
                (false, false) => {}
            }
        }
        if output.is_empty() {
            break;
        }
    }
    output
}

/// Projects a clipped path onto the mesh, adding points every `step` so the
/// result follows the terrain between nodes. Points off the mesh are dropped.
pub fn drape(
    path: &[Vector2<f64>],
    mesh: &GeneratedMesh,
    step: f64,
    config: &TerrainConfig,
) -> Vec<Vector3<f64>> {
    let mut draped = Vec::new();
    let mut project = |p: Vector2<f64>| {
        if let Some(z) = mesh.height_at(p.x, p.y, config.feature_probe_height) {
            draped.push(Vector3::new(p.x, p.y, z + config.feature_elevation_offset));
        }
    };
    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let steps = ((b - a).magnitude() / step).ceil().max(1.0) as usize;
        for s in 0..steps {
            project(a + (b - a) * (s as f64 / steps as f64));
        }
    }
    if let Some(&last) = path.last() {
        project(last);
    }
    draped
}

/// A ribbon `width` wide centred on `path`. `u` runs 0 on the left edge to 1
/// on the right; `v` grows by one per `width` travelled. `right_edge` may
/// displace the right-hand vertex given its position and outward direction.
fn ribbon(
    kind: FeatureKind,
    material: &str,
    path: &[Vector3<f64>],
    width: f64,
    right_edge: impl Fn(Vector3<f64>, Vector3<f64>) -> Vector3<f64>,
) -> Option<FeatureMesh> {
    let mut points: Vec<Vector3<f64>> = Vec::with_capacity(path.len());
    for &p in path {
        if points.last().is_none_or(|q: &Vector3<f64>| (p - *q).magnitude2() > 0.0) {
            points.push(p);
        }
    }
    if points.len() < 2 || width <= 0.0 {
        return None;
    }
    let mut mesh = FeatureMesh::new(kind, material);
    let mut length = 0.0;
    for i in 0..points.len() {
        let before = points[i.saturating_sub(1)];
        let after = points[(i + 1).min(points.len() - 1)];
        let dir = Vector2::new(after.x - before.x, after.y - before.y).normalize();
        let left = Vector3::new(-dir.y, dir.x, 0.0);
        if i > 0 {
            let d = points[i] - points[i - 1];
            length += Vector2::new(d.x, d.y).magnitude();
        }
        let v = length / width;
        let l = mesh.push(points[i] + left * (width * 0.5), Vector2::new(0.0, v));
        let r = mesh.push(
            right_edge(points[i] - left * (width * 0.5), -left),
            Vector2::new(1.0, v),
        );
        if i > 0 {
            let (l0, r0) = (l - 2, r - 2);
            mesh.indices.extend_from_slice(&[l0, r0, r, l0, r, l]);
        }
    }
    Some(mesh)
}

fn mesh_step(mesh: &GeneratedMesh) -> f64 {
    mesh.locator().map_or(1.0, |l| {
        let e = l.extent();
        (e.x / (mesh.columns - 1) as f64).min(e.y / (mesh.rows - 1) as f64)
    })
}

pub fn build_line(
    feature: &LineFeature,
    mesh: &GeneratedMesh,
    bounds: &Bounds,
    config: &TerrainConfig,
) -> Vec<FeatureMesh> {
    let step = mesh_step(mesh);
    clip_polyline(&feature.nodes, bounds)
        .iter()
        .filter_map(|piece| {
            let path = drape(piece, mesh, step, config);
            ribbon(FeatureKind::Line, &feature.material, &path, feature.width, |p, _| p)
        })
        .collect()
}

/// Coastline ribbons lift their seaward edge and push it outward.
pub fn build_coastline(
    coastline: &Coastline,
    mesh: &GeneratedMesh,
    bounds: &Bounds,
    config: &TerrainConfig,
) -> Vec<FeatureMesh> {
    let step = mesh_step(mesh);
    let tilt = config.coastline_tilt;
    clip_polyline(&coastline.nodes, bounds)
        .iter()
        .filter_map(|piece| {
            let path = drape(piece, mesh, step, config);
            ribbon(
                FeatureKind::Coastline,
                "coastline",
                &path,
                config.coastline_width,
                |p, outward| p + outward * tilt + Vector3::unit_z() * tilt,
            )
        })
        .collect()
}

/// A flat polygon at the mean mesh height under its boundary. Polygons with
/// no boundary vertex on the mesh produce nothing.
pub fn build_area(
    area: &AreaFeature,
    mesh: &GeneratedMesh,
    bounds: &Bounds,
    config: &TerrainConfig,
) -> Option<FeatureMesh> {
    let ring = clip_polygon(&area.nodes, bounds);
    if ring.len() < 3 {
        return None;
    }
    let heights: Vec<f64> = ring
        .iter()
        .filter_map(|p| mesh.height_at(p.x, p.y, config.feature_probe_height))
        .collect();
    if heights.is_empty() {
        log::debug!("Area feature {} is off the mesh, skipping", area.material);
        return None;
    }
    let z = heights.iter().sum::<f64>() / heights.len() as f64 + config.feature_elevation_offset;

    let mut out = FeatureMesh::new(FeatureKind::Area, &area.material);
    let locator = mesh.locator();
    for p in &ring {
        let tex = locator.map_or(Vector2::new(0.0, 0.0), |l| l.to_local(p.x, p.y));
        out.push(Vector3::new(p.x, p.y, z), tex);
    }
    for tri in tessellate::triangulate(&ring) {
        out.indices.extend(tri.iter().map(|&i| i as u32));
    }
    Some(out)
}

/// Every feature mesh of the buckets overlapping `bounds`.
pub fn overlay<'a>(
    buckets: impl IntoIterator<Item = &'a FeatureBucket>,
    mesh: &GeneratedMesh,
    bounds: &Bounds,
    config: &TerrainConfig,
) -> Vec<FeatureMesh> {
    let mut meshes = Vec::new();
    for bucket in buckets.into_iter().filter(|b| b.intersects(bounds)) {
        for line in &bucket.lines {
            meshes.extend(build_line(line, mesh, bounds, config));
        }
        for area in &bucket.areas {
            meshes.extend(build_area(area, mesh, bounds, config));
        }
        for coastline in &bucket.coastlines {
            meshes.extend(build_coastline(coastline, mesh, bounds, config));
        }
    }
    meshes
}
