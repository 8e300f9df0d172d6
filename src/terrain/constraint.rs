//! Elevation constraints: externally supplied geometry generated terrain must
//! stay below, e.g. airport meshes.
//!
//! The set is shared by every tile builder. Registration and per-vertex
//! queries race freely across loader threads, so both go through one mutex.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use cgmath::{InnerSpace, Vector2, Vector3};

use crate::terrain::layer::Bounds;

pub type ConstraintId = u64;

/// A triangle soup that clips terrain vertices downward.
#[derive(Clone, Debug)]
pub struct ConstraintVolume {
    triangles: Vec<[Vector3<f64>; 3]>,
    bounds: Bounds,
}

impl ConstraintVolume {
    /// `None` for an empty triangle list.
    pub fn new(triangles: Vec<[Vector3<f64>; 3]>) -> Option<Self> {
        let bounds = Bounds::from_points(
            triangles
                .iter()
                .flat_map(|t| t.iter().map(|v| Vector2::new(v.x, v.y))),
        )?;
        Some(Self { triangles, bounds })
    }

    /// An axis-aligned box as twelve triangles.
    pub fn from_box(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        let corner = |i: usize| {
            Vector3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        const FACES: [[usize; 4]; 6] = [
            [0, 1, 3, 2],
            [4, 6, 7, 5],
            [0, 4, 5, 1],
            [2, 3, 7, 6],
            [0, 2, 6, 4],
            [1, 5, 7, 3],
        ];
        let triangles = FACES
            .iter()
            .flat_map(|f| {
                [
                    [corner(f[0]), corner(f[1]), corner(f[2])],
                    [corner(f[0]), corner(f[2]), corner(f[3])],
                ]
            })
            .collect();
        Self {
            triangles,
            bounds: Bounds::new(Vector2::new(min.x, min.y), Vector2::new(max.x, max.y)),
        }
    }

    /// Horizontal footprint.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn triangles(&self) -> &[[Vector3<f64>; 3]] {
        &self.triangles
    }

    /// Parameter along `start..end` of the first hit, if any.
    pub fn intersect_segment(&self, start: Vector3<f64>, end: Vector3<f64>) -> Option<f64> {
        let p = Vector2::new(start.x, start.y);
        let q = Vector2::new(end.x, end.y);
        let segment = Bounds::from_points([p, q])?;
        if !self.bounds.intersects(&segment) {
            return None;
        }
        self.triangles
            .iter()
            .filter_map(|t| segment_triangle(start, end, t))
            .min_by(f64::total_cmp)
    }
}

/// Möller–Trumbore intersection restricted to the segment `start..end`.
/// Returns the segment parameter in `0..=1`.
pub fn segment_triangle(
    start: Vector3<f64>,
    end: Vector3<f64>,
    triangle: &[Vector3<f64>; 3],
) -> Option<f64> {
    const EPSILON: f64 = 1e-12;
    let dir = end - start;
    let e1 = triangle[1] - triangle[0];
    let e2 = triangle[2] - triangle[0];
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv = 1.0 / det;
    let s = start - triangle[0];
    let a = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&a) {
        return None;
    }
    let q = s.cross(e1);
    let b = dir.dot(q) * inv;
    if b < 0.0 || a + b > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (0.0..=1.0).contains(&t).then_some(t)
}

#[derive(Default)]
pub struct ConstraintSet {
    volumes: Mutex<Vec<(ConstraintId, Arc<ConstraintVolume>)>>,
    next_id: AtomicU64,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, volume: Arc<ConstraintVolume>) -> ConstraintId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut volumes) = self.volumes.lock() {
            volumes.push((id, volume));
        }
        id
    }

    pub fn remove(&self, id: ConstraintId) -> Option<Arc<ConstraintVolume>> {
        let mut volumes = self.volumes.lock().ok()?;
        let position = volumes.iter().position(|(v, _)| *v == id)?;
        Some(volumes.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.volumes.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves `vertex` to `gap` below the topmost constraint surface found
    /// within `probe` of it along the vertical. Vertices without a
    /// constraint above or below them come back unchanged.
    pub fn clip(&self, vertex: Vector3<f64>, probe: f64, gap: f64) -> Vector3<f64> {
        let Ok(volumes) = self.volumes.lock() else {
            return vertex;
        };
        if volumes.is_empty() {
            return vertex;
        }
        let up = Vector3::unit_z();
        let start = vertex + up * probe;
        let end = vertex - up * probe;
        let hit = volumes
            .iter()
            .filter_map(|(_, v)| v.intersect_segment(start, end))
            .min_by(f64::total_cmp);
        match hit {
            Some(t) => start + (end - start) * t - up * gap,
            None => vertex,
        }
    }

    /// Whether any registered volume's footprint overlaps `bounds`.
    pub fn intersects(&self, bounds: &Bounds) -> bool {
        self.volumes
            .lock()
            .is_ok_and(|v| v.iter().any(|(_, c)| c.bounds().intersects(bounds)))
    }
}

/// Unit normal of a triangle, `None` when degenerate.
pub fn triangle_normal(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Option<Vector3<f64>> {
    let n = (b - a).cross(c - a);
    let len = n.magnitude();
    (len > 0.0).then(|| n / len)
}
