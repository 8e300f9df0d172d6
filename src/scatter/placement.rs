//! Point placement on a single triangle.

use cgmath::{InnerSpace, Vector2, Vector3};
use rand::Rng;

/// A surface triangle with its texture coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub vertices: [Vector3<f64>; 3],
    pub tex_coords: [Vector2<f64>; 3],
}

impl Triangle {
    pub fn new(vertices: [Vector3<f64>; 3], tex_coords: [Vector2<f64>; 3]) -> Self {
        Self {
            vertices,
            tex_coords,
        }
    }

    pub fn area(&self) -> f64 {
        let [a, b, c] = self.vertices;
        (b - a).cross(c - a).magnitude() * 0.5
    }

    /// Cosine of the angle between the face normal and the vertical.
    pub fn slope_cos(&self) -> f64 {
        let [a, b, c] = self.vertices;
        let n = (b - a).cross(c - a);
        let len = n.magnitude();
        if len > 0.0 { (n.z / len).abs() } else { 0.0 }
    }

    pub fn centroid(&self) -> Vector3<f64> {
        let [a, b, c] = self.vertices;
        (a + b + c) / 3.0
    }

    pub fn tex_centroid(&self) -> Vector2<f64> {
        let [a, b, c] = self.tex_coords;
        (a + b + c) / 3.0
    }

    /// Point at barycentric `(a, b)` relative to the first vertex.
    pub fn point(&self, a: f64, b: f64) -> Vector3<f64> {
        let [v0, v1, v2] = self.vertices;
        v0 + (v1 - v0) * a + (v2 - v0) * b
    }

    pub fn tex(&self, a: f64, b: f64) -> Vector2<f64> {
        let [t0, t1, t2] = self.tex_coords;
        t0 + (t1 - t0) * a + (t2 - t0) * b
    }

    /// Distance from `p` to the nearest of the three edges.
    pub fn edge_distance(&self, p: Vector3<f64>) -> f64 {
        let [a, b, c] = self.vertices;
        [(a, b), (b, c), (c, a)]
            .into_iter()
            .map(|(s, e)| segment_distance(p, s, e))
            .fold(f64::INFINITY, f64::min)
    }
}

fn segment_distance(p: Vector3<f64>, start: Vector3<f64>, end: Vector3<f64>) -> f64 {
    let d = end - start;
    let len2 = d.magnitude2();
    let t = if len2 > 0.0 {
        ((p - start).dot(d) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p - (start + d * t)).magnitude()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub position: Vector3<f64>,
    pub tex: Vector2<f64>,
}

/// Uniform barycentric coordinates inside the triangle.
pub fn barycentric(rng: &mut impl Rng) -> (f64, f64) {
    let a: f64 = rng.random();
    let b: f64 = rng.random();
    if a + b > 1.0 { (1.0 - a, 1.0 - b) } else { (a, b) }
}

/// Area-proportional placement: one candidate per `coverage` of area, with the
/// fractional remainder decided by a random offset. The expected count is
/// `area / coverage`.
pub fn scatter_points(triangle: &Triangle, coverage: f64, rng: &mut impl Rng) -> Vec<Candidate> {
    if !(coverage > 0.0) {
        return Vec::new();
    }
    let mut unit = triangle.area() + rng.random::<f64>() * coverage;
    let mut points = Vec::new();
    while unit > coverage {
        let (a, b) = barycentric(rng);
        points.push(Candidate {
            position: triangle.point(a, b),
            tex: triangle.tex(a, b),
        });
        unit -= coverage;
    }
    points
}

/// Density scale for a slope: nothing below `zero_cos`, everything above
/// `max_cos`, linear in between.
pub fn slope_factor(cos: f64, zero_cos: f64, max_cos: f64) -> f64 {
    if cos < zero_cos {
        0.0
    } else if cos >= max_cos || max_cos <= zero_cos {
        1.0
    } else {
        (cos - zero_cos) / (max_cos - zero_cos)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskChannel {
    /// Building and object heading.
    Red = 0,
    /// Tree presence.
    Green = 1,
    /// Building and object presence.
    Blue = 2,
}

/// Normalized channel value of the mask texel under `tex`, wrapping.
pub fn mask_value(mask: &image::RgbaImage, tex: Vector2<f64>, channel: MaskChannel) -> f64 {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return 1.0;
    }
    let wrap = |t: f64| t - t.floor();
    let x = ((wrap(tex.x) * w as f64) as u32).min(w - 1);
    let y = (((1.0 - wrap(tex.y)) * h as f64) as u32).min(h - 1);
    mask.get_pixel(x, y).0[channel as usize] as f64 / 255.0
}

/// An accepted placement's extent for spacing checks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    pub center: Vector3<f64>,
    pub radius: f64,
}

impl Footprint {
    pub fn overlaps(&self, other: &Footprint) -> bool {
        (self.center - other.center).magnitude() < self.radius + other.radius
    }
}
