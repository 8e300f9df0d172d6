//! Polygon triangulation for area features.

use cgmath::Vector2;

/// Twice the signed area; positive for counter-clockwise rings.
pub fn signed_area(ring: &[Vector2<f64>]) -> f64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum()
}

fn cross(o: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn inside_triangle(p: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>) -> bool {
    cross(a, b, p) > 0.0 && cross(b, c, p) > 0.0 && cross(c, a, p) > 0.0
}

/// Ear-clipping triangulation of a closed ring (first vertex not repeated).
///
/// Returns triangles indexing into `ring`, wound counter-clockwise for simple
/// rings of either orientation, concave ones included. When no ear exists,
/// as happens for self-intersecting rings, the current vertex is clipped
/// anyway, so the result always has `len - 2` triangles.
pub fn triangulate(ring: &[Vector2<f64>]) -> Vec<[usize; 3]> {
    let n = ring.len();
    if n < 3 {
        return Vec::new();
    }
    let mut remaining: Vec<usize> = if signed_area(ring) >= 0.0 {
        (0..n).collect()
    } else {
        (0..n).rev().collect()
    };
    let mut triangles = Vec::with_capacity(n - 2);
    let mut i = 0;
    let mut stalled = 0;
    while remaining.len() > 3 {
        let m = remaining.len();
        let (prev, cur, next) = (
            remaining[(i + m - 1) % m],
            remaining[i % m],
            remaining[(i + 1) % m],
        );
        let (a, b, c) = (ring[prev], ring[cur], ring[next]);
        let ear = cross(a, b, c) > 0.0
            && remaining
                .iter()
                .filter(|&&k| k != prev && k != cur && k != next)
                .all(|&k| !inside_triangle(ring[k], a, b, c));
        if ear || stalled >= m {
            triangles.push([prev, cur, next]);
            remaining.remove(i % m);
            stalled = 0;
            i %= remaining.len();
        } else {
            i = (i + 1) % m;
            stalled += 1;
        }
    }
    triangles.push([remaining[0], remaining[1], remaining[2]]);
    triangles
}
