//! Tile input layers: elevation grids, landclass images and the locator that
//! places both in the world.

use std::path::Path;

use anyhow::{Context as _, bail};
use cgmath::{Vector2, Vector3};

/// Axis-aligned rectangle in the world's horizontal (x, y) plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vector2<f64>,
    pub max: Vector2<f64>,
}

impl Bounds {
    pub fn new(min: Vector2<f64>, max: Vector2<f64>) -> Self {
        Self { min, max }
    }

    /// Smallest rectangle containing every point; `None` when empty.
    pub fn from_points(points: impl IntoIterator<Item = Vector2<f64>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |mut b, p| {
            b.min.x = b.min.x.min(p.x);
            b.min.y = b.min.y.min(p.y);
            b.max.x = b.max.x.max(p.x);
            b.max.y = b.max.y.max(p.y);
            b
        }))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn contains(&self, p: Vector2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Closed-interval overlap; touching rectangles intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

/// Maps normalized tile coordinates to world space.
///
/// `u` runs west to east and `v` south to north, both over `0..=1`. Heights
/// pass through unchanged, so world z is the sampled elevation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Locator {
    origin: Vector2<f64>,
    extent: Vector2<f64>,
}

impl Locator {
    pub fn new(origin: Vector2<f64>, extent: Vector2<f64>) -> Self {
        Self { origin, extent }
    }

    pub fn origin(&self) -> Vector2<f64> {
        self.origin
    }

    pub fn extent(&self) -> Vector2<f64> {
        self.extent
    }

    pub fn to_world(&self, u: f64, v: f64, height: f64) -> Vector3<f64> {
        Vector3::new(
            self.origin.x + u * self.extent.x,
            self.origin.y + v * self.extent.y,
            height,
        )
    }

    /// Normalized `(u, v)` of a world position.
    pub fn to_local(&self, x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(
            (x - self.origin.x) / self.extent.x,
            (y - self.origin.y) / self.extent.y,
        )
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.origin, self.origin + self.extent)
    }

    pub fn center(&self, height: f64) -> Vector3<f64> {
        self.to_world(0.5, 0.5, height)
    }
}

/// A `columns × rows` grid of heights, row 0 at the southern edge.
///
/// NaN heights mark samples without data; vertices built from them are
/// dropped from the mesh.
#[derive(Clone, Debug)]
pub struct ElevationLayer {
    columns: usize,
    rows: usize,
    heights: Vec<f32>,
    locator: Locator,
}

impl ElevationLayer {
    pub fn new(
        columns: usize,
        rows: usize,
        heights: Vec<f32>,
        locator: Locator,
    ) -> anyhow::Result<Self> {
        if columns < 2 || rows < 2 {
            bail!("elevation layer needs at least 2x2 samples, got {columns}x{rows}");
        }
        if heights.len() != columns * rows {
            bail!(
                "elevation layer {columns}x{rows} expects {} heights, got {}",
                columns * rows,
                heights.len()
            );
        }
        Ok(Self {
            columns,
            rows,
            heights,
            locator,
        })
    }

    pub fn flat(columns: usize, rows: usize, height: f32, locator: Locator) -> anyhow::Result<Self> {
        Self::new(columns, rows, vec![height; columns * rows], locator)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn set_height(&mut self, column: usize, row: usize, height: f32) {
        if column < self.columns && row < self.rows {
            self.heights[row * self.columns + column] = height;
        }
    }

    /// Stored height at a grid position, `None` when out of range or
    /// without data.
    pub fn height(&self, column: usize, row: usize) -> Option<f64> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        let h = self.heights[row * self.columns + column];
        (!h.is_nan()).then_some(h as f64)
    }

    /// Bilinearly interpolated height at normalized `(u, v)`.
    ///
    /// Corners with zero weight are not read, so sampling exactly on a grid
    /// line next to a missing sample still succeeds.
    pub fn sample(&self, u: f64, v: f64) -> Option<f64> {
        let (c0, c1, s) = Self::span(u, self.columns);
        let (r0, r1, t) = Self::span(v, self.rows);
        let corner = |c, r, w: f64| -> Option<f64> {
            if w == 0.0 {
                Some(0.0)
            } else {
                self.height(c, r).map(|h| h * w)
            }
        };
        Some(
            corner(c0, r0, (1.0 - s) * (1.0 - t))?
                + corner(c1, r0, s * (1.0 - t))?
                + corner(c0, r1, (1.0 - s) * t)?
                + corner(c1, r1, s * t)?,
        )
    }

    fn span(coord: f64, count: usize) -> (usize, usize, f64) {
        let f = coord.clamp(0.0, 1.0) * (count - 1) as f64;
        let i0 = (f.floor() as usize).min(count - 1);
        let i1 = (i0 + 1).min(count - 1);
        (i0, i1, f - i0 as f64)
    }
}

/// Landclass codes per texel, decoded from the red channel of an image.
#[derive(Clone, Debug)]
pub struct LandclassLayer {
    image: image::RgbaImage,
}

impl LandclassLayer {
    pub fn new(image: image::RgbaImage) -> Self {
        Self { image }
    }

    /// A `width × height` layer from row-major codes, row 0 at the southern
    /// edge.
    pub fn from_codes(width: u32, height: u32, codes: &[u8]) -> anyhow::Result<Self> {
        if codes.len() != (width * height) as usize {
            bail!(
                "landclass layer {width}x{height} expects {} codes, got {}",
                width * height,
                codes.len()
            );
        }
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            let row = height - 1 - y;
            image::Rgba([codes[(row * width + x) as usize], 0, 0, 255])
        });
        Ok(Self { image })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("loading landclass image {}", path.display()))?
            .to_rgba8();
        Ok(Self { image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Nearest-texel landclass at normalized `(u, v)`.
    pub fn landclass(&self, u: f64, v: f64) -> u8 {
        let (w, h) = self.image.dimensions();
        let x = ((u.clamp(0.0, 1.0) * w as f64) as u32).min(w - 1);
        let y = (((1.0 - v.clamp(0.0, 1.0)) * h as f64) as u32).min(h - 1);
        self.image.get_pixel(x, y).0[0]
    }
}
