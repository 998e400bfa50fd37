//! Integer corner geometry: bounding boxes, canonical corner order and containment.
//!
//! Coordinates follow raster convention: `x` grows rightward, `y` grows downward, origin at the
//! top-left.

use crate::foundation::error::{SpliceError, SpliceResult};

/// Integer raster coordinate.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<[i64; 2]> for Point {
    fn from([x, y]: [i64; 2]) -> Self {
        Self { x, y }
    }
}

/// Four corner points.
///
/// Once canonicalized the slots are `[top_left, top_right, bottom_left, bottom_right]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    pub const TOP_LEFT: usize = 0;
    pub const TOP_RIGHT: usize = 1;
    pub const BOTTOM_LEFT: usize = 2;
    pub const BOTTOM_RIGHT: usize = 3;

    pub fn new(points: [Point; 4]) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn top_left(&self) -> Point {
        self.0[Self::TOP_LEFT]
    }

    pub fn top_right(&self) -> Point {
        self.0[Self::TOP_RIGHT]
    }

    pub fn bottom_left(&self) -> Point {
        self.0[Self::BOTTOM_LEFT]
    }

    pub fn bottom_right(&self) -> Point {
        self.0[Self::BOTTOM_RIGHT]
    }

    /// Arithmetic mean of the four corners, accumulated in floating point.
    pub fn centroid(&self) -> (f64, f64) {
        let (sx, sy) = self
            .0
            .iter()
            .fold((0.0f64, 0.0f64), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        (sx / 4.0, sy / 4.0)
    }
}

impl From<[[i64; 2]; 4]> for Quad {
    fn from(raw: [[i64; 2]; 4]) -> Self {
        Self(raw.map(Point::from))
    }
}

/// Axis-aligned bounds of a point set, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl BoundingBox {
    /// `max_x - min_x`; the size the source raster is stretched to before warping.
    pub fn width(&self) -> u64 {
        self.max_x.abs_diff(self.min_x)
    }

    pub fn height(&self) -> u64 {
        self.max_y.abs_diff(self.min_y)
    }

    /// Both extents as `u32`, failing when the box collapses or cannot be rasterized.
    pub fn raster_size(&self) -> SpliceResult<(u32, u32)> {
        let (w, h) = (self.width(), self.height());
        if w == 0 || h == 0 {
            return Err(SpliceError::geometry(format!(
                "quadrilateral bounding box has zero area ({w}x{h})"
            )));
        }
        let w = u32::try_from(w)
            .map_err(|_| SpliceError::geometry(format!("bounding box width {w} is too large")))?;
        let h = u32::try_from(h)
            .map_err(|_| SpliceError::geometry(format!("bounding box height {h} is too large")))?;
        Ok((w, h))
    }

    /// Return `true` when `(x, y)` lies inside the box (edges included).
    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }
}

/// Single linear scan over the four corners.
pub fn bounding_box(points: &[Point; 4]) -> BoundingBox {
    let first = points[0];
    points.iter().skip(1).fold(
        BoundingBox {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        },
        |b, p| BoundingBox {
            min_x: b.min_x.min(p.x),
            max_x: b.max_x.max(p.x),
            min_y: b.min_y.min(p.y),
            max_y: b.max_y.max(p.y),
        },
    )
}

/// Assign each corner to a quadrant around the centroid.
///
/// Smaller `y` is top. Points on the centroid line count as left/top. Fails when two corners land
/// in the same quadrant, since one slot would otherwise be silently overwritten.
pub fn canonical_order(points: &[Point; 4]) -> SpliceResult<Quad> {
    let (x_avg, y_avg) = Quad(*points).centroid();

    let mut slots: [Option<Point>; 4] = [None; 4];
    for &p in points {
        let right = p.x as f64 > x_avg;
        let bottom = p.y as f64 > y_avg;
        let slot = match (bottom, right) {
            (false, false) => Quad::TOP_LEFT,
            (false, true) => Quad::TOP_RIGHT,
            (true, false) => Quad::BOTTOM_LEFT,
            (true, true) => Quad::BOTTOM_RIGHT,
        };
        if let Some(existing) = slots[slot] {
            return Err(SpliceError::geometry(format!(
                "corners ({}, {}) and ({}, {}) fall in the same quadrant around centroid ({x_avg}, {y_avg})",
                existing.x, existing.y, p.x, p.y
            )));
        }
        slots[slot] = Some(p);
    }

    // Four points into four distinct slots leaves none empty.
    let mut out = [Point::default(); 4];
    for (dst, slot) in out.iter_mut().zip(slots) {
        *dst = slot.ok_or_else(|| SpliceError::geometry("quadrant left unassigned"))?;
    }
    Ok(Quad(out))
}

/// Even-odd ray cast toward `+x` against the edges `0→1, 1→3, 3→2, 2→0` of a canonical quad.
///
/// Uses the half-open `(y1 > y) != (y2 > y)` test so a ray through a vertex or along a horizontal
/// edge is counted once.
pub fn point_in_polygon(x: f64, y: f64, quad: &Quad) -> bool {
    const EDGES: [(usize, usize); 4] = [
        (Quad::TOP_LEFT, Quad::TOP_RIGHT),
        (Quad::TOP_RIGHT, Quad::BOTTOM_RIGHT),
        (Quad::BOTTOM_RIGHT, Quad::BOTTOM_LEFT),
        (Quad::BOTTOM_LEFT, Quad::TOP_LEFT),
    ];

    let mut inside = false;
    for (a, b) in EDGES {
        let (x1, y1) = (quad.0[a].x as f64, quad.0[a].y as f64);
        let (x2, y2) = (quad.0[b].x as f64, quad.0[b].y as f64);
        if (y1 > y) != (y2 > y) {
            let x_cross = x1 + (y - y1) * (x2 - x1) / (y2 - y1);
            if x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
