use crate::{
    foundation::error::SpliceResult,
    geometry::{BoundingBox, Point, Quad, bounding_box, canonical_order, point_in_polygon},
    raster::{Raster, TRANSPARENT},
};

/// The image being spliced into, plus the quadrilateral (in its pixel space) that receives the
/// source.
#[derive(Clone, Debug)]
pub struct Target {
    raster: Raster,
    quad: Quad,
    canonical: bool,
}

impl Target {
    /// Corner points may be given in any order; see [`Target::canonicalize_bounds`].
    pub fn new(raster: Raster, corners: [Point; 4]) -> Self {
        Self {
            raster,
            quad: Quad::new(corners),
            canonical: false,
        }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Reorder the corners into `[top_left, top_right, bottom_left, bottom_right]`.
    ///
    /// Idempotent. On error the quadrilateral is left untouched.
    pub fn canonicalize_bounds(&mut self) -> SpliceResult<()> {
        self.quad = canonical_order(self.quad.points())?;
        self.canonical = true;
        Ok(())
    }

    pub fn bounding_box(&self) -> BoundingBox {
        bounding_box(self.quad.points())
    }

    /// Replace the raster with a copy whose pixels inside the quadrilateral are fully transparent.
    ///
    /// Only the part of the bounding box that overlaps the raster is visited. Pixels are tested at
    /// their centers.
    pub fn punch_transparency(&mut self) {
        let b = self.bounding_box();
        let (w, h) = self.raster.dimensions();
        let x0 = b.min_x.clamp(0, i64::from(w));
        let x1 = b.max_x.saturating_add(1).clamp(0, i64::from(w));
        let y0 = b.min_y.clamp(0, i64::from(h));
        let y1 = b.max_y.saturating_add(1).clamp(0, i64::from(h));

        let mut punched = self.raster.clone();
        let mut cleared = 0u64;
        for y in y0..y1 {
            for x in x0..x1 {
                if point_in_polygon(x as f64 + 0.5, y as f64 + 0.5, &self.quad) {
                    punched.put_pixel(x as u32, y as u32, TRANSPARENT);
                    cleared += 1;
                }
            }
        }
        tracing::debug!(cleared, "punched target transparency");
        self.raster = punched;
    }
}
