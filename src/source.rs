use crate::{
    foundation::error::SpliceResult,
    geometry::{BoundingBox, Quad},
    raster::{Raster, resample},
    warp::{WarpEngine, corner_correspondences},
};

/// The rectangular image being spliced in. Built fresh per frame and consumed by compositing.
#[derive(Clone, Debug)]
pub struct Source {
    raster: Raster,
}

impl Source {
    pub fn new(raster: Raster) -> Self {
        Self { raster }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn into_raster(self) -> Raster {
        self.raster
    }

    /// Stretch to exactly `width x height`, replacing the owned raster.
    pub fn resize_to(&mut self, width: u32, height: u32) -> SpliceResult<()> {
        self.raster = resample(&self.raster, width, height)?;
        Ok(())
    }

    /// Warp the (already resized) raster onto `quad`.
    ///
    /// The result covers `bbox` exactly: pixel `(0, 0)` corresponds to `(bbox.min_x, bbox.min_y)`
    /// in target space, and everything outside the quadrilateral is transparent.
    pub fn warp_to_quadrilateral(
        &mut self,
        quad: &Quad,
        bbox: &BoundingBox,
        engine: &dyn WarpEngine,
    ) -> SpliceResult<()> {
        let (out_w, out_h) = bbox.raster_size()?;
        let (w, h) = self.raster.dimensions();
        let pairs = corner_correspondences(w, h, quad, bbox);
        self.raster = engine.warp(&self.raster, &pairs, out_w, out_h)?;
        Ok(())
    }
}
