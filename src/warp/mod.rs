//! Perspective-warp capability.
//!
//! A warp takes four `(source corner, destination corner)` pairs and produces a raster of a
//! caller-chosen size in which pixels outside the mapped region are fully transparent. The engine
//! is acquired once per job through [`WarpEngineHandle`] and shared read-only by all workers.

use std::time::Duration;

use crate::{
    foundation::error::SpliceResult,
    geometry::{BoundingBox, Quad},
    raster::Raster,
};

/// In-process forward-bilinear engine.
pub mod bilinear;
/// ImageMagick-backed engine (`-distort BilinearForward`).
pub mod magick;

pub use bilinear::BilinearWarp;
pub use magick::{MagickOpts, MagickWarp};

/// Floating-point coordinate used by correspondences.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WarpPoint {
    pub x: f64,
    pub y: f64,
}

impl WarpPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One control-point pair: where `src` in the input raster lands in the output raster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    pub src: WarpPoint,
    pub dst: WarpPoint,
}

/// Four pairs in canonical corner order (top-left, top-right, bottom-left, bottom-right).
pub type Correspondences = [Correspondence; 4];

/// Map the corners of a `src_w x src_h` raster onto `quad`, expressed relative to the origin of
/// `bbox` so that the warped output covers exactly the bounding box.
pub fn corner_correspondences(
    src_w: u32,
    src_h: u32,
    quad: &Quad,
    bbox: &BoundingBox,
) -> Correspondences {
    let (w, h) = (f64::from(src_w), f64::from(src_h));
    let src = [
        WarpPoint::new(0.0, 0.0),
        WarpPoint::new(w, 0.0),
        WarpPoint::new(0.0, h),
        WarpPoint::new(w, h),
    ];
    let mut out = [Correspondence {
        src: WarpPoint::new(0.0, 0.0),
        dst: WarpPoint::new(0.0, 0.0),
    }; 4];
    for (i, c) in out.iter_mut().enumerate() {
        let p = quad.points()[i];
        *c = Correspondence {
            src: src[i],
            dst: WarpPoint::new((p.x - bbox.min_x) as f64, (p.y - bbox.min_y) as f64),
        };
    }
    out
}

/// Contract shared by every warp backend.
///
/// Implementations must return a raster of exactly `out_w x out_h`, transparent wherever the
/// mapping does not reach, and must be callable concurrently from worker threads.
pub trait WarpEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn warp(
        &self,
        raster: &Raster,
        pairs: &Correspondences,
        out_w: u32,
        out_h: u32,
    ) -> SpliceResult<Raster>;
}

/// Which backend a job should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarpEngineKind {
    #[default]
    Bilinear,
    Magick,
}

/// Scoped ownership of a warp engine for the duration of one job.
///
/// Acquisition validates the backend up front (for ImageMagick: that the tool runs); release
/// happens when the handle drops, whether the job succeeded or not.
pub struct WarpEngineHandle {
    engine: Box<dyn WarpEngine>,
}

impl WarpEngineHandle {
    pub fn acquire(kind: WarpEngineKind, timeout: Option<Duration>) -> SpliceResult<Self> {
        let engine: Box<dyn WarpEngine> = match kind {
            WarpEngineKind::Bilinear => Box::new(BilinearWarp::new()),
            WarpEngineKind::Magick => {
                let mut opts = MagickOpts::default();
                if let Some(t) = timeout {
                    opts.timeout = t;
                }
                Box::new(MagickWarp::locate(opts)?)
            }
        };
        Ok(Self::from_engine(engine))
    }

    /// Wrap a caller-provided engine.
    pub fn from_engine(engine: Box<dyn WarpEngine>) -> Self {
        tracing::debug!(engine = engine.name(), "acquired warp engine");
        Self { engine }
    }

    pub fn engine(&self) -> &dyn WarpEngine {
        self.engine.as_ref()
    }
}

impl Drop for WarpEngineHandle {
    fn drop(&mut self) {
        tracing::debug!(engine = self.engine.name(), "released warp engine");
    }
}

impl std::fmt::Debug for WarpEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarpEngineHandle")
            .field("engine", &self.engine.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, bounding_box};

    #[test]
    fn correspondences_are_relative_to_bbox_origin() {
        let quad = Quad::new([
            Point::new(10, 20),
            Point::new(50, 25),
            Point::new(12, 60),
            Point::new(48, 70),
        ]);
        let b = bounding_box(quad.points());
        let pairs = corner_correspondences(38, 50, &quad, &b);
        assert_eq!(pairs[0].src, WarpPoint::new(0.0, 0.0));
        assert_eq!(pairs[3].src, WarpPoint::new(38.0, 50.0));
        assert_eq!(pairs[0].dst, WarpPoint::new(0.0, 0.0));
        assert_eq!(pairs[1].dst, WarpPoint::new(40.0, 5.0));
        assert_eq!(pairs[3].dst, WarpPoint::new(38.0, 50.0));
    }

    #[test]
    fn bilinear_handle_acquires_without_external_tools() {
        let handle = WarpEngineHandle::acquire(WarpEngineKind::Bilinear, None).unwrap();
        assert_eq!(handle.engine().name(), "bilinear");
    }
}
