use image::{Rgba, RgbaImage, imageops::FilterType};

use crate::foundation::{
    error::{SpliceError, SpliceResult},
    math::over_straight,
};

/// Fully transparent black.
pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Owned straight-alpha RGBA8 pixel grid.
///
/// Transforming operations elsewhere in the crate consume or borrow a `Raster` and hand back a
/// new one; a raster is never shared mutably between two owners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    img: RgbaImage,
}

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbaImage::new(width, height),
        }
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            img: RgbaImage::from_pixel(width, height, Rgba(rgba)),
        }
    }

    /// Wrap tightly packed row-major RGBA8 bytes.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> SpliceResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| SpliceError::input("raster size overflow"))?;
        if data.len() != expected {
            return Err(SpliceError::input(format!(
                "raster data length {} does not match {width}x{height}x4",
                data.len()
            )));
        }
        let img = RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| SpliceError::input("raster buffer rejected"))?;
        Ok(Self { img })
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.img.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.img.get_pixel(x, y).0
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        self.img.put_pixel(x, y, Rgba(rgba));
    }

    /// Raw RGBA8 bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.img.as_raw()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.img
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }

    /// Copy `src` onto `self` at `(dx, dy)`, replacing destination pixels (alpha included).
    pub fn draw_src_at(&mut self, src: &Raster, dx: i64, dy: i64) {
        self.blit(src, dx, dy, |_, s| s);
    }

    /// Alpha-composite `src` over `self` at `(dx, dy)`.
    ///
    /// Offsets may be negative; whatever falls outside `self` is clipped.
    pub fn draw_over_at(&mut self, src: &Raster, dx: i64, dy: i64) {
        self.blit(src, dx, dy, over_straight);
    }

    fn blit(&mut self, src: &Raster, dx: i64, dy: i64, op: impl Fn([u8; 4], [u8; 4]) -> [u8; 4]) {
        let Some(span) = ClipSpan::new(self.dimensions(), src.dimensions(), dx, dy) else {
            return;
        };
        for sy in span.src_y0..span.src_y1 {
            let ty = (sy as i64 + dy) as u32;
            for sx in span.src_x0..span.src_x1 {
                let tx = (sx as i64 + dx) as u32;
                let s = src.img.get_pixel(sx, sy).0;
                let d = self.img.get_pixel_mut(tx, ty);
                d.0 = op(d.0, s);
            }
        }
    }
}

impl From<RgbaImage> for Raster {
    fn from(img: RgbaImage) -> Self {
        Self { img }
    }
}

/// Source-space rectangle of `src` that lands inside the destination.
struct ClipSpan {
    src_x0: u32,
    src_x1: u32,
    src_y0: u32,
    src_y1: u32,
}

impl ClipSpan {
    fn new(dst: (u32, u32), src: (u32, u32), dx: i64, dy: i64) -> Option<Self> {
        let clip = |dst_len: u32, src_len: u32, d: i64| -> Option<(u32, u32)> {
            let lo = (-d).clamp(0, i64::from(src_len));
            let hi = (i64::from(dst_len) - d).clamp(0, i64::from(src_len));
            (lo < hi).then_some((lo as u32, hi as u32))
        };
        let (src_x0, src_x1) = clip(dst.0, src.0, dx)?;
        let (src_y0, src_y1) = clip(dst.1, src.1, dy)?;
        Some(Self {
            src_x0,
            src_x1,
            src_y0,
            src_y1,
        })
    }
}

/// High-quality resample to exactly `width x height`. Aspect ratio is not preserved.
#[tracing::instrument(skip(raster), fields(from_w = raster.width(), from_h = raster.height()))]
pub fn resample(raster: &Raster, width: u32, height: u32) -> SpliceResult<Raster> {
    if width == 0 || height == 0 {
        return Err(SpliceError::external(format!(
            "resample target {width}x{height} must be non-zero"
        )));
    }
    if raster.is_empty() {
        return Err(SpliceError::external("cannot resample an empty raster"));
    }
    if raster.dimensions() == (width, height) {
        return Ok(raster.clone());
    }
    let out = image::imageops::resize(raster.as_image(), width, height, FilterType::Lanczos3);
    Ok(Raster::from(out))
}
