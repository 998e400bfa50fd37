use crate::{
    foundation::{
        error::{SpliceError, SpliceResult},
        math::{premultiply, unpremultiply},
    },
    raster::Raster,
    warp::{Correspondences, WarpEngine, WarpPoint},
};

/// In-process forward-bilinear warp.
///
/// The mapping is defined from source to destination as
/// `D(u, v) = D0 + u·(D1 − D0) + v·(D2 − D0) + u·v·(D0 − D1 − D2 + D3)`
/// over normalized source parameters `(u, v) ∈ [0, 1]²`. Each destination pixel center is pulled
/// back through that map by solving the quadratic in `v`; pixels with no preimage inside the
/// source stay transparent.
#[derive(Clone, Copy, Debug, Default)]
pub struct BilinearWarp;

impl BilinearWarp {
    pub fn new() -> Self {
        Self
    }
}

impl WarpEngine for BilinearWarp {
    fn name(&self) -> &'static str {
        "bilinear"
    }

    #[tracing::instrument(skip(self, raster, pairs), fields(src_w = raster.width(), src_h = raster.height()))]
    fn warp(
        &self,
        raster: &Raster,
        pairs: &Correspondences,
        out_w: u32,
        out_h: u32,
    ) -> SpliceResult<Raster> {
        if raster.is_empty() {
            return Err(SpliceError::external("cannot warp an empty raster"));
        }
        if out_w == 0 || out_h == 0 {
            return Err(SpliceError::external(format!(
                "warp output {out_w}x{out_h} must be non-zero"
            )));
        }

        let dst = ForwardMap::new(pairs.map(|c| c.dst));
        let src = ForwardMap::new(pairs.map(|c| c.src));

        let mut out = Raster::new(out_w, out_h);
        for y in 0..out_h {
            let py = f64::from(y) + 0.5;
            for x in 0..out_w {
                let px = f64::from(x) + 0.5;
                let Some((u, v)) = dst.invert(px, py) else {
                    continue;
                };
                let (sx, sy) = src.eval(u, v);
                out.put_pixel(x, y, sample(raster, sx - 0.5, sy - 0.5));
            }
        }
        Ok(out)
    }
}

/// Bilinear patch over four corners in canonical order (TL, TR, BL, BR).
struct ForwardMap {
    origin: WarpPoint,
    e: WarpPoint,
    f: WarpPoint,
    g: WarpPoint,
}

impl ForwardMap {
    fn new(c: [WarpPoint; 4]) -> Self {
        let [tl, tr, bl, br] = c;
        Self {
            origin: tl,
            e: WarpPoint::new(tr.x - tl.x, tr.y - tl.y),
            f: WarpPoint::new(bl.x - tl.x, bl.y - tl.y),
            g: WarpPoint::new(tl.x - tr.x - bl.x + br.x, tl.y - tr.y - bl.y + br.y),
        }
    }

    fn eval(&self, u: f64, v: f64) -> (f64, f64) {
        (
            self.origin.x + u * self.e.x + v * self.f.x + u * v * self.g.x,
            self.origin.y + u * self.e.y + v * self.f.y + u * v * self.g.y,
        )
    }

    /// Solve `eval(u, v) == (x, y)` for `(u, v)` inside the unit square.
    fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let h = WarpPoint::new(x - self.origin.x, y - self.origin.y);
        let k2 = cross(self.g, self.f);
        let k1 = cross(self.e, self.f) + cross(h, self.g);
        let k0 = cross(h, self.e);

        let candidates: [Option<f64>; 2] = if k2.abs() < 1e-12 {
            if k1.abs() < 1e-12 {
                return None;
            }
            [Some(-k0 / k1), None]
        } else {
            let disc = k1 * k1 - 4.0 * k0 * k2;
            if disc < 0.0 {
                return None;
            }
            let root = disc.sqrt();
            [
                Some((-k1 - root) / (2.0 * k2)),
                Some((-k1 + root) / (2.0 * k2)),
            ]
        };

        candidates.into_iter().flatten().find_map(|v| {
            if !in_unit(v) {
                return None;
            }
            let u = self.solve_u(h, v)?;
            in_unit(u).then_some((u.clamp(0.0, 1.0), v.clamp(0.0, 1.0)))
        })
    }

    fn solve_u(&self, h: WarpPoint, v: f64) -> Option<f64> {
        let den_x = self.e.x + v * self.g.x;
        let den_y = self.e.y + v * self.g.y;
        if den_x.abs() >= den_y.abs() {
            (den_x.abs() > 1e-12).then(|| (h.x - v * self.f.x) / den_x)
        } else {
            Some((h.y - v * self.f.y) / den_y)
        }
    }
}

fn cross(a: WarpPoint, b: WarpPoint) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Closed `[0, 1]` with no slack, so coverage agrees with [`crate::geometry::point_in_polygon`]
/// everywhere except centers lying exactly on an edge.
fn in_unit(t: f64) -> bool {
    (0.0..=1.0).contains(&t)
}

/// Bilinear sample at continuous pixel-index coordinates, interpolated in premultiplied space.
fn sample(raster: &Raster, fx: f64, fy: f64) -> [u8; 4] {
    let (w, h) = raster.dimensions();
    let fx = fx.clamp(0.0, f64::from(w - 1));
    let fy = fy.clamp(0.0, f64::from(h - 1));
    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - f64::from(x0);
    let ty = fy - f64::from(y0);

    let p00 = premultiply(raster.pixel(x0, y0));
    let p10 = premultiply(raster.pixel(x1, y0));
    let p01 = premultiply(raster.pixel(x0, y1));
    let p11 = premultiply(raster.pixel(x1, y1));

    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = f64::from(p00[i]) * (1.0 - tx) + f64::from(p10[i]) * tx;
        let bottom = f64::from(p01[i]) * (1.0 - tx) + f64::from(p11[i]) * tx;
        out[i] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    // Rounding can leave a color channel above alpha; keep the pixel a valid premul value.
    let a = out[3];
    for c in &mut out[..3] {
        *c = (*c).min(a);
    }
    unpremultiply(out)
}
