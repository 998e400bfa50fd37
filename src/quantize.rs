//! Fixed-palette quantization with Floyd-Steinberg error diffusion.

use crate::raster::Raster;

/// Number of opaque entries in the web-safe cube (6 levels per channel).
pub const WEB_SAFE_LEN: usize = 216;
/// Palette index reserved for fully transparent pixels.
pub const TRANSPARENT_INDEX: u8 = WEB_SAFE_LEN as u8;
/// Pixels with alpha below this map to [`TRANSPARENT_INDEX`].
pub const ALPHA_THRESHOLD: u8 = 128;

const LEVEL_STEP: i32 = 0x33;

/// The 216-color web-safe cube followed by one transparent entry, as flat `RGB` triples.
pub fn web_safe_palette() -> Vec<u8> {
    let mut out = Vec::with_capacity((WEB_SAFE_LEN + 1) * 3);
    for r in 0..6u8 {
        for g in 0..6u8 {
            for b in 0..6u8 {
                out.extend_from_slice(&[r * 0x33, g * 0x33, b * 0x33]);
            }
        }
    }
    out.extend_from_slice(&[0, 0, 0]);
    out
}

/// Palette indices for one frame, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedFrame {
    pub width: u32,
    pub height: u32,
    pub indices: Vec<u8>,
}

impl IndexedFrame {
    pub fn index(&self, x: u32, y: u32) -> u8 {
        self.indices[(y as usize) * (self.width as usize) + (x as usize)]
    }
}

/// Map `raster` onto [`web_safe_palette`], diffusing RGB error 7/16, 3/16, 5/16, 1/16.
///
/// Transparent pixels take [`TRANSPARENT_INDEX`] and neither receive nor spread error.
pub fn quantize_web_safe(raster: &Raster) -> IndexedFrame {
    let (w, h) = raster.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let mut indices = vec![TRANSPARENT_INDEX; wu * hu];

    // Error rows carry one pixel of padding on each side.
    let mut cur = vec![[0i32; 3]; wu + 2];
    let mut next = vec![[0i32; 3]; wu + 2];

    for y in 0..hu {
        for x in 0..wu {
            let px = raster.pixel(x as u32, y as u32);
            if px[3] < ALPHA_THRESHOLD {
                continue;
            }

            let err = cur[x + 1];
            let mut level = [0i32; 3];
            let mut diff = [0i32; 3];
            for c in 0..3 {
                let want = (i32::from(px[c]) + err[c] / 16).clamp(0, 255);
                level[c] = (want + LEVEL_STEP / 2) / LEVEL_STEP;
                diff[c] = want - level[c] * LEVEL_STEP;
            }
            indices[y * wu + x] = (level[0] * 36 + level[1] * 6 + level[2]) as u8;

            for c in 0..3 {
                cur[x + 2][c] += diff[c] * 7;
                next[x][c] += diff[c] * 3;
                next[x + 1][c] += diff[c] * 5;
                next[x + 2][c] += diff[c];
            }
        }
        std::mem::swap(&mut cur, &mut next);
        next.iter_mut().for_each(|e| *e = [0; 3]);
    }

    IndexedFrame {
        width: w,
        height: h,
        indices,
    }
}

/// Expand an indexed frame back to RGBA using [`web_safe_palette`].
pub fn expand_web_safe(frame: &IndexedFrame) -> Raster {
    let palette = web_safe_palette();
    let mut out = Raster::new(frame.width, frame.height);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let i = frame.index(x, y);
            if i == TRANSPARENT_INDEX {
                continue;
            }
            let p = &palette[usize::from(i) * 3..usize::from(i) * 3 + 3];
            out.put_pixel(x, y, [p[0], p[1], p[2], 255]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_has_cube_plus_transparent_slot() {
        let p = web_safe_palette();
        assert_eq!(p.len(), 217 * 3);
        assert_eq!(&p[0..3], &[0, 0, 0]);
        assert_eq!(&p[215 * 3..216 * 3], &[255, 255, 255]);
    }

    #[test]
    fn exact_palette_colors_map_without_error() {
        let r = Raster::filled(5, 5, [0x33, 0x99, 0xff, 255]);
        let q = quantize_web_safe(&r);
        let expected = (36 + 3 * 6 + 5) as u8;
        assert!(q.indices.iter().all(|&i| i == expected));
        assert_eq!(expand_web_safe(&q), r);
    }

    #[test]
    fn transparent_pixels_use_reserved_index() {
        let mut r = Raster::filled(3, 1, [255, 0, 0, 255]);
        r.put_pixel(1, 0, [255, 255, 255, 10]);
        let q = quantize_web_safe(&r);
        assert_eq!(q.index(1, 0), TRANSPARENT_INDEX);
        assert_ne!(q.index(0, 0), TRANSPARENT_INDEX);
    }

    #[test]
    fn dithering_preserves_average_intensity() {
        // 0x19 sits halfway between the 0x00 and 0x33 levels.
        let r = Raster::filled(16, 16, [0x19, 0x19, 0x19, 255]);
        let q = quantize_web_safe(&r);
        let rgba = expand_web_safe(&q);
        let sum: u32 = (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .map(|(x, y)| u32::from(rgba.pixel(x, y)[0]))
            .sum();
        let mean = sum as f64 / 256.0;
        assert!((mean - 25.0).abs() < 4.0, "mean {mean}");
        let distinct: std::collections::BTreeSet<u8> = q.indices.iter().copied().collect();
        assert!(distinct.len() >= 2);
    }
}
