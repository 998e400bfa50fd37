//! Container decode/encode at the edge of the pipeline.
//!
//! Stills go through `image`; animations go through `gif` directly so per-frame rectangles,
//! delays, disposal and loop count survive the round trip.

use std::{borrow::Cow, io::Cursor, path::Path};

use anyhow::Context as _;

use crate::{
    foundation::error::{SpliceError, SpliceResult},
    raster::Raster,
    sequence::{AnimatedSequence, Disposal, FrameSequence, InputFrame, LoopMode},
};

/// Output format for a still image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StillFormat {
    Png,
    /// Baseline JPEG at the given quality (1-100). Alpha is flattened first.
    Jpeg { quality: u8 },
}

const DEFAULT_JPEG_QUALITY: u8 = 90;

impl StillFormat {
    /// Pick a format from a file extension (`png`, `jpg`, `jpeg`).
    pub fn from_path(path: &Path) -> SpliceResult<Self> {
        match image::ImageFormat::from_path(path) {
            Ok(image::ImageFormat::Png) => Ok(Self::Png),
            Ok(image::ImageFormat::Jpeg) => Ok(Self::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            }),
            _ => Err(SpliceError::input(format!(
                "unsupported still output '{}' (expected .png, .jpg or .jpeg)",
                path.display()
            ))),
        }
    }

    /// Writable format of already-encoded still bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => Some(Self::Png),
            Ok(image::ImageFormat::Jpeg) => Some(Self::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            }),
            _ => None,
        }
    }

    /// Format for an output path. The extension decides; a path without one takes the format of
    /// the `source` bytes.
    pub fn for_output(path: &Path, source: &[u8]) -> SpliceResult<Self> {
        if path.extension().is_some() {
            return Self::from_path(path);
        }
        Self::sniff(source).ok_or_else(|| {
            SpliceError::input(format!(
                "'{}' has no extension and the source is neither PNG nor JPEG",
                path.display()
            ))
        })
    }
}

/// Return `true` when `bytes` start with a GIF signature.
pub fn is_gif(bytes: &[u8]) -> bool {
    bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")
}

/// Decode any still format `image` understands into straight-alpha RGBA8.
pub fn decode_still(bytes: &[u8]) -> SpliceResult<Raster> {
    let img = image::load_from_memory(bytes)
        .context("decode image from memory")
        .map_err(|e| SpliceError::input(format!("{e:#}")))?;
    let raster = Raster::from(img.to_rgba8());
    if raster.is_empty() {
        return Err(SpliceError::input("decoded image has zero size"));
    }
    Ok(raster)
}

/// Encode a still. JPEG output is flattened over `jpeg_bg` (straight RGBA8).
pub fn encode_still(
    raster: &Raster,
    format: StillFormat,
    jpeg_bg: [u8; 4],
) -> SpliceResult<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        StillFormat::Png => {
            raster
                .as_image()
                .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .map_err(|e| SpliceError::encode(None, format!("png: {e}")))?;
        }
        StillFormat::Jpeg { quality } => {
            let (w, h) = raster.dimensions();
            let mut flat = Raster::filled(w, h, [jpeg_bg[0], jpeg_bg[1], jpeg_bg[2], 255]);
            flat.draw_over_at(raster, 0, 0);
            let rgb = image::DynamicImage::ImageRgba8(flat.into_image()).to_rgb8();
            let enc = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut buf,
                quality.clamp(1, 100),
            );
            rgb.write_with_encoder(enc)
                .map_err(|e| SpliceError::encode(None, format!("jpeg: {e}")))?;
        }
    }
    Ok(buf)
}

/// Decode every frame of a GIF, keeping each frame's own rectangle and timing.
pub fn decode_animation(bytes: &[u8]) -> SpliceResult<AnimatedSequence> {
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = opts
        .read_info(Cursor::new(bytes))
        .map_err(|e| SpliceError::input(format!("gif header: {e}")))?;

    let width = u32::from(decoder.width());
    let height = u32::from(decoder.height());

    let mut frames = Vec::new();
    while let Some(frame) = decoder
        .read_next_frame()
        .map_err(|e| SpliceError::input(format!("gif frame {}: {e}", frames.len())))?
    {
        let raster = Raster::from_rgba(
            u32::from(frame.width),
            u32::from(frame.height),
            frame.buffer.to_vec(),
        )?;
        frames.push(InputFrame {
            raster,
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            delay: frame.delay,
            disposal: disposal_from_gif(frame.dispose),
        });
    }

    let repeat = match decoder.repeat() {
        gif::Repeat::Infinite => LoopMode::Infinite,
        gif::Repeat::Finite(n) => LoopMode::Finite(n),
    };
    tracing::debug!(width, height, frames = frames.len(), "decoded gif");

    Ok(AnimatedSequence {
        width,
        height,
        frames,
        repeat,
    })
}

/// Encode a quantized sequence as a GIF with one global palette.
pub fn encode_animation(seq: &FrameSequence) -> SpliceResult<Vec<u8>> {
    let w = u16::try_from(seq.width)
        .map_err(|_| SpliceError::encode(None, format!("gif width {} exceeds 65535", seq.width)))?;
    let h = u16::try_from(seq.height).map_err(|_| {
        SpliceError::encode(None, format!("gif height {} exceeds 65535", seq.height))
    })?;

    let mut buf = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut buf, w, h, &seq.palette)
            .map_err(|e| SpliceError::encode(None, format!("gif header: {e}")))?;
        enc.set_repeat(match seq.repeat {
            LoopMode::Infinite => gif::Repeat::Infinite,
            LoopMode::Finite(n) => gif::Repeat::Finite(n),
        })
        .map_err(|e| SpliceError::encode(None, format!("gif loop extension: {e}")))?;

        for out in &seq.frames {
            let f = &out.frame;
            if (f.width, f.height) != (seq.width, seq.height) {
                return Err(SpliceError::encode(
                    Some(out.index),
                    format!(
                        "frame is {}x{}, sequence is {}x{}",
                        f.width, f.height, seq.width, seq.height
                    ),
                ));
            }
            let frame = gif::Frame {
                width: w,
                height: h,
                delay: out.delay,
                dispose: disposal_to_gif(out.disposal),
                transparent: Some(seq.transparent_index),
                buffer: Cow::Borrowed(&f.indices),
                ..gif::Frame::default()
            };
            enc.write_frame(&frame)
                .map_err(|e| SpliceError::encode(Some(out.index), e.to_string()))?;
        }
    }
    Ok(buf)
}

fn disposal_from_gif(d: gif::DisposalMethod) -> Disposal {
    match d {
        gif::DisposalMethod::Any => Disposal::Any,
        gif::DisposalMethod::Keep => Disposal::Keep,
        gif::DisposalMethod::Background => Disposal::Background,
        gif::DisposalMethod::Previous => Disposal::Previous,
    }
}

fn disposal_to_gif(d: Disposal) -> gif::DisposalMethod {
    match d {
        Disposal::Any => gif::DisposalMethod::Any,
        Disposal::Keep => gif::DisposalMethod::Keep,
        Disposal::Background => gif::DisposalMethod::Background,
        Disposal::Previous => gif::DisposalMethod::Previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        quantize::{IndexedFrame, TRANSPARENT_INDEX, web_safe_palette},
        sequence::OutputFrame,
    };

    fn indexed(w: u32, h: u32, idx: u8) -> IndexedFrame {
        IndexedFrame {
            width: w,
            height: h,
            indices: vec![idx; (w * h) as usize],
        }
    }

    #[test]
    fn still_png_round_trip_keeps_alpha() {
        let mut r = Raster::filled(3, 2, [10, 20, 30, 255]);
        r.put_pixel(1, 1, [0, 0, 0, 0]);
        let bytes = encode_still(&r, StillFormat::Png, [0, 0, 0, 255]).unwrap();
        assert!(!is_gif(&bytes));
        assert_eq!(decode_still(&bytes).unwrap(), r);
    }

    #[test]
    fn jpeg_output_is_opaque() {
        let r = Raster::new(8, 8);
        let bytes = encode_still(&r, StillFormat::Jpeg { quality: 80 }, [255, 255, 255, 255])
            .unwrap();
        let back = decode_still(&bytes).unwrap();
        assert_eq!(back.dimensions(), (8, 8));
        assert_eq!(back.pixel(4, 4)[3], 255);
        assert!(back.pixel(4, 4)[0] > 240);
    }

    #[test]
    fn garbage_is_an_input_error() {
        assert!(matches!(
            decode_still(b"not an image"),
            Err(SpliceError::Input(_))
        ));
        assert!(matches!(
            decode_animation(b"GIF89a"),
            Err(SpliceError::Input(_))
        ));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            StillFormat::from_path(Path::new("a/out.PNG")).unwrap(),
            StillFormat::Png
        );
        assert!(matches!(
            StillFormat::from_path(Path::new("out.jpeg")).unwrap(),
            StillFormat::Jpeg { .. }
        ));
        assert!(StillFormat::from_path(Path::new("out.bmp")).is_err());
    }

    #[test]
    fn extensionless_output_follows_source_format() {
        let r = Raster::filled(4, 4, [10, 20, 30, 255]);
        let jpeg = encode_still(&r, StillFormat::Jpeg { quality: 70 }, [0; 4]).unwrap();
        let png = encode_still(&r, StillFormat::Png, [0; 4]).unwrap();

        assert!(matches!(
            StillFormat::for_output(Path::new("out/result"), &jpeg).unwrap(),
            StillFormat::Jpeg { .. }
        ));
        assert_eq!(
            StillFormat::for_output(Path::new("result"), &png).unwrap(),
            StillFormat::Png
        );
        // An explicit extension wins over the source.
        assert_eq!(
            StillFormat::for_output(Path::new("result.png"), &jpeg).unwrap(),
            StillFormat::Png
        );
        assert!(StillFormat::for_output(Path::new("result"), b"GIF89a").is_err());
        assert!(StillFormat::for_output(Path::new("result.bmp"), &png).is_err());
    }

    #[test]
    fn gif_round_trip_keeps_timing_and_loop() {
        let seq = FrameSequence {
            width: 4,
            height: 3,
            palette: web_safe_palette(),
            transparent_index: TRANSPARENT_INDEX,
            frames: vec![
                OutputFrame {
                    index: 0,
                    frame: indexed(4, 3, 5),
                    delay: 7,
                    disposal: Disposal::Keep,
                },
                OutputFrame {
                    index: 1,
                    frame: indexed(4, 3, 180),
                    delay: 12,
                    disposal: Disposal::Background,
                },
            ],
            repeat: LoopMode::Finite(2),
        };
        let bytes = encode_animation(&seq).unwrap();
        assert!(is_gif(&bytes));

        let back = decode_animation(&bytes).unwrap();
        assert_eq!((back.width, back.height), (4, 3));
        assert_eq!(back.repeat, LoopMode::Finite(2));
        assert_eq!(back.frames.len(), 2);
        assert_eq!(back.frames[0].delay, 7);
        assert_eq!(back.frames[1].delay, 12);
        assert_eq!(back.frames[0].disposal, Disposal::Keep);
        assert_eq!(back.frames[1].disposal, Disposal::Background);
        // Palette index 5 is (0x00, 0x00, 0xff).
        assert_eq!(back.frames[0].raster.pixel(0, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn mismatched_frame_size_reports_frame_index() {
        let seq = FrameSequence {
            width: 4,
            height: 4,
            palette: web_safe_palette(),
            transparent_index: TRANSPARENT_INDEX,
            frames: vec![OutputFrame {
                index: 9,
                frame: indexed(2, 2, 0),
                delay: 1,
                disposal: Disposal::Keep,
            }],
            repeat: LoopMode::Infinite,
        };
        match encode_animation(&seq) {
            Err(SpliceError::Encode { frame, .. }) => assert_eq!(frame, Some(9)),
            other => panic!("expected encode error, got {other:?}"),
        }
    }
}
