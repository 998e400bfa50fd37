#![forbid(unsafe_code)]

//! Composite a rectangular image, or every frame of an animated GIF, onto an arbitrary convex
//! quadrilateral of a target image.
//!
//! The still path is [`splice_still`]; the animated path is [`SequenceProcessor`]. Both take a
//! [`WarpEngine`], normally acquired through [`WarpEngineHandle`].

pub mod codec;
pub mod compositor;
pub mod config;
pub mod foundation;
pub mod geometry;
pub mod quantize;
pub mod raster;
pub mod sequence;
pub mod source;
pub mod target;
pub mod warp;

pub use codec::{
    StillFormat, decode_animation, decode_still, encode_animation, encode_still, is_gif,
};
pub use compositor::{composite, splice_still};
pub use config::JobConfig;
pub use foundation::error::{SpliceError, SpliceResult};
pub use geometry::{BoundingBox, Point, Quad, bounding_box, canonical_order, point_in_polygon};
pub use quantize::{IndexedFrame, TRANSPARENT_INDEX, quantize_web_safe, web_safe_palette};
pub use raster::{Raster, resample};
pub use sequence::{
    AnimatedSequence, Disposal, FailurePolicy, FrameFailure, FrameSequence, InputFrame, LoopMode,
    OutputFrame, RgbaFrames, SequenceOptions, SequenceProcessor, SequenceReport, SequenceStats,
    SpliceThreading,
};
pub use source::Source;
pub use target::Target;
pub use warp::{
    BilinearWarp, Correspondence, Correspondences, MagickOpts, MagickWarp, WarpEngine,
    WarpEngineHandle, WarpEngineKind, WarpPoint, corner_correspondences,
};
