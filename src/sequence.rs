//! Apply one splice to every frame of an animated sequence.
//!
//! Frames are accumulated in order ("paint over the previous frame"), then each full-size
//! snapshot is composited onto the shared target and quantized on a bounded worker pool. Results
//! land in a slot vector indexed by input position, so output order never depends on completion
//! order.

use rayon::prelude::*;

use crate::{
    compositor::composite,
    foundation::error::{SpliceError, SpliceResult},
    quantize::{IndexedFrame, quantize_web_safe, web_safe_palette},
    raster::Raster,
    source::Source,
    target::Target,
    warp::WarpEngine,
};

/// How a frame is treated before the next one is drawn, as stored in the input container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Disposal {
    #[default]
    Any,
    Keep,
    Background,
    Previous,
}

/// Loop count of an animation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    #[default]
    Infinite,
    Finite(u16),
}

/// One decoded input frame: a sub-rectangle of the logical screen plus its timing.
#[derive(Clone, Debug)]
pub struct InputFrame {
    pub raster: Raster,
    pub left: u32,
    pub top: u32,
    /// Delay in hundredths of a second.
    pub delay: u16,
    pub disposal: Disposal,
}

/// Decoded animated input.
#[derive(Clone, Debug)]
pub struct AnimatedSequence {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<InputFrame>,
    pub repeat: LoopMode,
}

/// One composited, quantized output frame.
#[derive(Clone, Debug)]
pub struct OutputFrame {
    /// Position of the input frame this was produced from.
    pub index: usize,
    pub frame: IndexedFrame,
    pub delay: u16,
    pub disposal: Disposal,
}

/// Quantized output animation sharing one palette.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    pub width: u32,
    pub height: u32,
    /// Flat `RGB` palette; see [`crate::quantize::web_safe_palette`].
    pub palette: Vec<u8>,
    pub transparent_index: u8,
    pub frames: Vec<OutputFrame>,
    pub repeat: LoopMode,
}

/// What to do when a single frame fails with a recoverable error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    Abort,
    SkipFrame,
}

/// Worker pool sizing.
#[derive(Clone, Debug)]
pub struct SpliceThreading {
    /// Worker count; `None` uses rayon's default (one per core).
    pub threads: Option<usize>,
    /// Frames accumulated and held in memory per batch. `0` is treated as `1`.
    pub chunk_size: usize,
}

impl Default for SpliceThreading {
    fn default() -> Self {
        Self {
            threads: None,
            chunk_size: 32,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SequenceOptions {
    pub threading: SpliceThreading,
    pub failure_policy: FailurePolicy,
    /// Clear the target inside the quadrilateral before compositing.
    pub punch_target: bool,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            threading: SpliceThreading::default(),
            failure_policy: FailurePolicy::Abort,
            punch_target: true,
        }
    }
}

impl SequenceOptions {
    pub fn validate(&self) -> SpliceResult<()> {
        if self.threading.threads == Some(0) {
            return Err(SpliceError::input(
                "threading 'threads' must be >= 1 when set",
            ));
        }
        Ok(())
    }
}

/// A frame that was skipped under [`FailurePolicy::SkipFrame`].
#[derive(Debug)]
pub struct FrameFailure {
    pub index: usize,
    pub error: SpliceError,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceStats {
    pub frames_total: u64,
    pub frames_composited: u64,
    pub frames_failed: u64,
}

#[derive(Debug)]
pub struct SequenceReport {
    pub sequence: FrameSequence,
    pub failures: Vec<FrameFailure>,
    pub stats: SequenceStats,
}

/// Full-colour frames from [`SequenceProcessor::render_rgba_frames`], paired with their input
/// index.
#[derive(Debug)]
pub struct RgbaFrames {
    pub frames: Vec<(usize, Raster)>,
    pub failures: Vec<FrameFailure>,
    pub stats: SequenceStats,
}

/// Drives the compositor across every frame of an [`AnimatedSequence`].
pub struct SequenceProcessor<'a> {
    engine: &'a dyn WarpEngine,
    opts: SequenceOptions,
}

impl<'a> SequenceProcessor<'a> {
    pub fn new(engine: &'a dyn WarpEngine, opts: SequenceOptions) -> SpliceResult<Self> {
        opts.validate()?;
        Ok(Self { engine, opts })
    }

    pub fn options(&self) -> &SequenceOptions {
        &self.opts
    }

    /// Composite and quantize every frame.
    #[tracing::instrument(skip_all, fields(frames = input.frames.len()))]
    pub fn process(
        &self,
        input: &AnimatedSequence,
        target: Target,
    ) -> SpliceResult<SequenceReport> {
        let target = self.prepare_target(input, target)?;
        let (w, h) = target.raster().dimensions();
        let (done, failures, stats) =
            self.run(input, &target, |raster| Ok(quantize_web_safe(&raster)))?;

        let frames = done
            .into_iter()
            .map(|(index, frame)| {
                let src = &input.frames[index];
                OutputFrame {
                    index,
                    frame,
                    delay: src.delay,
                    disposal: src.disposal,
                }
            })
            .collect();

        tracing::info!(
            composited = stats.frames_composited,
            failed = stats.frames_failed,
            "sequence complete"
        );
        Ok(SequenceReport {
            sequence: FrameSequence {
                width: w,
                height: h,
                palette: web_safe_palette(),
                transparent_index: crate::quantize::TRANSPARENT_INDEX,
                frames,
                repeat: input.repeat,
            },
            failures,
            stats,
        })
    }

    /// Same accumulate + composite pipeline, without quantization.
    #[tracing::instrument(skip_all, fields(frames = input.frames.len()))]
    pub fn render_rgba_frames(
        &self,
        input: &AnimatedSequence,
        target: Target,
    ) -> SpliceResult<RgbaFrames> {
        let target = self.prepare_target(input, target)?;
        let (frames, failures, stats) = self.run(input, &target, Ok)?;
        Ok(RgbaFrames {
            frames,
            failures,
            stats,
        })
    }

    /// Validation and target setup; everything here happens before any frame work starts.
    fn prepare_target(
        &self,
        input: &AnimatedSequence,
        mut target: Target,
    ) -> SpliceResult<Target> {
        if input.frames.is_empty() {
            return Err(SpliceError::input("animated input has no frames"));
        }
        if input.width == 0 || input.height == 0 {
            return Err(SpliceError::input(format!(
                "animated input has empty logical screen {}x{}",
                input.width, input.height
            )));
        }
        if let Some(i) = input.frames.iter().position(|f| f.raster.is_empty()) {
            return Err(SpliceError::input(format!("input frame {i} is empty")));
        }
        if target.raster().is_empty() {
            return Err(SpliceError::input("target raster is empty"));
        }

        target.canonicalize_bounds()?;
        target.bounding_box().raster_size()?;
        if self.opts.punch_target {
            target.punch_transparency();
        }
        Ok(target)
    }

    fn run<T, F>(
        &self,
        input: &AnimatedSequence,
        target: &Target,
        finish: F,
    ) -> SpliceResult<(Vec<(usize, T)>, Vec<FrameFailure>, SequenceStats)>
    where
        T: Send,
        F: Fn(Raster) -> SpliceResult<T> + Sync,
    {
        let pool = build_thread_pool(self.opts.threading.threads)?;
        let chunk_size = self.opts.threading.chunk_size.max(1);
        let engine = self.engine;

        let mut acc = Raster::new(input.width, input.height);
        let mut done = Vec::with_capacity(input.frames.len());
        let mut failures = Vec::new();
        let mut stats = SequenceStats::default();

        for (chunk_idx, chunk) in input.frames.chunks(chunk_size).enumerate() {
            let base = chunk_idx * chunk_size;

            // Accumulation is order-dependent, so it stays on this thread.
            let mut snapshots = Vec::with_capacity(chunk.len());
            for (offset, frame) in chunk.iter().enumerate() {
                accumulate(&mut acc, frame, base + offset == 0);
                snapshots.push(acc.clone());
            }

            let mut slots: Vec<Option<SpliceResult<T>>> =
                (0..chunk.len()).map(|_| None).collect();
            pool.install(|| {
                slots
                    .par_iter_mut()
                    .zip(snapshots.into_par_iter())
                    .enumerate()
                    .for_each(|(offset, (slot, snapshot))| {
                        let _span =
                            tracing::debug_span!("frame", index = base + offset).entered();
                        let result =
                            composite(Source::new(snapshot), target, engine).and_then(&finish);
                        *slot = Some(result);
                    });
            });

            for (offset, slot) in slots.into_iter().enumerate() {
                let index = base + offset;
                stats.frames_total += 1;
                let result = slot.ok_or_else(|| {
                    SpliceError::external(format!("frame {index} produced no result"))
                })?;
                match result {
                    Ok(value) => {
                        stats.frames_composited += 1;
                        done.push((index, value));
                    }
                    Err(error)
                        if error.is_recoverable()
                            && self.opts.failure_policy == FailurePolicy::SkipFrame =>
                    {
                        tracing::warn!(index, %error, "skipping failed frame");
                        stats.frames_failed += 1;
                        failures.push(FrameFailure { index, error });
                    }
                    Err(error) => {
                        tracing::error!(index, %error, "frame failed; aborting sequence");
                        return Err(error);
                    }
                }
            }
        }

        Ok((done, failures, stats))
    }
}

/// Paint `frame` onto the running canvas. The first frame replaces the canvas contents.
fn accumulate(acc: &mut Raster, frame: &InputFrame, first: bool) {
    let (dx, dy) = (i64::from(frame.left), i64::from(frame.top));
    if first {
        acc.draw_src_at(&frame.raster, dx, dy);
    } else {
        acc.draw_over_at(&frame.raster, dx, dy);
    }
}

fn build_thread_pool(threads: Option<usize>) -> SpliceResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| SpliceError::external(format!("failed to build rayon thread pool: {e}")))
}
