use std::{
    io::{Cursor, Read, Write},
    process::{Child, Command, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    foundation::error::{SpliceError, SpliceResult},
    raster::Raster,
    warp::{Correspondences, WarpEngine},
};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Options for [`MagickWarp`].
#[derive(Clone, Debug)]
pub struct MagickOpts {
    /// Program to run. `None` tries `magick`, then `convert`.
    pub program: Option<String>,
    /// Wall-clock limit per warp call; the child is killed when it is exceeded.
    pub timeout: Duration,
}

impl Default for MagickOpts {
    fn default() -> Self {
        Self {
            program: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Warp by piping PNG bytes through ImageMagick's `-distort BilinearForward`.
#[derive(Clone, Debug)]
pub struct MagickWarp {
    program: String,
    timeout: Duration,
}

impl MagickWarp {
    /// Resolve a working ImageMagick binary.
    pub fn locate(opts: MagickOpts) -> SpliceResult<Self> {
        if opts.timeout.is_zero() {
            return Err(SpliceError::input("warp timeout must be non-zero"));
        }
        let candidates: Vec<String> = match opts.program {
            Some(p) => vec![p],
            None => vec!["magick".to_string(), "convert".to_string()],
        };
        let program = candidates
            .into_iter()
            .find(|p| is_program_on_path(p))
            .ok_or_else(|| {
                SpliceError::external(
                    "ImageMagick is required for the magick warp engine, but neither `magick` nor `convert` was found on PATH",
                )
            })?;
        Ok(Self {
            program,
            timeout: opts.timeout,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl WarpEngine for MagickWarp {
    fn name(&self) -> &'static str {
        "magick"
    }

    #[tracing::instrument(skip(self, raster, pairs), fields(program = %self.program))]
    fn warp(
        &self,
        raster: &Raster,
        pairs: &Correspondences,
        out_w: u32,
        out_h: u32,
    ) -> SpliceResult<Raster> {
        if raster.is_empty() || out_w == 0 || out_h == 0 {
            return Err(SpliceError::external(
                "magick warp requires non-empty input and output",
            ));
        }

        let mut input = Vec::new();
        raster
            .as_image()
            .write_to(&mut Cursor::new(&mut input), image::ImageFormat::Png)
            .map_err(|e| SpliceError::external(format!("failed to encode warp input: {e}")))?;

        let viewport = format!("distort:viewport={out_w}x{out_h}+0+0");
        let control_points = distort_args(pairs);
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .args([
                "png:-",
                "-virtual-pixel",
                "transparent",
                "-alpha",
                "set",
                "-define",
                viewport.as_str(),
                "-distort",
                "BilinearForward",
                control_points.as_str(),
                "+repage",
                "png32:-",
            ]);

        let mut child = cmd.spawn().map_err(|e| {
            SpliceError::external(format!("failed to spawn '{}': {e}", self.program))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpliceError::external("failed to open warp stdin (unexpected)"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpliceError::external("failed to open warp stdout (unexpected)"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SpliceError::external("failed to open warp stderr (unexpected)"))?;

        let feed = std::thread::spawn(move || stdin.write_all(&input));
        let stdout_drain = drain(stdout);
        let stderr_drain = drain(stderr);

        let status = wait_with_deadline(&mut child, self.timeout)?;
        // The pipes close once the child is gone, so the helper threads are bounded too.
        let _ = feed.join();
        let out_bytes = join_drain(stdout_drain, "stdout")?;
        let err_bytes = join_drain(stderr_drain, "stderr")?;

        if !status.success() {
            return Err(SpliceError::external(format!(
                "{} exited with status {status}: {}",
                self.program,
                String::from_utf8_lossy(&err_bytes).trim()
            )));
        }

        let decoded = image::load_from_memory_with_format(&out_bytes, image::ImageFormat::Png)
            .map_err(|e| SpliceError::external(format!("failed to decode warp output: {e}")))?
            .to_rgba8();
        let out = Raster::from(decoded);
        if out.dimensions() != (out_w, out_h) {
            return Err(SpliceError::external(format!(
                "warp output is {}x{}, expected {out_w}x{out_h}",
                out.width(),
                out.height()
            )));
        }
        Ok(out)
    }
}

/// `sx,sy dx,dy` for each pair, in canonical corner order.
fn distort_args(pairs: &Correspondences) -> String {
    pairs
        .iter()
        .map(|c| format!("{},{} {},{}", c.src.x, c.src.y, c.dst.x, c.dst.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn drain<R: Read + Send + 'static>(mut r: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_drain(handle: JoinHandle<std::io::Result<Vec<u8>>>, what: &str) -> SpliceResult<Vec<u8>> {
    handle
        .join()
        .map_err(|_| SpliceError::external(format!("warp {what} drain thread panicked")))?
        .map_err(|e| SpliceError::external(format!("warp {what} read failed: {e}")))
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> SpliceResult<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpliceError::external(format!(
                    "warp timed out after {} ms",
                    timeout.as_millis()
                )));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(SpliceError::external(format!(
                    "failed to wait for warp process: {e}"
                )));
            }
        }
    }
}

/// Return `true` when `program -version` runs successfully.
pub fn is_program_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
