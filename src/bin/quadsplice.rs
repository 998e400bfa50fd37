use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use quadsplice::config::parse_point;

#[derive(Parser, Debug)]
#[command(name = "quadsplice", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Splice a still image into the target and write a PNG or JPEG.
    Still(StillArgs),
    /// Splice every frame of a GIF into the target and write an animated GIF.
    Sequence(SequenceArgs),
    /// Splice every frame of a GIF into the target and write one PNG per frame.
    Frames(FramesArgs),
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Target image (PNG or JPEG).
    #[arg(long)]
    target: PathBuf,

    /// Quadrilateral corners, four `x,y` points in any order.
    #[arg(long, num_args = 4, value_parser = parse_point, allow_hyphen_values = true)]
    quad: Option<Vec<[i64; 2]>>,

    /// JSON job file; flags given on the command line override its fields.
    #[arg(long)]
    job: Option<PathBuf>,

    /// Warp backend.
    #[arg(long, value_enum)]
    engine: Option<EngineChoice>,

    /// Per-warp timeout for the ImageMagick backend.
    #[arg(long)]
    warp_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct PoolArgs {
    /// Worker threads (default: one per core).
    #[arg(long)]
    threads: Option<usize>,

    /// Frames held in memory per batch.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Drop frames whose warp fails instead of aborting the whole run.
    #[arg(long)]
    skip_failed: bool,
}

#[derive(Parser, Debug)]
struct StillArgs {
    /// Source image (PNG or JPEG).
    #[arg(long)]
    source: PathBuf,

    #[command(flatten)]
    job: JobArgs,

    /// Output path; `.png`, `.jpg` or `.jpeg`. Without an extension the source's format is used.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct SequenceArgs {
    /// Animated GIF source.
    #[arg(long)]
    source: PathBuf,

    #[command(flatten)]
    job: JobArgs,

    #[command(flatten)]
    pool: PoolArgs,

    /// Keep the target's pixels inside the quadrilateral instead of clearing them.
    #[arg(long)]
    no_punch: bool,

    /// Output GIF path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct FramesArgs {
    /// Animated GIF source.
    #[arg(long)]
    source: PathBuf,

    #[command(flatten)]
    job: JobArgs,

    #[command(flatten)]
    pool: PoolArgs,

    /// Clear the target's pixels inside the quadrilateral first.
    #[arg(long)]
    punch: bool,

    /// Directory that receives `frame-0000.png`, `frame-0001.png`, ...
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineChoice {
    Bilinear,
    Magick,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Still(args) => cmd_still(args),
        Command::Sequence(args) => cmd_sequence(args),
        Command::Frames(args) => cmd_frames(args),
    }
}

fn job_config(job: &JobArgs, pool: Option<&PoolArgs>) -> anyhow::Result<quadsplice::JobConfig> {
    let base = match &job.job {
        Some(path) => quadsplice::JobConfig::load(path)?,
        None => quadsplice::JobConfig::default(),
    };

    let quad = match job.quad.as_deref() {
        Some([a, b, c, d]) => Some([*a, *b, *c, *d]),
        Some(other) => anyhow::bail!("--quad takes exactly 4 points, got {}", other.len()),
        None => None,
    };
    let cli = quadsplice::JobConfig {
        quad,
        threads: pool.and_then(|p| p.threads),
        chunk_size: pool.and_then(|p| p.chunk_size),
        skip_failed_frames: pool.filter(|p| p.skip_failed).map(|_| true),
        punch_target: None,
        engine: job.engine.map(|e| match e {
            EngineChoice::Bilinear => quadsplice::WarpEngineKind::Bilinear,
            EngineChoice::Magick => quadsplice::WarpEngineKind::Magick,
        }),
        warp_timeout_ms: job.warp_timeout_ms,
    };
    Ok(base.merged_with(cli))
}

fn read_bytes(path: &Path, what: &str) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {what} '{}'", path.display()))
}

fn load_target(path: &Path, cfg: &quadsplice::JobConfig) -> anyhow::Result<quadsplice::Target> {
    let bytes = read_bytes(path, "target")?;
    let raster = quadsplice::decode_still(&bytes)
        .with_context(|| format!("decode target '{}'", path.display()))?;
    Ok(quadsplice::Target::new(raster, cfg.corners()?))
}

fn load_animation(path: &Path) -> anyhow::Result<quadsplice::AnimatedSequence> {
    let bytes = read_bytes(path, "source")?;
    if !quadsplice::is_gif(&bytes) {
        anyhow::bail!("source '{}' is not a GIF", path.display());
    }
    Ok(quadsplice::decode_animation(&bytes)
        .with_context(|| format!("decode source '{}'", path.display()))?)
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

fn acquire_engine(cfg: &quadsplice::JobConfig) -> anyhow::Result<quadsplice::WarpEngineHandle> {
    Ok(quadsplice::WarpEngineHandle::acquire(
        cfg.engine_kind(),
        cfg.warp_timeout()?,
    )?)
}

fn report_failures(failures: &[quadsplice::FrameFailure]) {
    for f in failures {
        eprintln!("skipped frame {}: {}", f.index, f.error);
    }
}

fn cmd_still(args: StillArgs) -> anyhow::Result<()> {
    let cfg = job_config(&args.job, None)?;

    let src_bytes = read_bytes(&args.source, "source")?;
    if quadsplice::is_gif(&src_bytes) {
        anyhow::bail!(
            "source '{}' is a GIF; use `quadsplice sequence` or `quadsplice frames`",
            args.source.display()
        );
    }
    let format = quadsplice::StillFormat::for_output(&args.out, &src_bytes)?;
    let source = quadsplice::decode_still(&src_bytes)
        .with_context(|| format!("decode source '{}'", args.source.display()))?;
    let mut target = load_target(&args.job.target, &cfg)?;

    let handle = acquire_engine(&cfg)?;
    let out = quadsplice::splice_still(source, &mut target, handle.engine())?;
    drop(handle);

    let bytes = quadsplice::encode_still(&out, format, [255, 255, 255, 255])?;
    create_parent(&args.out)?;
    std::fs::write(&args.out, bytes)
        .with_context(|| format!("write '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_sequence(args: SequenceArgs) -> anyhow::Result<()> {
    let mut cfg = job_config(&args.job, Some(&args.pool))?;
    if args.no_punch {
        cfg.punch_target = Some(false);
    }
    let opts = cfg.sequence_options(true)?;

    let input = load_animation(&args.source)?;
    let target = load_target(&args.job.target, &cfg)?;

    let handle = acquire_engine(&cfg)?;
    let processor = quadsplice::SequenceProcessor::new(handle.engine(), opts)?;
    let report = processor.process(&input, target)?;
    drop(processor);
    drop(handle);

    report_failures(&report.failures);
    if report.sequence.frames.is_empty() {
        anyhow::bail!("every frame failed; nothing to write");
    }

    let bytes = quadsplice::encode_animation(&report.sequence)?;
    create_parent(&args.out)?;
    std::fs::write(&args.out, bytes)
        .with_context(|| format!("write '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} frames, {} skipped)",
        args.out.display(),
        report.stats.frames_composited,
        report.stats.frames_failed
    );
    Ok(())
}

fn cmd_frames(args: FramesArgs) -> anyhow::Result<()> {
    let mut cfg = job_config(&args.job, Some(&args.pool))?;
    if args.punch {
        cfg.punch_target = Some(true);
    }
    let opts = cfg.sequence_options(false)?;

    let input = load_animation(&args.source)?;
    let target = load_target(&args.job.target, &cfg)?;

    let handle = acquire_engine(&cfg)?;
    let processor = quadsplice::SequenceProcessor::new(handle.engine(), opts)?;
    let rendered = processor.render_rgba_frames(&input, target)?;
    drop(processor);
    drop(handle);

    report_failures(&rendered.failures);
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output dir '{}'", args.out_dir.display()))?;

    for (index, raster) in &rendered.frames {
        let path = args.out_dir.join(format!("frame-{index:04}.png"));
        let bytes = quadsplice::encode_still(raster, quadsplice::StillFormat::Png, [0; 4])?;
        std::fs::write(&path, bytes).with_context(|| format!("write '{}'", path.display()))?;
    }

    eprintln!(
        "wrote {} frames to {}",
        rendered.frames.len(),
        args.out_dir.display()
    );
    Ok(())
}
