use std::path::{Path, PathBuf};

use quadsplice::{
    Disposal, FrameSequence, IndexedFrame, LoopMode, OutputFrame, Raster, StillFormat,
    TRANSPARENT_INDEX, web_safe_palette,
};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_quadsplice")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "quadsplice.exe"
            } else {
                "quadsplice"
            });
            p
        })
}

fn scratch(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("cli_smoke").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_png(path: &Path, raster: &Raster) {
    let bytes = quadsplice::encode_still(raster, StillFormat::Png, [0; 4]).unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn write_gif(path: &Path, frames: u8) {
    let seq = FrameSequence {
        width: 6,
        height: 6,
        palette: web_safe_palette(),
        transparent_index: TRANSPARENT_INDEX,
        frames: (0..frames)
            .map(|i| OutputFrame {
                index: usize::from(i),
                frame: IndexedFrame {
                    width: 6,
                    height: 6,
                    indices: vec![i * 6; 36],
                },
                delay: 4,
                disposal: Disposal::Keep,
            })
            .collect(),
        repeat: LoopMode::Infinite,
    };
    std::fs::write(path, quadsplice::encode_animation(&seq).unwrap()).unwrap();
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

#[test]
fn cli_still_writes_png() {
    let dir = scratch("still");
    let source = dir.join("source.png");
    let target = dir.join("target.png");
    let out = dir.join("out.png");
    write_png(&source, &Raster::filled(8, 8, [255, 0, 0, 255]));
    write_png(&target, &Raster::filled(40, 30, [0, 0, 255, 255]));

    let status = std::process::Command::new(exe())
        .args(["still", "--source"])
        .arg(path_arg(&source))
        .arg("--target")
        .arg(path_arg(&target))
        .args(["--quad", "30,25", "5,5", "30,4", "6,25", "--out"])
        .arg(path_arg(&out))
        .status()
        .unwrap();

    assert!(status.success());
    let back = quadsplice::decode_still(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!(back.dimensions(), (40, 30));
    assert_eq!(back.pixel(0, 0), [0, 0, 255, 255]);
    assert_eq!(back.pixel(17, 15), [255, 0, 0, 255]);
}

#[test]
fn cli_sequence_reads_quad_from_job_file() {
    let dir = scratch("sequence");
    let source = dir.join("source.gif");
    let target = dir.join("target.png");
    let job = dir.join("job.json");
    let out = dir.join("out.gif");
    write_gif(&source, 3);
    write_png(&target, &Raster::filled(32, 32, [255, 255, 255, 255]));
    std::fs::write(
        &job,
        serde_json::json!({
            "quad": [[4, 4], [28, 4], [4, 28], [28, 28]],
            "threads": 2,
            "chunk_size": 2
        })
        .to_string(),
    )
    .unwrap();

    let status = std::process::Command::new(exe())
        .args(["sequence", "--source"])
        .arg(path_arg(&source))
        .arg("--target")
        .arg(path_arg(&target))
        .arg("--job")
        .arg(path_arg(&job))
        .arg("--out")
        .arg(path_arg(&out))
        .status()
        .unwrap();

    assert!(status.success());
    let back = quadsplice::decode_animation(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!((back.width, back.height), (32, 32));
    assert_eq!(back.frames.len(), 3);
    assert!(back.frames.iter().all(|f| f.delay == 4));
}

#[test]
fn cli_frames_writes_numbered_pngs() {
    let dir = scratch("frames");
    let source = dir.join("source.gif");
    let target = dir.join("target.png");
    let out_dir = dir.join("frames");
    write_gif(&source, 2);
    write_png(&target, &Raster::filled(20, 20, [0, 0, 0, 255]));

    let status = std::process::Command::new(exe())
        .args(["frames", "--source"])
        .arg(path_arg(&source))
        .arg("--target")
        .arg(path_arg(&target))
        .args(["--quad", "2,2", "18,2", "2,18", "18,18", "--out-dir"])
        .arg(path_arg(&out_dir))
        .status()
        .unwrap();

    assert!(status.success());
    assert!(out_dir.join("frame-0000.png").exists());
    assert!(out_dir.join("frame-0001.png").exists());
    assert!(!out_dir.join("frame-0002.png").exists());
}

#[test]
fn cli_rejects_degenerate_quad() {
    let dir = scratch("degenerate");
    let source = dir.join("source.png");
    let target = dir.join("target.png");
    let out = dir.join("out.png");
    write_png(&source, &Raster::filled(4, 4, [255, 0, 0, 255]));
    write_png(&target, &Raster::filled(10, 10, [0, 0, 0, 255]));

    let status = std::process::Command::new(exe())
        .args(["still", "--source"])
        .arg(path_arg(&source))
        .arg("--target")
        .arg(path_arg(&target))
        .args(["--quad", "0,0", "1,0", "0,1", "9,9", "--out"])
        .arg(path_arg(&out))
        .status()
        .unwrap();

    assert!(!status.success());
    assert!(!out.exists());
}

#[test]
fn cli_still_without_extension_keeps_jpeg_source_format() {
    let dir = scratch("still_jpeg");
    let source = dir.join("source.jpg");
    let target = dir.join("target.png");
    let out = dir.join("spliced");
    let jpeg = quadsplice::encode_still(
        &Raster::filled(8, 8, [255, 0, 0, 255]),
        StillFormat::Jpeg { quality: 90 },
        [0; 4],
    )
    .unwrap();
    std::fs::write(&source, jpeg).unwrap();
    write_png(&target, &Raster::filled(40, 30, [0, 0, 255, 255]));

    let status = std::process::Command::new(exe())
        .args(["still", "--source"])
        .arg(path_arg(&source))
        .arg("--target")
        .arg(path_arg(&target))
        .args(["--quad", "5,5", "30,4", "6,25", "30,25", "--out"])
        .arg(path_arg(&out))
        .status()
        .unwrap();

    assert!(status.success());
    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.starts_with(&[0xFF, 0xD8, 0xFF]));
    assert_eq!(quadsplice::decode_still(&bytes).unwrap().dimensions(), (40, 30));
}
