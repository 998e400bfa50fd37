use std::{path::Path, time::Duration};

use anyhow::Context as _;

use crate::{
    foundation::error::{SpliceError, SpliceResult},
    geometry::{Point, Quad},
    sequence::{FailurePolicy, SequenceOptions, SpliceThreading},
    warp::WarpEngineKind,
};

/// JSON job description. Every field except `quad` is optional and falls back to the library
/// defaults.
///
/// ```json
/// { "quad": [[438, 174], [863, 311], [448, 745], [845, 646]], "threads": 4, "engine": "magick" }
/// ```
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub quad: Option<[[i64; 2]; 4]>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub skip_failed_frames: Option<bool>,
    #[serde(default)]
    pub punch_target: Option<bool>,
    #[serde(default)]
    pub engine: Option<WarpEngineKind>,
    #[serde(default)]
    pub warp_timeout_ms: Option<u64>,
}

impl JobConfig {
    pub fn from_json_str(s: &str) -> SpliceResult<Self> {
        serde_json::from_str(s).map_err(|e| SpliceError::input(format!("job config: {e}")))
    }

    pub fn load(path: &Path) -> SpliceResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read job config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Fields set in `other` win.
    pub fn merged_with(self, other: JobConfig) -> Self {
        Self {
            quad: other.quad.or(self.quad),
            threads: other.threads.or(self.threads),
            chunk_size: other.chunk_size.or(self.chunk_size),
            skip_failed_frames: other.skip_failed_frames.or(self.skip_failed_frames),
            punch_target: other.punch_target.or(self.punch_target),
            engine: other.engine.or(self.engine),
            warp_timeout_ms: other.warp_timeout_ms.or(self.warp_timeout_ms),
        }
    }

    pub fn corners(&self) -> SpliceResult<[Point; 4]> {
        self.quad
            .map(|q| *Quad::from(q).points())
            .ok_or_else(|| SpliceError::input("no quadrilateral given (use --quad or a job file)"))
    }

    pub fn engine_kind(&self) -> WarpEngineKind {
        self.engine.unwrap_or_default()
    }

    pub fn warp_timeout(&self) -> SpliceResult<Option<Duration>> {
        match self.warp_timeout_ms {
            Some(0) => Err(SpliceError::input("warp_timeout_ms must be non-zero")),
            Some(ms) => Ok(Some(Duration::from_millis(ms))),
            None => Ok(None),
        }
    }

    /// Sequence options; `default_punch` applies when `punch_target` is unset.
    pub fn sequence_options(&self, default_punch: bool) -> SpliceResult<SequenceOptions> {
        let defaults = SpliceThreading::default();
        let opts = SequenceOptions {
            threading: SpliceThreading {
                threads: self.threads,
                chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            },
            failure_policy: if self.skip_failed_frames.unwrap_or(false) {
                FailurePolicy::SkipFrame
            } else {
                FailurePolicy::Abort
            },
            punch_target: self.punch_target.unwrap_or(default_punch),
        };
        opts.validate()?;
        Ok(opts)
    }
}

/// Parse `"x,y"` into a point.
pub fn parse_point(s: &str) -> Result<[i64; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'x,y', got '{s}'"))?;
    let x = x
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("bad x in '{s}': {e}"))?;
    let y = y
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("bad y in '{s}': {e}"))?;
    Ok([x, y])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_job() {
        let cfg = JobConfig::from_json_str(
            r#"{"quad": [[1, 2], [3, 4], [5, 6], [7, 8]], "threads": 2, "chunk_size": 8,
                "skip_failed_frames": true, "punch_target": false, "engine": "magick",
                "warp_timeout_ms": 1500}"#,
        )
        .unwrap();
        assert_eq!(cfg.corners().unwrap()[3], Point::new(7, 8));
        assert_eq!(cfg.engine_kind(), WarpEngineKind::Magick);
        assert_eq!(
            cfg.warp_timeout().unwrap(),
            Some(Duration::from_millis(1500))
        );
        let opts = cfg.sequence_options(true).unwrap();
        assert_eq!(opts.threading.threads, Some(2));
        assert_eq!(opts.failure_policy, FailurePolicy::SkipFrame);
        assert!(!opts.punch_target);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            JobConfig::from_json_str(r#"{"quads": []}"#),
            Err(SpliceError::Input(_))
        ));
    }

    #[test]
    fn cli_values_override_file_values() {
        let file = JobConfig {
            threads: Some(8),
            engine: Some(WarpEngineKind::Magick),
            ..JobConfig::default()
        };
        let cli = JobConfig {
            threads: Some(1),
            ..JobConfig::default()
        };
        let merged = file.merged_with(cli);
        assert_eq!(merged.threads, Some(1));
        assert_eq!(merged.engine, Some(WarpEngineKind::Magick));
        assert!(merged.corners().is_err());
    }

    #[test]
    fn zero_threads_and_timeout_are_rejected() {
        let cfg = JobConfig {
            threads: Some(0),
            warp_timeout_ms: Some(0),
            ..JobConfig::default()
        };
        assert!(cfg.sequence_options(true).is_err());
        assert!(cfg.warp_timeout().is_err());
    }

    #[test]
    fn parse_point_accepts_spaces() {
        assert_eq!(parse_point("438, 174").unwrap(), [438, 174]);
        assert!(parse_point("438").is_err());
        assert!(parse_point("a,1").is_err());
    }
}
