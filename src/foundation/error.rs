pub type SpliceResult<T> = Result<T, SpliceError>;

#[derive(thiserror::Error, Debug)]
pub enum SpliceError {
    /// Malformed or undecodable input raster, or unusable caller input.
    #[error("input error: {0}")]
    Input(String),

    /// Quadrilateral that cannot be canonicalized or whose bounding box has no area.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Resample or warp capability failure, including timeouts.
    #[error("external capability error: {0}")]
    External(String),

    #[error("encode error{}: {message}", frame_suffix(.frame))]
    Encode {
        frame: Option<usize>,
        message: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpliceError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::External(msg.into())
    }

    pub fn encode(frame: Option<usize>, msg: impl Into<String>) -> Self {
        Self::Encode {
            frame,
            message: msg.into(),
        }
    }

    /// Only capability failures may be skipped by a per-frame failure policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

fn frame_suffix(frame: &Option<usize>) -> String {
    match frame {
        Some(i) => format!(" (frame {i})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SpliceError::input("x")
                .to_string()
                .contains("input error:")
        );
        assert!(
            SpliceError::geometry("x")
                .to_string()
                .contains("geometry error:")
        );
        assert!(
            SpliceError::external("x")
                .to_string()
                .contains("external capability error:")
        );
        assert_eq!(
            SpliceError::encode(Some(3), "boom").to_string(),
            "encode error (frame 3): boom"
        );
        assert_eq!(
            SpliceError::encode(None, "boom").to_string(),
            "encode error: boom"
        );
    }

    #[test]
    fn only_external_errors_are_recoverable() {
        assert!(SpliceError::external("timeout").is_recoverable());
        assert!(!SpliceError::geometry("x").is_recoverable());
        assert!(!SpliceError::input("x").is_recoverable());
        assert!(!SpliceError::encode(Some(0), "x").is_recoverable());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = SpliceError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
