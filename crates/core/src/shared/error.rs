use thiserror::Error;

/// Failure kinds surfaced by the segmentation pipeline.
///
/// Construction-time kinds (`SourceUnavailable`, `InvalidConfig`,
/// `UnsupportedVariant`) abort startup. The rest arise while running and
/// send the driver through its draining path.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("source does not support rewinding")]
    NotSeekable,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported algorithm '{name}', expected one of: {}", .supported.join(", "))]
    UnsupportedVariant {
        name: String,
        supported: Vec<&'static str>,
    },
    #[error(
        "shape mismatch: expected {}x{}, got {}x{}",
        .expected.0, .expected.1, .actual.0, .actual.1
    )]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("presentation failed: {0}")]
    Presentation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True for kinds that can only be raised while building a pipeline.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable(_)
                | PipelineError::InvalidConfig(_)
                | PipelineError::UnsupportedVariant { .. }
        )
    }
}
