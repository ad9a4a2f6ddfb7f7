use std::path::PathBuf;

/// Describes an opened stream. Live sources report `total_frames = 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl StreamMetadata {
    pub fn is_unbounded(&self) -> bool {
        self.total_frames == 0
    }
}
