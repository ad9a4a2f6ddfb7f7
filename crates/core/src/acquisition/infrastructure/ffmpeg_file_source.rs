use std::path::{Path, PathBuf};

use super::ffmpeg_decode::DecodeState;
use crate::acquisition::domain::frame_source::{FrameSource, ReadOutcome, SourceKind};
use crate::shared::error::PipelineError;
use crate::shared::video_metadata::StreamMetadata;

/// Decodes a video container with ffmpeg into RGB24 frames.
///
/// Rewinding reopens the container instead of seeking, which is exact for
/// every codec regardless of keyframe spacing.
pub struct FfmpegFileSource {
    path: PathBuf,
    state: Option<DecodeState>,
    metadata: StreamMetadata,
    emitted: usize,
}

// Safety: the source is only driven from one thread at a time; the raw
// ffmpeg pointers it owns are never shared.
unsafe impl Send for FfmpegFileSource {}

impl FfmpegFileSource {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let (state, metadata) = DecodeState::open_file(path)?;
        log::debug!(
            "Opened {} ({}x{}, {:.2} fps, {} frames, {})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames,
            metadata.codec
        );
        Ok(Self {
            path: path.to_path_buf(),
            state: Some(state),
            metadata,
            emitted: 0,
        })
    }
}

impl FrameSource for FfmpegFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next(&mut self) -> Result<ReadOutcome, PipelineError> {
        let Some(state) = self.state.as_mut() else {
            return Ok(ReadOutcome::EndOfStream);
        };
        match state.pull(self.emitted, true)? {
            Some(frame) => {
                if frame.dimensions() != (self.metadata.width, self.metadata.height) {
                    return Err(PipelineError::ShapeMismatch {
                        expected: (self.metadata.width, self.metadata.height),
                        actual: frame.dimensions(),
                    });
                }
                self.emitted += 1;
                Ok(ReadOutcome::Frame(frame))
            }
            None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn reset(&mut self) -> Result<(), PipelineError> {
        if self.state.is_none() {
            return Err(PipelineError::SourceUnavailable(format!(
                "{} is closed",
                self.path.display()
            )));
        }
        let (state, _) = DecodeState::open_file(&self.path)?;
        self.state = Some(state);
        self.emitted = 0;
        log::debug!("Rewound {}", self.path.display());
        Ok(())
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Closed {}", self.path.display());
        }
    }
}
