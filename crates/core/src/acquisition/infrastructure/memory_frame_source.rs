use std::collections::HashSet;

use crate::acquisition::domain::frame_source::{FrameSource, ReadOutcome, SourceKind};
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::StreamMetadata;

/// Serves frames that are already in memory.
///
/// As a `File` source it behaves like a decoded clip: exhaustion after the
/// last frame, rewind back to index 0. As a `Live` source it behaves like a
/// camera that eventually stops producing; selected pulls can be marked as
/// failing reads to exercise transient-retry handling.
pub struct MemoryFrameSource {
    frames: Vec<Frame>,
    kind: SourceKind,
    cursor: usize,
    pulls: usize,
    failing_pulls: HashSet<usize>,
    metadata: StreamMetadata,
    closed: bool,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>, kind: SourceKind) -> Result<Self, PipelineError> {
        let first = frames.first().ok_or_else(|| {
            PipelineError::SourceUnavailable("in-memory source has no frames".to_string())
        })?;
        let (width, height) = first.dimensions();
        if let Some(bad) = frames.iter().find(|f| f.dimensions() != (width, height)) {
            return Err(PipelineError::ShapeMismatch {
                expected: (width, height),
                actual: bad.dimensions(),
            });
        }
        let metadata = StreamMetadata {
            width,
            height,
            fps: 30.0,
            total_frames: match kind {
                SourceKind::File => frames.len(),
                SourceKind::Live => 0,
            },
            codec: "rawvideo".to_string(),
            source_path: None,
        };
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.with_index(i))
            .collect();
        Ok(Self {
            frames,
            kind,
            cursor: 0,
            pulls: 0,
            failing_pulls: HashSet::new(),
            metadata,
            closed: false,
        })
    }

    /// Marks zero-based pull numbers that report [`ReadOutcome::Unavailable`]
    /// on a live source without consuming a frame.
    pub fn with_failing_pulls(mut self, pulls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_pulls.extend(pulls);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSource for MemoryFrameSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next(&mut self) -> Result<ReadOutcome, PipelineError> {
        if self.closed {
            return Ok(ReadOutcome::EndOfStream);
        }
        let pull = self.pulls;
        self.pulls += 1;

        if self.kind == SourceKind::Live && self.failing_pulls.contains(&pull) {
            return Ok(ReadOutcome::Unavailable);
        }

        match self.frames.get(self.cursor) {
            Some(frame) => {
                self.cursor += 1;
                Ok(ReadOutcome::Frame(frame.clone()))
            }
            None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn reset(&mut self) -> Result<(), PipelineError> {
        if self.kind == SourceKind::Live {
            return Err(PipelineError::NotSeekable);
        }
        if self.closed {
            return Err(PipelineError::SourceUnavailable(
                "in-memory source is closed".to_string(),
            ));
        }
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
